use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ChatError, Result};
use crate::models::ConversationSession;

/// Exclusive access to one session for the duration of a turn.
pub type SessionGuard = OwnedMutexGuard<ConversationSession>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Lock the session, creating it on first use. Waits while another turn
    /// of the same conversation holds it. A session owned by a different user
    /// is reported as not found.
    async fn acquire(&self, session_id: &str, user_id: &str) -> Result<SessionGuard>;

    /// Snapshot of a session, if it exists.
    async fn get(&self, session_id: &str) -> Option<ConversationSession>;

    /// Forget a session. Returns whether it existed.
    async fn delete(&self, session_id: &str) -> bool;
}

/// Process-local session store with one lock per conversation.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<Mutex<ConversationSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn entry(&self, session_id: &str, user_id: &str) -> Arc<Mutex<ConversationSession>> {
        // The map shard lock is released before awaiting the session lock
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, user_id, "Creating conversation session");
                Arc::new(Mutex::new(ConversationSession::new(session_id, user_id)))
            })
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, session_id: &str, user_id: &str) -> Result<SessionGuard> {
        let guard = self.entry(session_id, user_id).lock_owned().await;

        if guard.user_id != user_id {
            tracing::warn!(session_id, user_id, "Session belongs to another user");
            return Err(ChatError::NotFound(format!("Session {session_id}")));
        }

        Ok(guard)
    }

    async fn get(&self, session_id: &str) -> Option<ConversationSession> {
        let record = self.sessions.get(session_id).map(|r| Arc::clone(r.value()))?;
        let session = record.lock().await;
        Some(session.clone())
    }

    async fn delete(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionState;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sessions_are_created_lazily() {
        let store = InMemorySessionStore::new();
        assert!(store.get("conv_1").await.is_none());

        {
            let session = store.acquire("conv_1", "user_1").await.unwrap();
            assert_eq!(session.state, SessionState::Initial);
        }

        assert_eq!(store.len(), 1);
        assert!(store.get("conv_1").await.is_some());
    }

    #[tokio::test]
    async fn test_changes_persist_after_guard_drop() {
        let store = InMemorySessionStore::new();
        {
            let mut session = store.acquire("conv_1", "user_1").await.unwrap();
            session.last_query = Some("budget".to_string());
        }
        let snapshot = store.get("conv_1").await.unwrap();
        assert_eq!(snapshot.last_query.as_deref(), Some("budget"));
    }

    #[tokio::test]
    async fn test_other_user_gets_not_found() {
        let store = InMemorySessionStore::new();
        drop(store.acquire("conv_1", "user_1").await.unwrap());

        let result = store.acquire("conv_1", "intruder").await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_forgets_session() {
        let store = InMemorySessionStore::new();
        drop(store.acquire("conv_1", "user_1").await.unwrap());

        assert!(store.delete("conv_1").await);
        assert!(!store.delete("conv_1").await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_same_session_is_serialized() {
        let store = Arc::new(InMemorySessionStore::new());
        let guard = store.acquire("conv_1", "user_1").await.unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.acquire("conv_1", "user_1").await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        // Unrelated sessions proceed while conv_1 is held
        let other = tokio::time::timeout(
            Duration::from_millis(200),
            store.acquire("conv_2", "user_1"),
        )
        .await;
        assert!(matches!(other, Ok(Ok(_))));

        drop(guard);
        assert!(waiter.await.unwrap().is_ok());
    }
}
