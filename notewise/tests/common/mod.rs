// Common test utilities for integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use notewise::config::{Config, StaticConfigSource};
use notewise::db::{index_notes, InMemoryNoteStore, InMemoryStyleRegistry, NoteRecord};
use notewise::embeddings::{Embedder, EmbeddingPurpose};
use notewise::error::{ChatError, Result};
use notewise::llm::{ChatModel, ChatOptions};
use notewise::models::ChatMessage;
use notewise::services::ChatService;
use notewise::sessions::InMemorySessionStore;

pub use serial_test::serial;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Opening line of the intent planner prompt.
pub const PLANNER_MARKER: &str = "You route turns";

// ── Scripted chat model ───────────────────────────────────────────────────

/// One recorded call to the chat model.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
}

impl RecordedCall {
    pub fn is_planner(&self) -> bool {
        self.messages.len() == 1 && self.messages[0].content.starts_with(PLANNER_MARKER)
    }

    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Chat model that answers from a queue and records every call. An empty
/// queue answers with a fixed reply.
#[derive(Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Option<Duration>,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn reply(self, text: &str) -> Self {
        self.push(Ok(text.to_string()));
        self
    }

    pub fn fail(self, error: ChatError) -> Self {
        self.push(Err(error));
        self
    }

    pub fn push(&self, reply: Result<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn planner_calls(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(RecordedCall::is_planner).collect()
    }

    pub fn generation_calls(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| !c.is_planner()).collect()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn chat(&self, messages: &[ChatMessage], options: Option<&ChatOptions>) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedCall {
            messages: messages.to_vec(),
            model: options.and_then(|o| o.model.clone()),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.replies.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok("scripted reply".to_string()))
    }
}

// ── Keyword embedder ──────────────────────────────────────────────────────

const VOCABULARY: &[&str] = &["budget", "travel", "onboarding", "rent", "recipe"];

/// Embeds text as counts of a small fixed vocabulary plus a constant axis, so
/// texts sharing a topic word are close and unrelated texts are not.
#[derive(Default)]
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str, _purpose: EmbeddingPurpose) -> Result<Vec<f32>> {
        let text = text.to_lowercase();
        let mut vector: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| text.matches(word).count() as f32)
            .collect();
        vector.push(0.1);
        Ok(vector)
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────

pub const USER: &str = "alice";

pub fn record(id: &str, title: &str, content: &str, notebook: &str, day: u32) -> NoteRecord {
    NoteRecord {
        id: Some(id.to_string()),
        owner_id: USER.to_string(),
        title: title.to_string(),
        content: content.to_string(),
        notebook: Some(notebook.to_string()),
        updated_at: Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).single(),
    }
}

/// Five budget notes with near-identical titles plus a few unrelated notes.
pub fn finance_records() -> Vec<NoteRecord> {
    vec![
        record("b1", "Budget 2024 Q1", "Budget for January to March: spent 1200.", "Finance", 1),
        record("b2", "Budget 2024 Q2", "Budget for April to June: spent 1100.", "Finance", 2),
        record("b3", "Budget 2024 Q3", "Budget for July to September: spent 1300.", "Finance", 3),
        record("b4", "Budget 2024 Q4", "Budget for October to December: spent 1250.", "Finance", 4),
        record("b5", "Budget 2024", "Yearly budget overview and savings goals.", "Finance", 5),
        record("t1", "Lisbon trip", "Travel plans for Lisbon in May.", "Personal", 6),
        record("r1", "Rent", "Rent is 1200 per month, due on the first.", "Personal", 7),
        record("g1", "Groceries", "Weekly groceries list: eggs, milk, bread.", "Personal", 8),
    ]
}

pub async fn note_store(records: Vec<NoteRecord>) -> Arc<InMemoryNoteStore> {
    let store = InMemoryNoteStore::new();
    index_notes(&store, &KeywordEmbedder, records)
        .await
        .expect("index fixture notes");
    Arc::new(store)
}

pub struct Harness {
    pub chat: ChatService,
    pub llm: Arc<ScriptedChatModel>,
    pub notes: Arc<InMemoryNoteStore>,
}

pub async fn harness(llm: ScriptedChatModel) -> Harness {
    harness_with_records(llm, finance_records()).await
}

pub async fn harness_with_records(llm: ScriptedChatModel, records: Vec<NoteRecord>) -> Harness {
    let notes = note_store(records).await;
    let llm = Arc::new(llm);
    let chat = ChatService::new(
        notes.clone(),
        Arc::new(InMemoryStyleRegistry::with_defaults()),
        Arc::new(InMemorySessionStore::new()),
        Arc::new(KeywordEmbedder),
        llm.clone(),
        Arc::new(StaticConfigSource::new()),
        &test_config(),
    );

    Harness { chat, llm, notes }
}

/// Defaults without reading the environment.
pub fn test_config() -> Config {
    Config {
        chat: Default::default(),
        retrieval: Default::default(),
        embeddings: notewise::config::EmbeddingsConfig {
            model: "local/BAAI/bge-small-en-v1.5".to_string(),
            api_key: None,
            base_url: None,
            dimensions: 384,
            batch_size: 8,
            timeout_secs: 5,
            max_retries: 0,
            input_style: None,
            query_prefix: None,
            document_prefix: None,
        },
        llm: None,
    }
}
