mod state;
mod store;

pub use state::TransitionError;
pub use store::{InMemorySessionStore, SessionGuard, SessionStore};
