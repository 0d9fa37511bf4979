//! Per-conversation state and its write-back cache.

pub mod cached;
pub mod state;
pub mod store;

pub use cached::CachedSession;
pub use state::{is_blank, ClearScope, Session, StateMap};
pub use store::{InMemoryStore, JsonFileStore, SessionRecord, SessionStore};
