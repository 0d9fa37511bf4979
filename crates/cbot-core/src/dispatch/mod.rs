//! Worker pool draining the shared inbound queue.

pub mod chat_locks;
pub mod dispatcher;
pub mod queue;
pub mod worker;

pub use chat_locks::ChatLocks;
pub use dispatcher::{available_workers, Dispatcher, DispatcherBuilder, DispatcherState};
pub use queue::UpdateQueue;
pub use worker::Worker;
