//! Collaborator ports the dispatcher calls into (or is called from).

use async_trait::async_trait;

use crate::{
    dispatch::queue::UpdateQueue,
    domain::{BotIdentity, MessageRef},
    errors::Error,
    message::Message,
    messaging::MessagingService,
    session::CachedSession,
    Result,
};

/// Everything a handler sees while processing one message.
pub struct Turn<'a> {
    pub message: &'a Message,
    pub session: &'a mut CachedSession,
    pub messenger: &'a dyn MessagingService,
    pub bot: &'a BotIdentity,
}

/// Handler/command layer. Mutates the session and talks to the messenger;
/// the worker persists the session afterwards.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    async fn process(&self, turn: Turn<'_>) -> Result<()>;
}

/// Sink for handler-level failures. Called from worker threads.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &Error, origin: MessageRef);
}

/// Default reporter: logs and moves on.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &Error, origin: MessageRef) {
        tracing::error!(
            chat_id = origin.chat_id.0,
            message_id = origin.message_id.0,
            "failed to process message: {error}"
        );
    }
}

/// Inbound text translation into the bot language.
#[async_trait]
pub trait Translator: Send + Sync {
    /// `None` (or an empty string) means "keep the original".
    async fn translate(&self, text: &str, target_language: &str) -> Result<Option<String>>;
}

/// The transport-facing side of the bot: one-time startup and the blocking
/// serve loop that feeds the update queue.
#[async_trait]
pub trait Frontend: Send + Sync {
    /// Runs once before any worker starts. A failure aborts startup.
    async fn initialize(&self, bot: &BotIdentity) -> Result<()>;

    /// Returns only on shutdown.
    async fn serve(&self, queue: UpdateQueue) -> Result<()>;
}
