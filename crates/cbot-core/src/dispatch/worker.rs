use std::{
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use tokio_util::sync::CancellationToken;

use crate::{
    dispatch::{chat_locks::ChatLocks, queue::SharedReceiver},
    domain::BotIdentity,
    errors::Error,
    message::Message,
    messaging::MessagingService,
    ports::{ErrorReporter, MessageProcessor, Translator, Turn},
    session::{CachedSession, SessionStore},
    Result,
};

/// Collaborators every worker needs, shared across the pool.
pub(crate) struct WorkerShared {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) messenger: Arc<dyn MessagingService>,
    pub(crate) processor: Arc<dyn MessageProcessor>,
    pub(crate) reporter: Arc<dyn ErrorReporter>,
    pub(crate) translator: Option<Arc<dyn Translator>>,
    pub(crate) identity: BotIdentity,
    /// `None` disables per-chat serialization.
    pub(crate) chat_locks: Option<ChatLocks>,
}

impl WorkerShared {
    /// One full processing cycle for one update.
    async fn process(self: Arc<Self>, mut message: Message) -> Result<()> {
        if let Some(translator) = &self.translator {
            if let Err(e) = message
                .translate(translator.as_ref(), &self.identity.language)
                .await
            {
                tracing::warn!(update = %message, "translation failed, keeping original text: {e}");
            }
        }

        let _guard = match &self.chat_locks {
            Some(locks) => Some(locks.lock_chat(message.chat_id).await),
            None => None,
        };

        let mut session =
            CachedSession::from_cache(self.store.as_ref(), message.user_id, message.chat_id)
                .await?;

        let outcome = self
            .processor
            .process(Turn {
                message: &message,
                session: &mut session,
                messenger: self.messenger.as_ref(),
                bot: &self.identity,
            })
            .await;

        // Persist even when the handler failed: its mutations may already be
        // visible to the user.
        if let Err(persist_err) = session.persist(self.store.as_ref()).await {
            // Only one error travels back to `handle`; report the handler's here.
            if let Err(handler_err) = outcome {
                self.reporter.report(&handler_err, message.reference());
            }
            return Err(persist_err);
        }
        outcome
    }
}

/// One member of the pool. Paired with exactly one OS thread once started.
pub struct Worker {
    id: usize,
    shared: Arc<WorkerShared>,
}

impl Worker {
    pub(crate) fn new(id: usize, shared: Arc<WorkerShared>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Start the worker on its own thread.
    ///
    /// `done` is dropped when the thread exits (normally or by unwinding), which
    /// lets the dispatcher wait for the pool without joining blindly.
    pub(crate) fn spawn(
        self,
        queue: SharedReceiver,
        stop: CancellationToken,
        done: mpsc::Sender<()>,
    ) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("cbot-worker-{}", self.id))
            .spawn(move || {
                let _done = done;
                self.run(queue, stop);
            })
    }

    fn run(self, queue: SharedReceiver, stop: CancellationToken) {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                tracing::error!(worker = self.id, "failed to build worker runtime: {e}");
                return;
            }
        };

        tracing::debug!(worker = self.id, "worker started");
        rt.block_on(self.drain(queue, stop));
        tracing::debug!(worker = self.id, "worker stopped");
    }

    async fn drain(&self, queue: SharedReceiver, stop: CancellationToken) {
        loop {
            // The stop signal is only checked between updates.
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => None,
                update = queue.next() => update,
            };
            let Some(message) = next else {
                break;
            };
            self.handle(message).await;
        }
    }

    /// Process one update to completion. Errors and panics go to the reporter.
    pub(crate) async fn handle(&self, message: Message) {
        let origin = message.reference();
        let shared = self.shared.clone();
        let outcome = tokio::spawn(shared.process(message)).await;

        let error = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(join) => Error::External(format!("handler panicked: {join}")),
        };
        self.shared.reporter.report(&error, origin);
    }
}
