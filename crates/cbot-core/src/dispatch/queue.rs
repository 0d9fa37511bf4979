use std::sync::Arc;

use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    Mutex,
};

use crate::{errors::Error, message::Message, Result};

/// Producer handle for the shared inbound queue.
///
/// Unbounded: `enqueue` never blocks and never inspects the update.
#[derive(Clone, Debug)]
pub struct UpdateQueue {
    tx: UnboundedSender<Message>,
}

impl UpdateQueue {
    pub fn enqueue(&self, update: Message) -> Result<()> {
        self.tx.send(update).map_err(|_| Error::QueueClosed)
    }
}

/// Consumer side shared by every worker. Whoever holds the lock waits for the
/// next update; the others wait for the lock.
#[derive(Clone, Debug)]
pub(crate) struct SharedReceiver {
    rx: Arc<Mutex<UnboundedReceiver<Message>>>,
}

impl SharedReceiver {
    /// Cancel-safe: dropping the future never loses an update.
    pub(crate) async fn next(&self) -> Option<Message> {
        self.rx.lock().await.recv().await
    }
}

pub(crate) fn channel() -> (UpdateQueue, SharedReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        UpdateQueue { tx },
        SharedReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}
