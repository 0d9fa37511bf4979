use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    message::Message,
    messaging::{
        port::MessagingService,
        types::{DownloadedFile, FileInfo, Media, SendOptions},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* outbound calls (global flood control).
    pub global_min_interval: Duration,
    /// Minimum spacing between calls per chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40), // ~25/sec
            per_chat_min_interval: Duration::from_millis(1050), // ~0.95/sec
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.next <= now
    }
}

/// `MessagingService` decorator that rate-limits outbound calls.
///
/// Limiters are shared by every worker thread using the same decorator, so
/// spacing holds across the whole pool.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingService>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_chat: Mutex<HashMap<ChatId, IntervalLimiter>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingService>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_chat: Mutex::new(HashMap::new()),
        }
    }

    async fn throttle_chat(&self, chat_id: ChatId) {
        let global_wait = { self.global.lock().await.reserve() };
        let chat_wait = {
            let mut map = self.per_chat.lock().await;
            // A limiter whose slot has passed behaves like a fresh one.
            let now = Instant::now();
            map.retain(|_, lim| !lim.is_idle(now));
            map.entry(chat_id)
                .or_insert_with(|| IntervalLimiter::new(self.cfg.per_chat_min_interval))
                .reserve()
        };

        let wait = global_wait.max(chat_wait);
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl MessagingService for ThrottledMessenger {
    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn get_file(&self, file_id: &str) -> Result<DownloadedFile> {
        self.throttle_global().await;
        self.inner.get_file(file_id).await
    }

    async fn get_file_info(&self, file_id: &str) -> Result<FileInfo> {
        self.throttle_global().await;
        self.inner.get_file_info(file_id).await
    }

    async fn get_message(&self, message_id: MessageId) -> Result<Message> {
        // No chat_id available here; apply global throttling only.
        self.throttle_global().await;
        self.inner.get_message(message_id).await
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id).await;
        self.inner.send_message(chat_id, text, opts).await
    }

    async fn edit_message(&self, msg: MessageRef, text: &str, opts: SendOptions) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.edit_message(msg, text, opts).await
    }

    async fn edit_message_media(
        &self,
        msg: MessageRef,
        media: Media,
        text: Option<&str>,
        opts: SendOptions,
    ) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.edit_message_media(msg, media, text, opts).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.throttle_chat(msg.chat_id).await;
        self.inner.delete_message(msg).await
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: Media,
        text: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        self.throttle_chat(chat_id).await;
        self.inner.send_media(chat_id, media, text, opts).await
    }

    fn supports_editing_media(&self) -> bool {
        self.inner.supports_editing_media()
    }
}
