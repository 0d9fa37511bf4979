//! Telegram adapter (teloxide).
//!
//! Implements the `cbot-core` [`MessagingService`] and [`Frontend`] ports over
//! the Telegram Bot API.
//!
//! [`Frontend`]: cbot_core::ports::Frontend

use std::{future::IntoFuture, path::Path};

use async_trait::async_trait;
use teloxide::{net::Download, prelude::*, types::InputMedia};
use tokio::time::sleep;

pub mod convert;
pub mod frontend;
pub mod markup;

pub use frontend::TelegramFrontend;

use cbot_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    message::Message,
    messaging::{
        types::{DownloadedFile, FileInfo, Media, MediaKind, SendOptions},
        MessagingService,
    },
    Result,
};

fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
    teloxide::types::ChatId(chat_id.0)
}

fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(message_id.0)
}

fn map_err(e: teloxide::RequestError) -> Error {
    Error::External(format!("telegram error: {e}"))
}

/// Run a Bot API request, retrying once when Telegram asks us to back off.
pub(crate) async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                tracing::warn!(retry_after = ?d, "telegram flood control, retrying");
                sleep(d).await;
            }
            Err(other) => return Err(map_err(other)),
        }
    }
}

/// Applies caption, reply target and markup to any `send_*` media request.
macro_rules! media_request {
    ($req:expr, $caption:expr, $opts:expr, $markup:expr) => {{
        let mut req = $req;
        if let Some(caption) = $caption {
            req = req.caption(caption.to_string());
        }
        if let Some(id) = $opts.reply_to {
            req = req.reply_to_message_id(tg_msg_id(id));
        }
        if let Some(markup) = $markup.clone() {
            req = req.reply_markup(markup);
        }
        req
    }};
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn sent(chat_id: ChatId, msg: &teloxide::types::Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

#[async_trait]
impl MessagingService for TelegramMessenger {
    async fn initialize(&self) -> Result<()> {
        // The bot handle is ready as soon as it is built; the frontend checks
        // the token with `get_me`.
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<DownloadedFile> {
        let file = with_retry(|| self.bot.get_file(file_id.to_string())).await?;

        let mut data = Vec::with_capacity(file.size as usize);
        self.bot
            .download_file(&file.path, &mut data)
            .await
            .map_err(|e| Error::External(format!("telegram download failed: {e}")))?;

        let name = Path::new(&file.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_id.to_string());
        Ok(DownloadedFile { name, data })
    }

    async fn get_file_info(&self, file_id: &str) -> Result<FileInfo> {
        let file = with_retry(|| self.bot.get_file(file_id.to_string())).await?;
        Ok(FileInfo {
            file_id: file.id.clone(),
            path: Some(file.path.clone()),
            size: Some(u64::from(file.size)),
        })
    }

    async fn get_message(&self, _message_id: MessageId) -> Result<Message> {
        // The Bot API only delivers messages through updates.
        Err(Error::Unsupported("get_message"))
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let markup = markup::reply_markup(&opts);
        let msg = with_retry(|| {
            let mut req = self.bot.send_message(tg_chat(chat_id), text.to_string());
            if let Some(id) = opts.reply_to {
                req = req.reply_to_message_id(tg_msg_id(id));
            }
            if let Some(markup) = markup.clone() {
                req = req.reply_markup(markup);
            }
            req
        })
        .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn edit_message(&self, msg: MessageRef, text: &str, opts: SendOptions) -> Result<()> {
        let keyboard = opts.buttons.as_ref().map(markup::inline_markup);
        with_retry(|| {
            let mut req = self.bot.edit_message_text(
                tg_chat(msg.chat_id),
                tg_msg_id(msg.message_id),
                text.to_string(),
            );
            if let Some(keyboard) = keyboard.clone() {
                req = req.reply_markup(keyboard);
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn edit_message_media(
        &self,
        msg: MessageRef,
        media: Media,
        text: Option<&str>,
        opts: SendOptions,
    ) -> Result<()> {
        let input: InputMedia = markup::input_media(&media, text)?;
        let keyboard = opts.buttons.as_ref().map(markup::inline_markup);
        with_retry(|| {
            let mut req = self.bot.edit_message_media(
                tg_chat(msg.chat_id),
                tg_msg_id(msg.message_id),
                input.clone(),
            );
            if let Some(keyboard) = keyboard.clone() {
                req = req.reply_markup(keyboard);
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        with_retry(|| {
            self.bot
                .delete_message(tg_chat(msg.chat_id), tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: Media,
        text: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef> {
        let file = markup::input_file(&media.source)?;
        let markup = markup::reply_markup(&opts);
        let chat = tg_chat(chat_id);

        let msg = match media.kind {
            MediaKind::Image => {
                with_retry(|| {
                    media_request!(self.bot.send_photo(chat, file.clone()), text, opts, markup)
                })
                .await?
            }
            MediaKind::Audio => {
                with_retry(|| {
                    media_request!(self.bot.send_audio(chat, file.clone()), text, opts, markup)
                })
                .await?
            }
            MediaKind::Voice => {
                with_retry(|| {
                    media_request!(self.bot.send_voice(chat, file.clone()), text, opts, markup)
                })
                .await?
            }
            MediaKind::Video => {
                with_retry(|| {
                    media_request!(self.bot.send_video(chat, file.clone()), text, opts, markup)
                })
                .await?
            }
            MediaKind::Document => {
                with_retry(|| {
                    media_request!(self.bot.send_document(chat, file.clone()), text, opts, markup)
                })
                .await?
            }
        };
        Ok(Self::sent(chat_id, &msg))
    }

    fn supports_editing_media(&self) -> bool {
        true
    }
}
