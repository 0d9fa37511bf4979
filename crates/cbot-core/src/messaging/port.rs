use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    message::Message,
    messaging::types::{DownloadedFile, FileInfo, Media, SendOptions},
    Result,
};

/// Transport port: the only egress surface for sending, editing and deleting
/// content.
///
/// Every operation must be supplied by the implementation. A transport that
/// genuinely cannot perform one returns [`Error::Unsupported`](crate::Error::Unsupported).
#[async_trait]
pub trait MessagingService: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn get_file(&self, file_id: &str) -> Result<DownloadedFile>;

    async fn get_file_info(&self, file_id: &str) -> Result<FileInfo>;

    async fn get_message(&self, message_id: MessageId) -> Result<Message>;

    async fn send_message(&self, chat_id: ChatId, text: &str, opts: SendOptions)
        -> Result<MessageRef>;

    async fn edit_message(&self, msg: MessageRef, text: &str, opts: SendOptions) -> Result<()>;

    async fn edit_message_media(
        &self,
        msg: MessageRef,
        media: Media,
        text: Option<&str>,
        opts: SendOptions,
    ) -> Result<()>;

    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_media(
        &self,
        chat_id: ChatId,
        media: Media,
        text: Option<&str>,
        opts: SendOptions,
    ) -> Result<MessageRef>;

    fn supports_editing_media(&self) -> bool {
        true
    }
}
