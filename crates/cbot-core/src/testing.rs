//! Fakes shared by unit tests across modules.

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    message::Message,
    messaging::{
        types::{DownloadedFile, FileInfo, Media, SendOptions},
        MessagingService,
    },
    Result,
};

/// Accepts sends, edits and deletes; media and lookups are unsupported.
#[derive(Default)]
pub(crate) struct NullMessenger;

#[async_trait]
impl MessagingService for NullMessenger {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn get_file(&self, _file_id: &str) -> Result<DownloadedFile> {
        Err(Error::Unsupported("get_file"))
    }

    async fn get_file_info(&self, _file_id: &str) -> Result<FileInfo> {
        Err(Error::Unsupported("get_file_info"))
    }

    async fn get_message(&self, _message_id: MessageId) -> Result<Message> {
        Err(Error::Unsupported("get_message"))
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        _text: &str,
        _opts: SendOptions,
    ) -> Result<MessageRef> {
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1),
        })
    }

    async fn edit_message(&self, _msg: MessageRef, _text: &str, _opts: SendOptions) -> Result<()> {
        Ok(())
    }

    async fn edit_message_media(
        &self,
        _msg: MessageRef,
        _media: Media,
        _text: Option<&str>,
        _opts: SendOptions,
    ) -> Result<()> {
        Err(Error::Unsupported("edit_message_media"))
    }

    async fn delete_message(&self, _msg: MessageRef) -> Result<()> {
        Ok(())
    }

    async fn send_media(
        &self,
        _chat_id: ChatId,
        _media: Media,
        _text: Option<&str>,
        _opts: SendOptions,
    ) -> Result<MessageRef> {
        Err(Error::Unsupported("send_media"))
    }
}
