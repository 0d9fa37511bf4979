use std::{collections::HashMap, fmt};

use serde_json::Value;

use crate::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    ports::Translator,
    Result,
};

/// Sender snapshot as supplied by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct User {
    pub username: Option<String>,
    pub phone: Option<String>,
    pub full_name: Option<String>,
    pub language: Option<String>,
}

/// An inbound (or fetched) message.
///
/// Payload channels hold transport file references. At most one primary
/// modality is expected per message, but none is enforced here.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub bot_id: Option<String>,
    pub user: User,
    pub reply_to_message: Option<Box<Message>>,
    pub reply_to_message_id: Option<MessageId>,
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub voice: Option<String>,
    pub video: Option<String>,
    /// Scratch space for one processing cycle. Never persisted.
    pub metadata: HashMap<String, Value>,
    pub is_forward: bool,
}

impl Message {
    pub fn builder(
        message_id: MessageId,
        user_id: UserId,
        chat_id: ChatId,
        user: User,
    ) -> MessageBuilder {
        MessageBuilder {
            msg: Message {
                message_id,
                user_id,
                chat_id,
                bot_id: None,
                user,
                reply_to_message: None,
                reply_to_message_id: None,
                text: None,
                image: None,
                audio: None,
                voice: None,
                video: None,
                metadata: HashMap::new(),
                is_forward: false,
            },
        }
    }

    pub fn reference(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }

    pub fn full_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Replace `text` with its translation into `language`.
    ///
    /// An empty or missing translation keeps the original text.
    pub async fn translate(&mut self, translator: &dyn Translator, language: &str) -> Result<()> {
        let Some(text) = self.text.as_deref() else {
            return Ok(());
        };
        if let Some(translated) = translator.translate(text, language).await? {
            if !translated.is_empty() {
                self.text = Some(translated);
            }
        }
        Ok(())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message({}, {}, {}, {:?})",
            self.message_id.0, self.chat_id.0, self.user_id.0, self.text
        )
    }
}

/// Builder for [`Message`]; `build()` derives the reply id from the reply object.
#[derive(Debug)]
pub struct MessageBuilder {
    msg: Message,
}

impl MessageBuilder {
    pub fn bot_id(mut self, bot_id: impl Into<String>) -> Self {
        self.msg.bot_id = Some(bot_id.into());
        self
    }

    pub fn reply_to(mut self, message: Message) -> Self {
        self.msg.reply_to_message = Some(Box::new(message));
        self
    }

    pub fn reply_to_id(mut self, message_id: MessageId) -> Self {
        self.msg.reply_to_message_id = Some(message_id);
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.msg.text = Some(text.into());
        self
    }

    pub fn image(mut self, file: impl Into<String>) -> Self {
        self.msg.image = Some(file.into());
        self
    }

    pub fn audio(mut self, file: impl Into<String>) -> Self {
        self.msg.audio = Some(file.into());
        self
    }

    pub fn voice(mut self, file: impl Into<String>) -> Self {
        self.msg.voice = Some(file.into());
        self
    }

    pub fn video(mut self, file: impl Into<String>) -> Self {
        self.msg.video = Some(file.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.msg.metadata.insert(key.into(), value.into());
        self
    }

    pub fn forwarded(mut self, is_forward: bool) -> Self {
        self.msg.is_forward = is_forward;
        self
    }

    pub fn build(mut self) -> Message {
        if self.msg.reply_to_message_id.is_none() {
            self.msg.reply_to_message_id =
                self.msg.reply_to_message.as_ref().map(|r| r.message_id);
        }
        self.msg
    }
}
