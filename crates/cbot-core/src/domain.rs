use serde::{Deserialize, Serialize};

/// Transport user id (numeric).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Transport chat id (numeric).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Transport message id (numeric, unique within a chat).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

/// A stable reference to a sent or received message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// A command advertised by the bot during startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

impl BotCommand {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// Bot identity and settings shared with every worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub bot_id: Option<String>,
    pub language: String,
    pub commands: Vec<BotCommand>,
}

impl Default for BotIdentity {
    fn default() -> Self {
        Self {
            bot_id: None,
            language: "en".to_string(),
            commands: Vec::new(),
        }
    }
}
