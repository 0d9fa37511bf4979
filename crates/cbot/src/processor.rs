//! Built-in message handling: a few session commands plus recording what the
//! user sent.

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use cbot_core::{
    domain::BotCommand,
    messaging::types::SendOptions,
    ports::{MessageProcessor, Turn},
    session::ClearScope,
    Result,
};

const LANGUAGE_PREF: &str = "language";
const MESSAGE_COUNT: &str = "messages";

/// `/name[@bot] [args]`
#[derive(Debug, PartialEq, Eq)]
pub struct Command<'a> {
    pub name: String,
    pub target: Option<&'a str>,
    pub args: &'a str,
}

pub struct BuiltinProcessor {
    command_re: Regex,
}

impl BuiltinProcessor {
    pub fn new() -> std::result::Result<Self, regex::Error> {
        let command_re = Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@(\S+))?(?:\s+(.*))?$")?;
        Ok(Self { command_re })
    }

    /// Commands advertised to the transport at startup.
    pub fn commands() -> Vec<BotCommand> {
        vec![
            BotCommand::new("start", "Say hello"),
            BotCommand::new("clear", "Clear the conversation"),
            BotCommand::new("forget", "Clear the conversation and pending media"),
            BotCommand::new("lang", "Show or set your language"),
        ]
    }

    pub fn parse<'a>(&self, text: &'a str) -> Option<Command<'a>> {
        let caps = self.command_re.captures(text.trim())?;
        Some(Command {
            name: caps.get(1)?.as_str().to_lowercase(),
            target: caps.get(2).map(|m| m.as_str()),
            args: caps.get(3).map(|m| m.as_str().trim()).unwrap_or(""),
        })
    }

    async fn run_command(&self, cmd: Command<'_>, turn: Turn<'_>) -> Result<()> {
        let Turn {
            message,
            session,
            messenger,
            bot,
        } = turn;

        let reply = match cmd.name.as_str() {
            "start" => {
                let name = message
                    .user
                    .full_name
                    .as_deref()
                    .or(message.user.username.as_deref())
                    .unwrap_or("there");
                format!("Hi {name}! Send me text, a photo or a voice note.")
            }
            "clear" => {
                session.clear(ClearScope::Conversation);
                "Conversation cleared.".to_string()
            }
            "forget" => {
                session.clear(ClearScope::User);
                "Conversation and pending media cleared.".to_string()
            }
            "lang" if cmd.args.is_empty() => {
                let current = session
                    .preference(LANGUAGE_PREF)
                    .and_then(Value::as_str)
                    .unwrap_or(&bot.language);
                format!("Your language is {current}.")
            }
            "lang" => {
                let code = cmd.args.to_lowercase();
                session.set_preference(LANGUAGE_PREF, code.as_str());
                format!("Language set to {code}.")
            }
            other => format!("Unknown command /{other}."),
        };

        messenger
            .send_message(message.chat_id, &reply, SendOptions::reply_to(message.message_id))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageProcessor for BuiltinProcessor {
    async fn process(&self, turn: Turn<'_>) -> Result<()> {
        let message = turn.message;
        if let Some(cmd) = message.text.as_deref().and_then(|t| self.parse(t)) {
            let ours = match (cmd.target, turn.bot.bot_id.as_deref()) {
                (Some(target), Some(me)) => target.eq_ignore_ascii_case(me),
                _ => true,
            };
            if !ours {
                return Ok(());
            }
            return self.run_command(cmd, turn).await;
        }

        let Turn { session, messenger, .. } = turn;

        let mut noted = Vec::new();
        if let Some(text) = &message.text {
            session.set("last_text", text.as_str());
            noted.push("text");
        }
        if let Some(image) = &message.image {
            session.set("last_image", image.as_str());
            noted.push("image");
        }
        if let Some(audio) = message.audio.as_ref().or(message.voice.as_ref()) {
            session.set("last_audio", audio.as_str());
            noted.push("audio");
        }
        if noted.is_empty() {
            return Ok(());
        }

        let count = session
            .get(MESSAGE_COUNT)
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + 1;
        session.set(MESSAGE_COUNT, count);

        let reply = format!("Noted your {} (message #{count}).", noted.join(" and "));
        messenger
            .send_message(message.chat_id, &reply, SendOptions::reply_to(message.message_id))
            .await?;
        Ok(())
    }
}
