//! Telegram update -> core [`Message`].

use cbot_core::{
    domain::{ChatId, MessageId, UserId},
    message::{Message, User},
};

/// Convert an incoming Telegram message. Messages without a sender (channel
/// posts) have no session owner and yield `None`.
pub fn to_core(msg: &teloxide::types::Message, bot_id: Option<&str>) -> Option<Message> {
    let from = msg.from()?;
    let user = User {
        username: from.username.clone(),
        phone: None,
        full_name: Some(from.full_name()),
        language: from.language_code.clone(),
    };

    let mut b = Message::builder(
        MessageId(msg.id.0),
        UserId(from.id.0 as i64),
        ChatId(msg.chat.id.0),
        user,
    )
    .forwarded(msg.forward_date().is_some());

    if let Some(bot_id) = bot_id {
        b = b.bot_id(bot_id);
    }
    if let Some(text) = msg.text().or_else(|| msg.caption()) {
        b = b.text(text);
    }
    // Largest size comes last.
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        b = b.image(photo.file.id.clone());
    }
    if let Some(audio) = msg.audio() {
        b = b.audio(audio.file.id.clone());
    }
    if let Some(voice) = msg.voice() {
        b = b.voice(voice.file.id.clone());
    }
    if let Some(video) = msg.video() {
        b = b.video(video.file.id.clone());
    }
    if let Some(reply) = msg.reply_to_message() {
        b = match to_core(reply, bot_id) {
            Some(parent) => b.reply_to(parent),
            None => b.reply_to_id(MessageId(reply.id.0)),
        };
    }

    Some(b.build())
}
