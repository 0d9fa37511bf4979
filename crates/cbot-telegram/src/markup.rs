//! Mapping from core send options and media onto teloxide types.

use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia, InputMediaAudio,
    InputMediaDocument, InputMediaPhoto, InputMediaVideo, KeyboardButton, KeyboardMarkup,
    ReplyMarkup,
};

use cbot_core::{
    errors::Error,
    messaging::types::{InlineKeyboard, Media, MediaKind, MediaSource, ReplyKeyboard, SendOptions},
    Result,
};

pub fn inline_markup(keyboard: &InlineKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback_data.clone()))
            .collect::<Vec<_>>()
    }))
}

pub fn reply_keyboard(keyboard: &ReplyKeyboard) -> KeyboardMarkup {
    KeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|label| KeyboardButton::new(label.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Inline buttons win over a reply keyboard when both are set.
pub fn reply_markup(opts: &SendOptions) -> Option<ReplyMarkup> {
    if let Some(buttons) = &opts.buttons {
        return Some(ReplyMarkup::InlineKeyboard(inline_markup(buttons)));
    }
    opts.reply_buttons
        .as_ref()
        .map(|kb| ReplyMarkup::Keyboard(reply_keyboard(kb)))
}

pub fn input_file(source: &MediaSource) -> Result<InputFile> {
    Ok(match source {
        MediaSource::Url(raw) => {
            let url = reqwest::Url::parse(raw)
                .map_err(|e| Error::External(format!("invalid media url {raw:?}: {e}")))?;
            InputFile::url(url)
        }
        MediaSource::Path(path) => InputFile::file(path.clone()),
        MediaSource::FileId(id) => InputFile::file_id(id.clone()),
        MediaSource::Bytes { file_name, data } => {
            InputFile::memory(data.clone()).file_name(file_name.clone())
        }
    })
}

/// Telegram cannot swap a message's media for a voice note.
pub fn input_media(media: &Media, caption: Option<&str>) -> Result<InputMedia> {
    let file = input_file(&media.source)?;
    let caption = caption.map(str::to_string);

    Ok(match media.kind {
        MediaKind::Image => {
            let mut m = InputMediaPhoto::new(file);
            if let Some(c) = caption {
                m = m.caption(c);
            }
            InputMedia::Photo(m)
        }
        MediaKind::Audio => {
            let mut m = InputMediaAudio::new(file);
            if let Some(c) = caption {
                m = m.caption(c);
            }
            InputMedia::Audio(m)
        }
        MediaKind::Video => {
            let mut m = InputMediaVideo::new(file);
            if let Some(c) = caption {
                m = m.caption(c);
            }
            InputMedia::Video(m)
        }
        MediaKind::Document => {
            let mut m = InputMediaDocument::new(file);
            if let Some(c) = caption {
                m = m.caption(c);
            }
            InputMedia::Document(m)
        }
        MediaKind::Voice => return Err(Error::Unsupported("edit_message_media(voice)")),
    })
}
