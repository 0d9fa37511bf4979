use std::path::PathBuf;

use crate::{domain::MessageId, utils::truncate_text};

/// Kind of outbound media.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
    Voice,
    Video,
    Document,
}

/// Where the transport should take the media bytes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaSource {
    Url(String),
    Path(PathBuf),
    /// A file the transport already knows about.
    FileId(String),
    Bytes { file_name: String, data: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Media {
    pub kind: MediaKind,
    pub source: MediaSource,
}

impl Media {
    pub fn new(kind: MediaKind, source: MediaSource) -> Self {
        Self { kind, source }
    }

    pub fn image(source: MediaSource) -> Self {
        Self::new(MediaKind::Image, source)
    }

    pub fn audio(source: MediaSource) -> Self {
        Self::new(MediaKind::Audio, source)
    }
}

/// Inline keyboard (buttons attached to a message).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(options: &[(String, String)], max_label_len: usize) -> Self {
        let rows = options
            .iter()
            .map(|(label, data)| {
                vec![InlineButton {
                    label: truncate_text(label, max_label_len),
                    callback_data: data.clone(),
                }]
            })
            .collect();
        Self { rows }
    }
}

/// Reply keyboard (quick replies shown in place of the text input).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
}

/// Optional knobs shared by send/edit operations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reply_to: Option<MessageId>,
    pub buttons: Option<InlineKeyboard>,
    pub reply_buttons: Option<ReplyKeyboard>,
}

impl SendOptions {
    pub fn reply_to(message_id: MessageId) -> Self {
        Self {
            reply_to: Some(message_id),
            ..Self::default()
        }
    }
}

/// File metadata as reported by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub file_id: String,
    pub path: Option<String>,
    pub size: Option<u64>,
}

/// A file fetched from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedFile {
    pub name: String,
    pub data: Vec<u8>,
}
