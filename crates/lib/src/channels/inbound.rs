//! Inbound event from a channel, classified by content kind.

use crate::channels::telegram::TelegramUpdate;

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Text(String),
    Image { file_id: String },
    /// Voice message; the platform reports its MIME type.
    Audio {
        file_id: String,
        mime_type: Option<String>,
    },
    Video { file_id: String },
}

impl ContentKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContentKind::Text(_) => "text",
            ContentKind::Image { .. } => "image",
            ContentKind::Audio { .. } => "audio",
            ContentKind::Video { .. } => "video",
        }
    }
}

/// A message from a channel to be answered by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub channel_id: String,
    pub conversation_id: String,
    pub kind: ContentKind,
    pub caption: Option<String>,
}

impl InboundEvent {
    /// Classify a Telegram update. Updates without a supported message (stickers, edits,
    /// documents, ...) yield None.
    pub fn from_update(update: &TelegramUpdate) -> Option<Self> {
        let msg = update.message.as_ref()?;
        let kind = if let Some(ref text) = msg.text {
            ContentKind::Text(text.clone())
        } else if let Some(largest) = msg.photo.last() {
            ContentKind::Image {
                file_id: largest.file_id.clone(),
            }
        } else if let Some(ref voice) = msg.voice {
            ContentKind::Audio {
                file_id: voice.file_id.clone(),
                mime_type: voice.mime_type.clone(),
            }
        } else if let Some(video) = msg.video.as_ref().or(msg.video_note.as_ref()) {
            ContentKind::Video {
                file_id: video.file_id.clone(),
            }
        } else {
            return None;
        };
        let caption = msg
            .caption
            .as_ref()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        Some(Self {
            channel_id: "telegram".to_string(),
            conversation_id: msg.chat.id.to_string(),
            kind,
            caption,
        })
    }
}
