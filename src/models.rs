//! Data types shared by the fetch loop, normalizer and stores.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Media payload of a remote message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    None,
    Photo { id: i64 },
    Document { id: i64, mime_type: String },
    WebPage { id: i64 },
    /// Any other media kind (geo, poll, contact, ...), kept by name for logging
    Other(String),
}

/// One message as returned by the history call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub id: i32,
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub reply_to_msg_id: Option<i32>,
    pub replies: Option<i32>,
    pub media: Media,
}

impl RemoteMessage {
    /// Bare message with only an id, no media and no optional fields.
    pub fn new(id: i32) -> Self {
        Self {
            id,
            date: None,
            text: None,
            reply_to_msg_id: None,
            replies: None,
            media: Media::None,
        }
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media = media;
        self
    }
}

/// Resolved channel the job reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Telegram channel id
    pub id: i64,
    /// Configured handle; also the cursor key and `channel_name` column
    pub name: String,
    /// Display title, when known
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttachmentType {
    Photo,
    Document,
    Webpage,
}

impl AttachmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentType::Photo => "PHOTO",
            AttachmentType::Document => "DOCUMENT",
            AttachmentType::Webpage => "WEBPAGE",
        }
    }
}

impl fmt::Display for AttachmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttachmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PHOTO" => Ok(AttachmentType::Photo),
            "DOCUMENT" => Ok(AttachmentType::Document),
            "WEBPAGE" => Ok(AttachmentType::Webpage),
            other => Err(format!("unknown attachment type: {}", other)),
        }
    }
}

/// Attachment descriptor ready for insertion (no generated id yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInput {
    pub media_id: String,
    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,
    pub mime_type: Option<String>,
}

/// Message row as stored in the `messages` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    pub channel_id: i64,
    pub channel_name: String,
    pub message_id: i32,
    pub date: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub reply_to_msg_id: Option<i32>,
    pub replies: i32,
    /// Media ids of the attachments, in order
    pub attachments: Vec<String>,
}

/// Normalized message: the row plus the attachments to write before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInput {
    pub row: MessageRow,
    pub attachments_input: Vec<AttachmentInput>,
}

impl MessageInput {
    /// Split into the row (attachment inputs stripped) and the inputs.
    pub fn into_parts(self) -> (MessageRow, Vec<AttachmentInput>) {
        (self.row, self.attachments_input)
    }
}

/// Per-channel pagination cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub channel: String,
    /// Smallest message id persisted so far; 0 means "start from the newest"
    pub offset_id: i32,
}

/// Rows written by one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attachments: usize,
    pub messages: usize,
}

/// Row counts reported by `status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    pub cursor: Option<Cursor>,
    pub messages: u64,
    pub attachments: u64,
    pub sessions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_type_round_trips_through_strings() {
        for ty in [
            AttachmentType::Photo,
            AttachmentType::Document,
            AttachmentType::Webpage,
        ] {
            assert_eq!(ty.as_str().parse::<AttachmentType>(), Ok(ty));
        }
        assert!("VIDEO".parse::<AttachmentType>().is_err());
    }

    #[test]
    fn attachment_type_serializes_uppercase() {
        let json = serde_json::to_string(&AttachmentType::Webpage).unwrap();
        assert_eq!(json, "\"WEBPAGE\"");
    }

    #[test]
    fn into_parts_strips_attachment_inputs() {
        let input = MessageInput {
            row: MessageRow {
                channel_id: 1,
                channel_name: "demo".into(),
                message_id: 7,
                date: None,
                message: None,
                reply_to_msg_id: None,
                replies: 0,
                attachments: vec!["9".into()],
            },
            attachments_input: vec![AttachmentInput {
                media_id: "9".into(),
                attachment_type: AttachmentType::Photo,
                mime_type: None,
            }],
        };

        let (row, attachments) = input.into_parts();
        assert_eq!(row.attachments, vec!["9".to_string()]);
        assert_eq!(attachments.len(), 1);
    }
}
