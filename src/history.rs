//! Remote history access: `messages.getHistory` and TL to domain conversion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grammers_client::Client;
use grammers_tl_types as tl;

use crate::error::{Error, Result};
use crate::models::{Media, RemoteMessage};

#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Up to `limit` messages with ids strictly below `offset_id`
    /// (`0` = from the newest), newest first. Empty means history is exhausted.
    async fn get_history(&self, limit: i32, offset_id: i32) -> Result<Vec<RemoteMessage>>;
}

/// History of one resolved channel over a connected client.
pub struct TelegramHistory<'a> {
    client: &'a Client,
    peer: tl::enums::InputPeer,
}

impl<'a> TelegramHistory<'a> {
    pub fn new(client: &'a Client, peer: tl::enums::InputPeer) -> Self {
        Self { client, peer }
    }
}

#[async_trait]
impl HistorySource for TelegramHistory<'_> {
    async fn get_history(&self, limit: i32, offset_id: i32) -> Result<Vec<RemoteMessage>> {
        let request = tl::functions::messages::GetHistory {
            peer: self.peer.clone(),
            offset_id,
            offset_date: 0,
            add_offset: 0,
            limit,
            max_id: 0,
            min_id: 0,
            hash: 0,
        };

        let response = self.client.invoke(&request).await?;
        messages_from_response(response)
    }
}

fn messages_from_response(response: tl::enums::messages::Messages) -> Result<Vec<RemoteMessage>> {
    let raw = match response {
        tl::enums::messages::Messages::Messages(m) => m.messages,
        tl::enums::messages::Messages::Slice(m) => m.messages,
        tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
        tl::enums::messages::Messages::NotModified(_) => {
            return Err(Error::TelegramError(
                "messages.getHistory returned messagesNotModified".to_string(),
            ))
        }
    };

    Ok(raw.into_iter().map(remote_message).collect())
}

/// Convert one TL message. Service and empty messages keep their id so the
/// cursor still moves past them.
pub fn remote_message(message: tl::enums::Message) -> RemoteMessage {
    match message {
        tl::enums::Message::Message(m) => RemoteMessage {
            id: m.id,
            date: unix_date(m.date),
            text: Some(m.message),
            reply_to_msg_id: m.reply_to.and_then(reply_to_msg_id),
            replies: m.replies.map(|tl::enums::MessageReplies::Replies(r)| r.replies),
            media: m.media.map(media).unwrap_or(Media::None),
        },
        tl::enums::Message::Service(m) => RemoteMessage {
            id: m.id,
            date: unix_date(m.date),
            text: None,
            reply_to_msg_id: m.reply_to.and_then(reply_to_msg_id),
            replies: None,
            media: Media::None,
        },
        tl::enums::Message::Empty(m) => RemoteMessage::new(m.id),
    }
}

fn unix_date(timestamp: i32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(timestamp), 0)
}

fn reply_to_msg_id(header: tl::enums::MessageReplyHeader) -> Option<i32> {
    match header {
        tl::enums::MessageReplyHeader::Header(h) => h.reply_to_msg_id,
        _ => None,
    }
}

/// Classify a TL media payload into the closed [`Media`] set.
pub fn media(media: tl::enums::MessageMedia) -> Media {
    match media {
        tl::enums::MessageMedia::Photo(m) => match m.photo {
            Some(tl::enums::Photo::Photo(photo)) => Media::Photo { id: photo.id },
            Some(tl::enums::Photo::Empty(photo)) => Media::Photo { id: photo.id },
            None => Media::Other("MessageMediaPhoto (expired)".to_string()),
        },
        tl::enums::MessageMedia::Document(m) => match m.document {
            Some(tl::enums::Document::Document(document)) => Media::Document {
                id: document.id,
                mime_type: document.mime_type,
            },
            // Archived by id; the mime type is unknown
            Some(tl::enums::Document::Empty(document)) => Media::Document {
                id: document.id,
                mime_type: String::new(),
            },
            None => Media::Other("MessageMediaDocument (expired)".to_string()),
        },
        tl::enums::MessageMedia::WebPage(m) => match m.webpage {
            tl::enums::WebPage::Page(page) => Media::WebPage { id: page.id },
            tl::enums::WebPage::Pending(page) => Media::WebPage { id: page.id },
            tl::enums::WebPage::Empty(page) => Media::WebPage { id: page.id },
            tl::enums::WebPage::NotModified(_) => {
                Media::Other("MessageMediaWebPage (not modified)".to_string())
            }
        },
        other => Media::Other(media_name(&other).to_string()),
    }
}

fn media_name(media: &tl::enums::MessageMedia) -> &'static str {
    match media {
        tl::enums::MessageMedia::Empty => "MessageMediaEmpty",
        tl::enums::MessageMedia::Geo(_) => "MessageMediaGeo",
        tl::enums::MessageMedia::Contact(_) => "MessageMediaContact",
        tl::enums::MessageMedia::Venue(_) => "MessageMediaVenue",
        tl::enums::MessageMedia::Poll(_) => "MessageMediaPoll",
        tl::enums::MessageMedia::Dice(_) => "MessageMediaDice",
        _ => "MessageMediaUnsupported",
    }
}
