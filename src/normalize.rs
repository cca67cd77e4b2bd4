//! Remote message to storage row mapping.

use crate::models::{
    AttachmentInput, AttachmentType, ChannelInfo, Media, MessageInput, MessageRow, RemoteMessage,
};

/// Attachment descriptor for a media payload, if the kind is archived.
pub fn classify_media(media: &Media) -> Option<AttachmentInput> {
    match media {
        Media::Photo { id } => Some(AttachmentInput {
            media_id: id.to_string(),
            attachment_type: AttachmentType::Photo,
            mime_type: None,
        }),
        Media::Document { id, mime_type } => Some(AttachmentInput {
            media_id: id.to_string(),
            attachment_type: AttachmentType::Document,
            mime_type: Some(mime_type.clone()).filter(|m| !m.is_empty()),
        }),
        Media::WebPage { id } => Some(AttachmentInput {
            media_id: id.to_string(),
            attachment_type: AttachmentType::Webpage,
            mime_type: None,
        }),
        Media::None | Media::Other(_) => None,
    }
}

/// Map one remote message to its row and attachment inputs (zero or one).
pub fn parse_telegram_message(message: &RemoteMessage, channel: &ChannelInfo) -> MessageInput {
    let attachments_input: Vec<AttachmentInput> = classify_media(&message.media).into_iter().collect();

    MessageInput {
        row: MessageRow {
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            message_id: message.id,
            date: message.date,
            message: message.text.clone(),
            reply_to_msg_id: message.reply_to_msg_id,
            replies: message.replies.unwrap_or(0),
            attachments: attachments_input
                .iter()
                .map(|a| a.media_id.clone())
                .collect(),
        },
        attachments_input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn channel() -> ChannelInfo {
        ChannelInfo {
            id: 1_234_567,
            name: "demo".into(),
            title: Some("Demo channel".into()),
        }
    }

    #[test]
    fn photo_yields_single_photo_attachment() {
        let msg = RemoteMessage::new(10).with_media(Media::Photo { id: 555 });
        let parsed = parse_telegram_message(&msg, &channel());

        assert_eq!(
            parsed.attachments_input,
            vec![AttachmentInput {
                media_id: "555".into(),
                attachment_type: AttachmentType::Photo,
                mime_type: None,
            }]
        );
        assert_eq!(parsed.row.attachments, vec!["555".to_string()]);
    }

    #[test]
    fn document_keeps_mime_type() {
        let msg = RemoteMessage::new(11).with_media(Media::Document {
            id: 9_000_000_001,
            mime_type: "application/pdf".into(),
        });
        let parsed = parse_telegram_message(&msg, &channel());

        assert_eq!(parsed.attachments_input.len(), 1);
        let attachment = &parsed.attachments_input[0];
        assert_eq!(attachment.media_id, "9000000001");
        assert_eq!(attachment.attachment_type, AttachmentType::Document);
        assert_eq!(attachment.mime_type.as_deref(), Some("application/pdf"));
    }

    #[test]
    fn document_without_mime_type_stores_null() {
        let msg = RemoteMessage::new(13).with_media(Media::Document {
            id: 8_000_000_001,
            mime_type: String::new(),
        });
        let parsed = parse_telegram_message(&msg, &channel());

        assert_eq!(parsed.attachments_input.len(), 1);
        assert_eq!(parsed.attachments_input[0].attachment_type, AttachmentType::Document);
        assert!(parsed.attachments_input[0].mime_type.is_none());
    }

    #[test]
    fn webpage_has_no_mime_type() {
        let msg = RemoteMessage::new(12).with_media(Media::WebPage { id: -42 });
        let parsed = parse_telegram_message(&msg, &channel());

        assert_eq!(parsed.attachments_input.len(), 1);
        assert_eq!(parsed.attachments_input[0].attachment_type, AttachmentType::Webpage);
        assert_eq!(parsed.attachments_input[0].media_id, "-42");
        assert!(parsed.attachments_input[0].mime_type.is_none());
    }

    #[test]
    fn no_media_or_unknown_media_yields_nothing() {
        for media in [Media::None, Media::Other("MessageMediaGeo".into())] {
            let msg = RemoteMessage::new(13).with_media(media);
            let parsed = parse_telegram_message(&msg, &channel());
            assert!(parsed.attachments_input.is_empty());
            assert!(parsed.row.attachments.is_empty());
        }
    }

    #[test]
    fn missing_optional_fields_map_to_absent() {
        let parsed = parse_telegram_message(&RemoteMessage::new(14), &channel());

        assert_eq!(parsed.row.channel_id, 1_234_567);
        assert_eq!(parsed.row.channel_name, "demo");
        assert_eq!(parsed.row.message_id, 14);
        assert!(parsed.row.date.is_none());
        assert!(parsed.row.message.is_none());
        assert!(parsed.row.reply_to_msg_id.is_none());
        assert_eq!(parsed.row.replies, 0);
    }

    #[test]
    fn copies_present_fields() {
        let msg = RemoteMessage {
            id: 15,
            date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            text: Some("hello".into()),
            reply_to_msg_id: Some(3),
            replies: Some(8),
            media: Media::None,
        };
        let parsed = parse_telegram_message(&msg, &channel());

        assert_eq!(parsed.row.date, msg.date);
        assert_eq!(parsed.row.message.as_deref(), Some("hello"));
        assert_eq!(parsed.row.reply_to_msg_id, Some(3));
        assert_eq!(parsed.row.replies, 8);
    }

    #[test]
    fn normalizer_is_deterministic() {
        let msg = RemoteMessage {
            id: 16,
            date: Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()),
            text: Some("same".into()),
            reply_to_msg_id: None,
            replies: Some(1),
            media: Media::Document {
                id: 77,
                mime_type: "video/mp4".into(),
            },
        };

        let first = parse_telegram_message(&msg, &channel());
        let second = parse_telegram_message(&msg, &channel());
        assert_eq!(first, second);
    }
}
