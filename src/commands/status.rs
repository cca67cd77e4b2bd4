//! Print the stored cursor and row counts for the configured channel.

use crate::error::Result;
use crate::models::ArchiveStats;
use crate::storage::ArchiveStore;

pub async fn run<S>(channel: &str, store: &S) -> Result<ArchiveStats>
where
    S: ArchiveStore + ?Sized,
{
    let stats = store.stats(channel).await?;
    println!("{}", render(channel, &stats));
    Ok(stats)
}

fn render(channel: &str, stats: &ArchiveStats) -> String {
    let cursor = match &stats.cursor {
        Some(cursor) => cursor.offset_id.to_string(),
        None => "not started".to_string(),
    };

    format!(
        "Channel:     {}\nOffset:      {}\nMessages:    {}\nAttachments: {}\nSessions:    {}",
        channel, cursor, stats.messages, stats.attachments, stats.sessions
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelInfo, Media, RemoteMessage};
    use crate::normalize::parse_telegram_message;
    use crate::storage::MemoryStore;

    #[test]
    fn render_without_cursor() {
        let text = render("demo", &ArchiveStats::default());
        assert!(text.contains("not started"));
        assert!(text.contains("Messages:    0"));
    }

    #[tokio::test]
    async fn run_reports_store_contents() {
        let store = MemoryStore::new();
        let channel = ChannelInfo {
            id: 7,
            name: "demo".into(),
            title: None,
        };
        let msg = RemoteMessage::new(3).with_media(Media::Photo { id: 9 });
        store
            .write_batch(vec![parse_telegram_message(&msg, &channel)])
            .await
            .unwrap();
        store.save_cursor("demo", 3).await.unwrap();

        let stats = run("demo", &store).await.unwrap();

        assert_eq!(stats.cursor.as_ref().map(|c| c.offset_id), Some(3));
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.attachments, 1);
        assert!(render("demo", &stats).contains("Offset:      3"));
    }
}
