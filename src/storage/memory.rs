//! In-memory store with snapshot transactions and fault injection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::trace;

use super::{split_batch, ArchiveStore};
use crate::error::{Error, Result};
use crate::models::{
    ArchiveStats, AttachmentInput, BatchReport, Cursor, MessageInput, MessageRow,
};

/// Where the next matching operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    /// Inside `write_batch`, after attachments were staged and before messages
    AfterAttachments,
    /// On the next `save_cursor`
    CursorSave,
    /// On the next `save_session`
    SessionSave,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    pub id: u64,
    pub input: AttachmentInput,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    cursors: BTreeMap<String, i32>,
    sessions: Vec<String>,
    attachments: Vec<StoredAttachment>,
    messages: BTreeMap<(i64, i32), MessageRow>,
    next_attachment_id: u64,
}

impl Tables {
    fn upsert_attachment(&mut self, input: AttachmentInput) {
        let existing = self.attachments.iter_mut().find(|a| {
            a.input.media_id == input.media_id && a.input.attachment_type == input.attachment_type
        });
        match existing {
            Some(stored) => stored.input.mime_type = input.mime_type,
            None => {
                self.next_attachment_id += 1;
                self.attachments.push(StoredAttachment {
                    id: self.next_attachment_id,
                    input,
                });
            }
        }
    }

    fn upsert_message(&mut self, row: MessageRow) {
        match self.messages.get_mut(&(row.channel_id, row.message_id)) {
            Some(stored) => {
                stored.date = row.date;
                stored.message = row.message;
                stored.reply_to_msg_id = row.reply_to_msg_id;
                stored.replies = row.replies;
                stored.attachments = row.attachments;
            }
            None => {
                self.messages.insert((row.channel_id, row.message_id), row);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_point: Mutex<Option<FailPoint>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot failure.
    pub fn fail_next(&self, point: FailPoint) {
        if let Ok(mut slot) = self.fail_point.lock() {
            *slot = Some(point);
        }
    }

    /// All message rows ordered by (channel_id, message_id).
    pub fn messages(&self) -> Vec<MessageRow> {
        self.snapshot().messages.into_values().collect()
    }

    pub fn attachments(&self) -> Vec<StoredAttachment> {
        self.snapshot().attachments
    }

    pub fn sessions(&self) -> Vec<String> {
        self.snapshot().sessions
    }

    /// Stored offset for `channel` without creating the row.
    pub fn cursor(&self, channel: &str) -> Option<i32> {
        self.snapshot().cursors.get(channel).copied()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn snapshot(&self) -> Tables {
        self.tables
            .lock()
            .map(|tables| tables.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        if self.is_closed() {
            return Err(Error::Storage("store is closed".to_string()));
        }
        self.tables
            .lock()
            .map_err(|e| Error::Storage(format!("store lock poisoned: {}", e)))
    }

    fn trip(&self, point: FailPoint) -> Result<()> {
        let mut slot = self
            .fail_point
            .lock()
            .map_err(|e| Error::Storage(format!("fail point lock poisoned: {}", e)))?;
        if *slot == Some(point) {
            *slot = None;
            return Err(Error::Storage(format!("injected failure at {:?}", point)));
        }
        Ok(())
    }

    /// Run `f` on a copy of the tables and publish it only on success.
    fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Tables) -> Result<T>,
    {
        let mut tables = self.lock()?;
        let mut staged = tables.clone();
        let out = f(&mut staged)?;
        *tables = staged;
        Ok(out)
    }
}

#[async_trait]
impl ArchiveStore for MemoryStore {
    async fn get_cursor(&self, channel: &str) -> Result<Cursor> {
        let mut tables = self.lock()?;
        let offset_id = *tables.cursors.entry(channel.to_string()).or_insert(0);
        Ok(Cursor {
            channel: channel.to_string(),
            offset_id,
        })
    }

    async fn save_cursor(&self, channel: &str, offset_id: i32) -> Result<()> {
        self.trip(FailPoint::CursorSave)?;
        let mut tables = self.lock()?;
        tables.cursors.insert(channel.to_string(), offset_id);
        Ok(())
    }

    async fn latest_session(&self) -> Result<String> {
        let tables = self.lock()?;
        Ok(tables.sessions.last().cloned().unwrap_or_default())
    }

    async fn save_session(&self, session: &str) -> Result<()> {
        self.trip(FailPoint::SessionSave)?;
        let mut tables = self.lock()?;
        tables.sessions.push(session.to_string());
        Ok(())
    }

    async fn write_batch(&self, messages: Vec<MessageInput>) -> Result<BatchReport> {
        let (attachments, rows) = split_batch(messages);
        let report = BatchReport {
            attachments: attachments.len(),
            messages: rows.len(),
        };

        self.transaction(|tables| {
            for attachment in attachments {
                tables.upsert_attachment(attachment);
            }
            self.trip(FailPoint::AfterAttachments)?;
            for row in rows {
                tables.upsert_message(row);
            }
            Ok(())
        })?;

        trace!(
            attachments = report.attachments,
            messages = report.messages,
            "Batch committed"
        );
        Ok(report)
    }

    async fn stats(&self, channel: &str) -> Result<ArchiveStats> {
        let tables = self.lock()?;
        Ok(ArchiveStats {
            cursor: tables.cursors.get(channel).map(|offset_id| Cursor {
                channel: channel.to_string(),
                offset_id: *offset_id,
            }),
            messages: tables
                .messages
                .values()
                .filter(|row| row.channel_name == channel)
                .count() as u64,
            attachments: tables.attachments.len() as u64,
            sessions: tables.sessions.len() as u64,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttachmentType, ChannelInfo, Media, RemoteMessage};
    use crate::normalize::parse_telegram_message;

    fn channel() -> ChannelInfo {
        ChannelInfo {
            id: 42,
            name: "demo".into(),
            title: None,
        }
    }

    fn page(ids: &[i32]) -> Vec<MessageInput> {
        ids.iter()
            .map(|id| {
                let msg = RemoteMessage::new(*id).with_media(Media::Photo {
                    id: i64::from(*id) * 10,
                });
                parse_telegram_message(&msg, &channel())
            })
            .collect()
    }

    #[tokio::test]
    async fn get_cursor_creates_missing_row() {
        let store = MemoryStore::new();
        assert_eq!(store.cursor("demo"), None);

        let cursor = store.get_cursor("demo").await.unwrap();
        assert_eq!(cursor.offset_id, 0);
        assert_eq!(store.cursor("demo"), Some(0));
    }

    #[tokio::test]
    async fn save_cursor_creates_then_updates() {
        let store = MemoryStore::new();
        store.save_cursor("demo", 103).await.unwrap();
        assert_eq!(store.get_cursor("demo").await.unwrap().offset_id, 103);

        store.save_cursor("demo", 102).await.unwrap();
        assert_eq!(store.get_cursor("demo").await.unwrap().offset_id, 102);
    }

    #[tokio::test]
    async fn latest_session_returns_newest_or_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.latest_session().await.unwrap(), "");

        store.save_session("first").await.unwrap();
        store.save_session("second").await.unwrap();

        assert_eq!(store.latest_session().await.unwrap(), "second");
        assert_eq!(store.sessions(), vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn failed_batch_rolls_back_attachments_and_messages() {
        let store = MemoryStore::new();
        store.fail_next(FailPoint::AfterAttachments);

        let err = store.write_batch(page(&[3, 2, 1])).await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(store.messages().is_empty());
        assert!(store.attachments().is_empty());

        // One-shot: the retry goes through.
        let report = store.write_batch(page(&[3, 2, 1])).await.unwrap();
        assert_eq!(report, BatchReport { attachments: 3, messages: 3 });
        assert_eq!(store.messages().len(), 3);
    }

    #[tokio::test]
    async fn rewriting_a_page_does_not_duplicate_rows() {
        let store = MemoryStore::new();
        store.write_batch(page(&[5, 4])).await.unwrap();
        store.write_batch(page(&[5, 4])).await.unwrap();

        assert_eq!(store.messages().len(), 2);
        assert_eq!(store.attachments().len(), 2);
        let ids: Vec<u64> = store.attachments().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn upsert_refreshes_mutable_fields() {
        let store = MemoryStore::new();
        let mut first = page(&[9]);
        store.write_batch(first.clone()).await.unwrap();

        first[0].row.replies = 12;
        first[0].row.message = Some("edited".into());
        store.save_message(first.remove(0)).await.unwrap();

        let rows = store.messages();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].replies, 12);
        assert_eq!(rows[0].message.as_deref(), Some("edited"));
    }

    #[tokio::test]
    async fn attachment_upsert_is_keyed_by_media_and_type() {
        let store = MemoryStore::new();
        let photo = parse_telegram_message(
            &RemoteMessage::new(1).with_media(Media::Photo { id: 7 }),
            &channel(),
        );
        let page_with_same_id = parse_telegram_message(
            &RemoteMessage::new(2).with_media(Media::WebPage { id: 7 }),
            &channel(),
        );

        store.write_batch(vec![photo, page_with_same_id]).await.unwrap();

        let types: Vec<_> = store
            .attachments()
            .iter()
            .map(|a| a.input.attachment_type)
            .collect();
        assert_eq!(types, vec![AttachmentType::Photo, AttachmentType::Webpage]);
    }

    #[tokio::test]
    async fn stats_do_not_create_cursor() {
        let store = MemoryStore::new();
        store.write_batch(page(&[2, 1])).await.unwrap();

        let stats = store.stats("demo").await.unwrap();
        assert!(stats.cursor.is_none());
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.attachments, 2);
        assert_eq!(store.cursor("demo"), None);
    }

    #[tokio::test]
    async fn closed_store_rejects_operations() {
        let store = MemoryStore::new();
        store.close().await.unwrap();

        assert!(store.is_closed());
        assert!(store.get_cursor("demo").await.is_err());
        assert!(store.write_batch(page(&[1])).await.is_err());
    }
}
