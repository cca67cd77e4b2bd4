//! Persistence for cursors, sessions, messages and attachments.
//!
//! [`MySqlStore`] is the production backend; [`MemoryStore`] keeps the same
//! transactional contract in memory and is what the tests run against.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ArchiveStats, AttachmentInput, BatchReport, Cursor, MessageInput, MessageRow};

pub use memory::{FailPoint, MemoryStore, StoredAttachment};
pub use mysql::MySqlStore;

#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Cursor for `channel`, created with `offset_id = 0` when missing.
    async fn get_cursor(&self, channel: &str) -> Result<Cursor>;

    /// Create or update the cursor for `channel`.
    async fn save_cursor(&self, channel: &str, offset_id: i32) -> Result<()>;

    /// Most recently saved session token, or an empty string.
    async fn latest_session(&self) -> Result<String>;

    /// Append a session token. Older tokens are kept.
    async fn save_session(&self, session: &str) -> Result<()>;

    /// Upsert a page in one transaction: all attachments first, then all
    /// messages. Nothing is written if any statement fails.
    async fn write_batch(&self, messages: Vec<MessageInput>) -> Result<BatchReport>;

    /// Upsert one message and its attachments in one transaction.
    async fn save_message(&self, message: MessageInput) -> Result<BatchReport> {
        self.write_batch(vec![message]).await
    }

    /// Stored cursor (without creating it) and row counts.
    async fn stats(&self, channel: &str) -> Result<ArchiveStats>;

    /// Release the underlying connection(s).
    async fn close(&self) -> Result<()>;
}

/// Flatten a page into attachment inputs (in message order) and bare rows.
pub fn split_batch(messages: Vec<MessageInput>) -> (Vec<AttachmentInput>, Vec<MessageRow>) {
    let mut attachments = Vec::new();
    let mut rows = Vec::with_capacity(messages.len());

    for message in messages {
        let (row, inputs) = message.into_parts();
        attachments.extend(inputs);
        rows.push(row);
    }

    (attachments, rows)
}
