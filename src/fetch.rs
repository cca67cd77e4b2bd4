//! Paginated history walk with a persisted cursor.

use tracing::{info, trace};

use crate::config::FetchSettings;
use crate::error::Result;
use crate::history::HistorySource;
use crate::metrics;
use crate::models::{BatchReport, ChannelInfo, MessageInput, RemoteMessage};
use crate::normalize::parse_telegram_message;
use crate::storage::ArchiveStore;

/// How a page reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// One transaction per page.
    #[default]
    Batch,
    /// One transaction per message.
    OneByOne,
}

/// What one run of [`fetch_all_messages`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// Pages fetched, including the one a single-shot run discards.
    pub pages: usize,
    pub messages: usize,
    pub attachments: usize,
    /// Cursor after the run.
    pub offset_id: i32,
    /// An empty page was seen.
    pub exhausted: bool,
}

/// Lowest message id of a page, the exclusive bound of the next request.
pub fn next_offset(page: &[RemoteMessage]) -> Option<i32> {
    page.iter().map(|m| m.id).min()
}

async fn persist_page<S>(store: &S, page: Vec<MessageInput>, mode: WriteMode) -> Result<BatchReport>
where
    S: ArchiveStore + ?Sized,
{
    match mode {
        WriteMode::Batch => store.write_batch(page).await,
        WriteMode::OneByOne => {
            let mut total = BatchReport::default();
            for message in page {
                let message_id = message.row.message_id;
                let report = store.save_message(message).await?;
                trace!(message_id, "Message saved");
                total.messages += report.messages;
                total.attachments += report.attachments;
            }
            Ok(total)
        }
    }
}

/// Walk `channel` backwards from its stored cursor until history runs out.
///
/// Every non-empty page is normalized and written, then the cursor moves to
/// the page's minimum id and is saved, then the loop sleeps. In single-shot
/// mode the first page is only logged. Errors are not retried.
pub async fn fetch_all_messages<S, H>(
    store: &S,
    source: &H,
    channel: &ChannelInfo,
    settings: &FetchSettings,
    mode: WriteMode,
) -> Result<FetchSummary>
where
    S: ArchiveStore + ?Sized,
    H: HistorySource + ?Sized,
{
    let cursor = store.get_cursor(&channel.name).await?;
    let mut offset_id = cursor.offset_id;
    let mut summary = FetchSummary {
        offset_id,
        ..FetchSummary::default()
    };

    info!(channel = %channel.name, offset_id, "Starting history fetch");

    loop {
        let page = source.get_history(settings.page_size, offset_id).await?;

        let (Some(to), Some(from)) = (next_offset(&page), page.iter().map(|m| m.id).max()) else {
            info!("Done");
            summary.exhausted = true;
            break;
        };

        summary.pages += 1;
        info!(from, to, count = page.len(), "Fetched messages");

        if settings.single_shot {
            info!("Single-shot mode, nothing persisted");
            break;
        }

        let rows: Vec<MessageInput> = page
            .iter()
            .map(|message| parse_telegram_message(message, channel))
            .collect();
        let report = persist_page(store, rows, mode).await?;

        offset_id = to;
        store.save_cursor(&channel.name, offset_id).await?;

        summary.messages += report.messages;
        summary.attachments += report.attachments;
        summary.offset_id = offset_id;
        metrics::record_page(report);
        metrics::record_cursor(&channel.name, offset_id);

        info!("Next cycle on {}. Offset: {}", channel.name, offset_id);
        tokio::time::sleep(settings.delay).await;
    }

    Ok(summary)
}
