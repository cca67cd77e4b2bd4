//! Channel history sync: bootstrap the session, resolve the channel and run
//! the fetch loop.

use tracing::info;

use crate::bootstrap::establish_session;
use crate::chat::resolve_channel;
use crate::config::Config;
use crate::error::Result;
use crate::fetch::{fetch_all_messages, FetchSummary, WriteMode};
use crate::history::TelegramHistory;
use crate::storage::ArchiveStore;

pub async fn run<S>(config: &Config, store: &S, mode: WriteMode) -> Result<FetchSummary>
where
    S: ArchiveStore + ?Sized,
{
    let connection = establish_session(config, store).await?;

    let channel = resolve_channel(&connection.client, &config.channel).await?;
    info!(
        channel_id = channel.info.id,
        title = channel.info.title.as_deref().unwrap_or(""),
        "Fetching history of {}",
        channel.info.name
    );

    let history = TelegramHistory::new(&connection.client, channel.input_peer.clone());
    let summary = fetch_all_messages(store, &history, &channel.info, &config.fetch, mode).await?;

    info!(
        pages = summary.pages,
        messages = summary.messages,
        attachments = summary.attachments,
        offset_id = summary.offset_id,
        exhausted = summary.exhausted,
        "Sync finished"
    );
    Ok(summary)
}
