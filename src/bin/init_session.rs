//! Session initialization binary.

use telegram_history::commands::login;
use telegram_history::storage::{ArchiveStore, MySqlStore};
use telegram_history::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    let store = MySqlStore::new(&config.database)?;

    let result = match store.ensure_schema().await {
        Ok(()) => login::run(&config, &store).await.map(|_| ()),
        Err(err) => Err(err),
    };
    store.close().await?;
    result?;
    Ok(())
}
