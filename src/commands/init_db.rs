//! Create the MySQL tables.

use tracing::info;

use crate::error::Result;
use crate::storage::MySqlStore;

pub async fn run(store: &MySqlStore) -> Result<()> {
    store.ensure_schema().await?;
    info!("Database schema is ready");
    Ok(())
}
