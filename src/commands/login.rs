//! Interactive session initialization.
//!
//! Runs only the bootstrap: restore the stored session, log in when it is not
//! authorized and save the refreshed token.

use tracing::info;

use crate::bootstrap::{establish_session, LoginReport};
use crate::config::Config;
use crate::error::Result;
use crate::storage::ArchiveStore;

pub async fn run<S>(config: &Config, store: &S) -> Result<LoginReport>
where
    S: ArchiveStore + ?Sized,
{
    let connection = establish_session(config, store).await?;

    if connection.report.logged_in() {
        info!("New session stored");
    } else {
        info!("Stored session is still authorized");
    }
    Ok(connection.report)
}
