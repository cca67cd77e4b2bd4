//! Session management for Telegram client
//!
//! Provides:
//! - File-based session locking to prevent parallel execution
//! - Session token import/export (base64 of the session file)
//! - Client creation with proper configuration

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use fs2::FileExt;
use grammers_client::client::updates::UpdatesLike;
use grammers_client::Client;
use grammers_mtsender::{SenderPool, SenderPoolHandle};
use grammers_session::storages::SqliteSession;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bootstrap::{AuthClient, Prompter};
use crate::config::Config;
use crate::error::{Error, Result};

/// Session lock guard that ensures exclusive access to the Telegram session.
pub struct SessionLock {
    path: PathBuf,
    lock_file: Option<File>,
}

impl SessionLock {
    /// Acquire an exclusive lock on the session.
    pub fn acquire(path: &Path) -> Result<Self> {
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path: path.to_path_buf(),
                lock_file: Some(lock_file),
            }),
            Err(_) => {
                warn!(
                    lock_file = %path.display(),
                    "Telegram session is already used by another process"
                );
                Err(Error::SessionLocked)
            }
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(ref file) = self.lock_file {
            let _ = file.unlock();
        }
        if self.lock_file.take().is_some() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Write a stored session token back to the session file.
///
/// An empty token leaves whatever file is already there.
pub fn restore_session_file(path: &Path, token: &str) -> Result<bool> {
    if token.is_empty() {
        return Ok(false);
    }

    let bytes = base64::engine::general_purpose::STANDARD.decode(token.trim())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    debug!(session_file = %path.display(), "Session restored from database");
    Ok(true)
}

/// Serialize the session file into a storable token.
pub fn export_session_token(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| {
        Error::InvalidSession(format!("Failed to read {}: {}", path.display(), e))
    })?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Open (or create) the session file.
pub fn open_session(path: &Path) -> Result<Arc<SqliteSession>> {
    let session = SqliteSession::open(path)
        .map_err(|e| Error::InvalidSession(format!("Failed to open session: {}", e)))?;
    Ok(Arc::new(session))
}

/// Restore the stored token into the session file and open it.
///
/// A token that does not decode, or a file that is not a usable session, is
/// discarded: the file is removed and a fresh session is opened, which then
/// needs a login.
pub fn load_session(path: &Path, token: &str) -> Result<Arc<SqliteSession>> {
    let restored = restore_session_file(path, token).and_then(|restored| {
        let session = open_session(path)?;
        Ok((restored, session))
    });

    match restored {
        Ok((true, session)) => {
            info!("Using stored session");
            Ok(session)
        }
        Ok((false, session)) => {
            info!("No stored session, starting from {}", path.display());
            Ok(session)
        }
        Err(err) => {
            warn!(session_file = %path.display(), "Discarding unusable session: {}", err);
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            open_session(path)
        }
    }
}

/// Holder for SenderPool components and Client
pub struct TelegramClient {
    pub client: Client,
    pub handle: SenderPoolHandle,
    api_hash: String,
    session_file: PathBuf,
    _updates: mpsc::UnboundedReceiver<UpdatesLike>,
    _runner_handle: tokio::task::JoinHandle<()>,
}

impl TelegramClient {
    /// Create a new TelegramClient over an opened session
    pub async fn connect(config: &Config, session: Arc<SqliteSession>) -> Result<Self> {
        let pool = SenderPool::new(session, config.api_id);

        // Create client from pool (need reference to whole pool)
        let client = Client::new(&pool);

        // Get handle and runner after client is created
        let SenderPool {
            runner,
            updates,
            handle,
        } = pool;

        // Spawn the runner in background
        let runner_handle = tokio::spawn(async move {
            runner.run().await;
        });

        Ok(Self {
            client,
            handle,
            api_hash: config.api_hash.clone(),
            session_file: config.session_file.clone(),
            _updates: updates,
            _runner_handle: runner_handle,
        })
    }
}

// Implement Deref to allow using TelegramClient as &Client
impl std::ops::Deref for TelegramClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[async_trait]
impl AuthClient for TelegramClient {
    async fn is_authorized(&self) -> Result<bool> {
        Ok(self.client.is_authorized().await?)
    }

    async fn login(&self, phone: &str, prompter: &dyn Prompter) -> Result<()> {
        let token = self
            .client
            .request_login_code(phone, &self.api_hash)
            .await
            .map_err(|e| Error::LoginFailed(format!("Failed to request code: {}", e)))?;

        let code = prompter.prompt("Enter code: ")?;

        self.client
            .sign_in(&token, code.trim())
            .await
            .map_err(|e| Error::LoginFailed(format!("Failed to sign in: {}", e)))?;

        Ok(())
    }

    fn session_token(&self) -> Result<String> {
        export_session_token(&self.session_file)
    }
}
