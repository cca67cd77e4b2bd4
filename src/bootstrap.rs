//! Session bootstrap: connect, verify authorization, log in if needed and
//! persist the refreshed session token.

use std::fmt;
use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::session::{load_session, SessionLock, TelegramClient};
use crate::storage::ArchiveStore;

/// Login states, in the order a run can visit them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Disconnected,
    ConnectedUnverified,
    Authorized,
    LoggingIn,
    Failed,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::ConnectedUnverified => write!(f, "connected_unverified"),
            Self::Authorized => write!(f, "authorized"),
            Self::LoggingIn => write!(f, "logging_in"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Interactive input (phone number, login code).
pub trait Prompter: Send + Sync {
    fn prompt(&self, question: &str) -> Result<String>;
}

/// Reads answers from stdin.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn prompt(&self, question: &str) -> Result<String> {
        print!("{}", question);
        io::stdout().flush()?;

        let mut answer = String::new();
        let read = io::stdin().lock().read_line(&mut answer)?;
        if read == 0 {
            return Err(Error::LoginFailed("stdin closed before an answer was given".to_string()));
        }
        Ok(answer.trim().to_string())
    }
}

/// The part of the Telegram client the bootstrap needs.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn is_authorized(&self) -> Result<bool>;

    /// Request a login code for `phone`, ask for it and sign in.
    async fn login(&self, phone: &str, prompter: &dyn Prompter) -> Result<()>;

    /// Current session serialized for the session store.
    fn session_token(&self) -> Result<String>;
}

/// States visited by one [`authorize`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginReport {
    pub transitions: Vec<LoginState>,
}

impl LoginReport {
    pub fn logged_in(&self) -> bool {
        self.transitions.contains(&LoginState::LoggingIn)
    }

    fn enter(&mut self, state: LoginState) {
        if let Some(from) = self.transitions.last() {
            debug!(from = %from, to = %state, "Login state changed");
        }
        self.transitions.push(state);
    }
}

/// Drive a connected client to `Authorized` and save its session token.
///
/// A failed or erroring authorization check falls through to the interactive
/// login. A failed login is fatal.
pub async fn authorize<C, S>(
    client: &C,
    store: &S,
    phone: Option<&str>,
    prompter: &dyn Prompter,
) -> Result<LoginReport>
where
    C: AuthClient + ?Sized,
    S: ArchiveStore + ?Sized,
{
    let mut report = LoginReport {
        transitions: vec![LoginState::Disconnected],
    };
    report.enter(LoginState::ConnectedUnverified);

    match client.is_authorized().await {
        Ok(true) => report.enter(LoginState::Authorized),
        Ok(false) => {
            warn!("Login required: Session is not valid or expired");
            report.enter(LoginState::LoggingIn);
        }
        Err(err) => {
            warn!("Login required: {}", err);
            report.enter(LoginState::LoggingIn);
        }
    }

    if report.logged_in() {
        let phone = match phone {
            Some(phone) => phone.to_string(),
            None => prompter.prompt("Enter your phone number: ")?,
        };

        if let Err(err) = client.login(phone.trim(), prompter).await {
            report.enter(LoginState::Failed);
            error!("{}", err);
            return Err(match err {
                Error::LoginFailed(_) => err,
                other => Error::LoginFailed(other.to_string()),
            });
        }
        info!("Successfully logged in.");
        report.enter(LoginState::Authorized);
    }

    // Refreshed on every run, even when unchanged.
    store.save_session(&client.session_token()?).await?;
    info!("Session updated.");

    Ok(report)
}

/// Authorized Telegram connection plus the lock that guards its session file.
pub struct Connection {
    pub client: TelegramClient,
    pub report: LoginReport,
    _lock: SessionLock,
}

/// Lock the session, restore the newest stored token, connect and authorize.
pub async fn establish_session<S>(config: &Config, store: &S) -> Result<Connection>
where
    S: ArchiveStore + ?Sized,
{
    let lock = SessionLock::acquire(&config.lock_file)?;

    let token = store.latest_session().await?;
    let session = load_session(&config.session_file, &token)?;

    let client = TelegramClient::connect(config, session).await?;
    let report = authorize(&client, store, config.phone.as_deref(), &StdinPrompter).await?;

    Ok(Connection {
        client,
        report,
        _lock: lock,
    })
}
