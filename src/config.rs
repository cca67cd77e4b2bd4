//! Configuration for the ingestion job
//!
//! Everything comes from environment variables (a `.env` file is loaded first).
//! A missing or malformed required value is a fatal [`Error::Config`].

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default constants
pub const SESSION_FILE: &str = "telegram_session.session";
pub const LOCK_FILE: &str = "telegram_session.lock";
pub const MAX_PAGE_SIZE: i32 = 100;

pub const DEFAULT_MYSQL_HOST: &str = "localhost";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_MYSQL_DATABASE: &str = "telegram_history";
pub const DEFAULT_MYSQL_USER: &str = "telegram_history";

/// Channel reference as configured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEntity {
    /// Channel by ID (must be present in the account's dialogs)
    Channel(i64),
    /// Public channel by username (without @)
    Username(String),
}

impl ChatEntity {
    pub fn channel(id: i64) -> Self {
        ChatEntity::Channel(id)
    }

    pub fn username(name: &str) -> Self {
        let name = name.strip_prefix('@').unwrap_or(name);
        ChatEntity::Username(name.to_string())
    }

    /// Parse `CHANNEL_USERNAME`: numeric values are channel ids, anything else a username.
    ///
    /// Bot API ids (`-100` followed by the channel id) are reduced to the raw
    /// MTProto id. Other non-positive ids name users or basic groups.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "@" {
            return Err(Error::Config(
                "Environment variable CHANNEL_USERNAME is empty.".to_string(),
            ));
        }

        let Ok(id) = raw.parse::<i64>() else {
            return Ok(ChatEntity::username(raw));
        };
        if id > 0 {
            return Ok(ChatEntity::Channel(id));
        }

        raw.strip_prefix("-100")
            .and_then(|rest| rest.parse::<i64>().ok())
            .filter(|id| *id > 0)
            .map(ChatEntity::Channel)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Environment variable CHANNEL_USERNAME is not a channel id: {}",
                    raw
                ))
            })
    }

    /// Stable key used for the cursor row and the `channel_name` column.
    pub fn key(&self) -> String {
        match self {
            ChatEntity::Channel(id) => id.to_string(),
            ChatEntity::Username(name) => name.clone(),
        }
    }
}

/// Fetch loop settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Messages requested per page (`MSG_LIMIT`)
    pub page_size: i32,
    /// Pause between pages (`MSG_FETCH_DELAY`, milliseconds)
    pub delay: Duration,
    /// Fetch one page and persist nothing (`MSG_TRY`)
    pub single_shot: bool,
}

/// MySQL location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Full `mysql://` URL; wins over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: Option<String>,
    pub channel: ChatEntity,
    pub fetch: FetchSettings,
    pub database: DatabaseConfig,
    pub session_file: PathBuf,
    pub lock_file: PathBuf,
}

impl Config {
    /// Load `.env` and read the process environment.
    pub fn from_env() -> Result<Self> {
        Self::load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        // Try to load from current directory first, then parent
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let api_id = env.number(&["TELEGRAM_API_ID", "API_ID"])?;
        let api_hash = env.string(&["TELEGRAM_API_HASH", "API_HASH"])?;
        let phone = env.optional(&["TELEGRAM_PHONE"]);

        let channel_raw = env.string(&["CHANNEL_USERNAME"])?;
        let channel = ChatEntity::parse(&channel_raw)?;

        let page_size: i32 = env.number(&["MSG_LIMIT"])?;
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(Error::Config(format!(
                "Environment variable MSG_LIMIT must be between 1 and {}, got {}.",
                MAX_PAGE_SIZE, page_size
            )));
        }
        let delay_ms: u64 = env.number(&["MSG_FETCH_DELAY"])?;
        let single_shot = env.boolean(&["MSG_TRY"])?;

        let database = Self::database(&env)?;

        Ok(Self {
            api_id,
            api_hash,
            phone,
            channel,
            fetch: FetchSettings {
                page_size,
                delay: Duration::from_millis(delay_ms),
                single_shot,
            },
            database,
            session_file: env
                .optional(&["TELEGRAM_SESSION_FILE"])
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(SESSION_FILE)),
            lock_file: env
                .optional(&["TELEGRAM_LOCK_FILE"])
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(LOCK_FILE)),
        })
    }

    fn database<F>(env: &EnvReader<F>) -> Result<DatabaseConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = env.optional(&["DATABASE_URL"]);
        let port = match env.optional(&["MYSQL_PORT"]) {
            Some(raw) => parse_number::<u16>("MYSQL_PORT", &raw)?,
            None => DEFAULT_MYSQL_PORT,
        };
        // The password is only mandatory when no URL carries the credentials.
        let password = match (&url, env.optional(&["MYSQL_PASSWORD"])) {
            (_, Some(password)) => password,
            (Some(_), None) => String::new(),
            (None, None) => {
                return Err(Error::Config(
                    "Environment variable DATABASE_URL or MYSQL_PASSWORD is required but not set."
                        .to_string(),
                ))
            }
        };

        Ok(DatabaseConfig {
            url,
            host: env
                .optional(&["MYSQL_HOST"])
                .unwrap_or_else(|| DEFAULT_MYSQL_HOST.to_string()),
            port,
            database: env
                .optional(&["MYSQL_DATABASE"])
                .unwrap_or_else(|| DEFAULT_MYSQL_DATABASE.to_string()),
            user: env
                .optional(&["MYSQL_USER"])
                .unwrap_or_else(|| DEFAULT_MYSQL_USER.to_string()),
            password,
        })
    }

    /// Cursor key of the configured channel
    pub fn channel_key(&self) -> String {
        self.channel.key()
    }
}

/// Typed access to environment values, first key wins.
struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn find(&self, keys: &[&str]) -> Option<(String, String)> {
        keys.iter().find_map(|key| {
            (self.lookup)(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (key.to_string(), v))
        })
    }

    fn optional(&self, keys: &[&str]) -> Option<String> {
        self.find(keys).map(|(_, value)| value)
    }

    fn required(&self, keys: &[&str]) -> Result<(String, String)> {
        self.find(keys).ok_or_else(|| {
            let name = match keys {
                [primary, aliases @ ..] if !aliases.is_empty() => {
                    format!("{} (or {})", primary, aliases.join(", "))
                }
                _ => keys.join(""),
            };
            Error::Config(format!(
                "Environment variable {} is required but not set.",
                name
            ))
        })
    }

    fn string(&self, keys: &[&str]) -> Result<String> {
        self.required(keys).map(|(_, value)| value)
    }

    fn number<T>(&self, keys: &[&str]) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let (key, raw) = self.required(keys)?;
        parse_number(&key, &raw)
    }

    fn boolean(&self, keys: &[&str]) -> Result<bool> {
        let (key, raw) = self.required(keys)?;
        parse_bool(&key, &raw)
    }
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>().map_err(|e| {
        Error::Config(format!(
            "Environment variable {} is not a valid number: {}",
            key, e
        ))
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config(format!(
            "Environment variable {} is not a valid boolean: {:?}",
            key, other
        ))),
    }
}
