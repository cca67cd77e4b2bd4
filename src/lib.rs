//! Telegram channel history ingestion
//!
//! This library provides tools to:
//! - Page backwards through one channel's history with a persisted cursor
//! - Normalize messages and their media into storage rows
//! - Upsert each page into MySQL in a single transaction
//! - Keep one reusable Telegram session across runs, logging in when needed

pub mod bootstrap;
pub mod chat;
pub mod config;
pub mod error;
pub mod fetch;
pub mod history;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod session;
pub mod storage;

// Re-export common types
pub use bootstrap::{authorize, establish_session, AuthClient, LoginState, Prompter};
pub use config::{ChatEntity, Config, FetchSettings};
pub use error::{Error, Result};
pub use fetch::{fetch_all_messages, FetchSummary, WriteMode};
pub use history::HistorySource;
pub use normalize::parse_telegram_message;
pub use session::SessionLock;
pub use storage::{ArchiveStore, MemoryStore, MySqlStore};

pub mod commands;
