//! Shared doubles for the integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use telegram_history::models::RemoteMessage;
use telegram_history::{HistorySource, Result};

/// Serves pre-recorded pages and remembers every request.
pub struct ScriptedHistory {
    pages: Mutex<VecDeque<Result<Vec<RemoteMessage>>>>,
    requests: Mutex<Vec<(i32, i32)>>,
}

impl ScriptedHistory {
    pub fn new(pages: Vec<Vec<RemoteMessage>>) -> Self {
        Self {
            pages: Mutex::new(pages.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Pages of bare messages with the given ids.
    pub fn from_ids(pages: &[&[i32]]) -> Self {
        Self::new(
            pages
                .iter()
                .map(|ids| ids.iter().copied().map(RemoteMessage::new).collect())
                .collect(),
        )
    }

    pub fn push_error(&self, err: telegram_history::Error) {
        self.pages.lock().unwrap().push_back(Err(err));
    }

    /// `(limit, offset_id)` of every call so far.
    pub fn requests(&self) -> Vec<(i32, i32)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistorySource for ScriptedHistory {
    async fn get_history(&self, limit: i32, offset_id: i32) -> Result<Vec<RemoteMessage>> {
        self.requests.lock().unwrap().push((limit, offset_id));
        self.pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
