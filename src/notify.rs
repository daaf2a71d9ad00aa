use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

/// How many notices are kept for `GET /notices`.
const HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warn,
    Error,
}

/// A short operator-facing message.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Notice {
    pub at: DateTime<Utc>,
    pub level: NoticeLevel,
    pub message: String,
}

/// Fire-and-forget operator notices.
///
/// Each notice is logged through `tracing` at the matching level and kept in
/// a bounded history. Cloning shares the same history.
#[derive(Clone, Default)]
pub struct Notifier {
    inner: Arc<RwLock<VecDeque<Notice>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn info(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(notice = %message);
        self.push(NoticeLevel::Info, message).await;
    }

    pub async fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(notice = %message);
        self.push(NoticeLevel::Warn, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(notice = %message);
        self.push(NoticeLevel::Error, message).await;
    }

    /// Snapshot of the history, oldest first.
    pub async fn recent(&self) -> Vec<Notice> {
        self.inner.read().await.iter().cloned().collect()
    }

    async fn push(&self, level: NoticeLevel, message: String) {
        let mut history = self.inner.write().await;
        if history.len() == HISTORY {
            history.pop_front();
        }
        history.push_back(Notice { at: Utc::now(), level, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_notifier_has_no_history() {
        assert!(Notifier::new().recent().await.is_empty());
    }

    #[tokio::test]
    async fn notices_keep_order_and_level() {
        let n = Notifier::new();
        n.info("Measuring started").await;
        n.warn("No API key").await;
        n.error("Upload failed").await;

        let got = n.recent().await;
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].level, NoticeLevel::Info);
        assert_eq!(got[1].message, "No API key");
        assert_eq!(got[2].level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let n = Notifier::new();
        for i in 0..(HISTORY + 5) {
            n.info(format!("notice {i}")).await;
        }

        let got = n.recent().await;
        assert_eq!(got.len(), HISTORY);
        assert_eq!(got[0].message, "notice 5");
    }

    #[tokio::test]
    async fn clone_shares_history() {
        let n = Notifier::new();
        n.clone().info("from clone").await;
        assert_eq!(n.recent().await.len(), 1);
    }
}
