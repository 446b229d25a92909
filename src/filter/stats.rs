use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::store::RuleStore;

/// Fire-and-forget match counter.
///
/// Matches are queued to a background task that writes them to the store.
/// Neither a full queue nor a failing store is ever reported to the caller.
pub struct StatsRecorder {
    tx: mpsc::Sender<i64>,
    worker: JoinHandle<()>,
}

impl StatsRecorder {
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<dyn RuleStore>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<i64>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(rule_id) = rx.recv().await {
                if let Err(e) = store.increment_match_stats(rule_id).await {
                    tracing::warn!("Failed to record match for rule {}: {}", rule_id, e);
                }
            }
        });

        Self { tx, worker }
    }

    pub fn record_match(&self, rule_id: i64) {
        match self.tx.try_send(rule_id) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Stats queue full, dropping match for rule {}", rule_id);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Stats worker gone, dropping match for rule {}", rule_id);
            }
        }
    }

    /// Stop accepting matches and wait for queued ones to be written.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            tracing::warn!("Stats worker ended abnormally: {}", e);
        }
    }
}
