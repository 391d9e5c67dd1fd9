// ─── Progress & Cancellation ───
// Progress leaves the engine through one ordered channel; whoever renders it
// (GUI, CLI) owns the receiving end.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub message: String,
    /// `0.0..=1.0` when the stage knows its total.
    pub fraction: Option<f32>,
}

/// Sending half of the progress channel. The default value drops every event.
#[derive(Debug, Clone, Default)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

pub fn progress_channel() -> (ProgressSender, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressSender { tx: Some(tx) }, rx)
}

impl ProgressSender {
    pub fn report(&self, message: impl Into<String>, fraction: Option<f32>) {
        if let Some(tx) = &self.tx {
            // A dropped receiver only means nobody is watching.
            let _ = tx.send(ProgressEvent {
                message: message.into(),
                fraction: fraction.map(|f| f.clamp(0.0, 1.0)),
            });
        }
    }
}

/// Cooperative cancellation flag, checked between queued tasks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> LauncherResult<()> {
        if self.is_cancelled() {
            Err(LauncherError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Counters shared by every task of a download pool.
#[derive(Debug, Default)]
pub struct TransferStats {
    files: AtomicU64,
    bytes: AtomicU64,
}

impl TransferStats {
    pub fn record(&self, bytes: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_send_order() {
        let (sender, mut rx) = progress_channel();
        sender.report("first", Some(0.1));
        sender.report("second", None);
        sender.report("third", Some(4.0));
        drop(sender);

        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            seen.push(event);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].message, "first");
        assert_eq!(seen[1].fraction, None);
        assert_eq!(seen[2].fraction, Some(1.0));
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());
        token.cancel();
        assert!(matches!(clone.check(), Err(LauncherError::Cancelled)));
    }
}
