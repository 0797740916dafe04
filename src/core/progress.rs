//! Run progress published through a watch channel
//!
//! The executor owns the counters; observers (the CLI, a UI layer) subscribe to
//! a `watch::Receiver` and always see the latest snapshot.

use crate::types::ImportProgress;
use tokio::sync::watch;

#[derive(Debug)]
pub struct ProgressTracker {
    sender: watch::Sender<ImportProgress>,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        let (sender, _) = watch::channel(ImportProgress::new(total));
        Self { sender }
    }

    pub fn subscribe(&self) -> watch::Receiver<ImportProgress> {
        self.sender.subscribe()
    }

    /// Count one finished record; skipped records count as successful
    pub fn record(&self, succeeded: bool) {
        self.sender.send_modify(|progress| progress.record(succeeded));
    }

    pub fn snapshot(&self) -> ImportProgress {
        *self.sender.borrow()
    }
}
