use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;

/// A single timestamped event for external consumers
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Milliseconds since epoch
    pub ts: i64,
    pub message: String,
    pub delivered: bool,
}

/// Append-only log stream shared with external collaborators
///
/// Entries are marked delivered once drained so consumers can poll
/// idempotently. Cloning shares the underlying buffer.
#[derive(Clone, Default)]
pub struct EventLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message, mirroring it to the tracing output
    pub fn append(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!("{}", message);

        let mut entries = self.entries.lock().unwrap();
        entries.push(LogEntry {
            ts: Utc::now().timestamp_millis(),
            message,
            delivered: false,
        });
    }

    /// Return all entries not yet delivered and mark them delivered
    pub fn drain_undelivered(&self) -> Vec<LogEntry> {
        let mut entries = self.entries.lock().unwrap();
        let mut drained = Vec::new();

        for entry in entries.iter_mut().filter(|e| !e.delivered) {
            entry.delivered = true;
            drained.push(entry.clone());
        }

        drained
    }

    /// Copy of the full log, delivered or not
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
