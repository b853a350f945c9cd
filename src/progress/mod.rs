//! Progress events
//!
//! Fetching, route resolution and retrying all report what they are doing
//! through a [`ProgressSink`]. The HTTP layer turns the events into an
//! SSE stream; the CLI just logs them.

use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

/// A single structured progress record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressEvent {
    pub stage: String,
    pub detail: Value,
    pub timestamp: String,
}

impl ProgressEvent {
    pub fn new(stage: impl Into<String>, detail: Value) -> Self {
        Self {
            stage: stage.into(),
            detail,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Receiver of progress records
pub trait ProgressSink: Send + Sync {
    fn emit(&self, stage: &str, detail: Value);

    /// True once nobody is listening any more.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Discards everything
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _stage: &str, _detail: Value) {}
}

/// Writes every event to the debug log
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, stage: &str, detail: Value) {
        debug!(stage, %detail, "progress");
    }
}

/// Forwards events to a channel consumer (e.g. an SSE response)
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, stage: &str, detail: Value) {
        // The receiver going away is how a client abandons a job.
        let _ = self.tx.send(ProgressEvent::new(stage, detail));
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Keeps events in memory for later inspection
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.stage).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, stage: &str, detail: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(ProgressEvent::new(stage, detail));
        }
    }
}
