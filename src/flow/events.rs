//! Run progress events, fanned out to WebSocket clients.

use crate::flow::schema::FlowNode;
use serde::Serialize;
use tokio::sync::broadcast;

/// Maximum number of events to buffer per subscriber.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
    /// Another run was already active
    Skipped,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PickerState {
    Idle,
    Arming,
    Armed,
    Resolved,
    Cancelled,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        node_count: usize,
    },
    NodeStarted {
        run_id: String,
        node_id: String,
        node_type: String,
    },
    NodeFinished {
        run_id: String,
        node_id: String,
        duration_ms: u64,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        error: Option<String>,
    },
    PickerStateChanged {
        state: PickerState,
    },
    /// A user action captured while recording, or an earlier node it amended
    ActionRecorded {
        recording_id: String,
        node: FlowNode,
    },
}

/// Shared broadcast sender for run events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Send to every subscriber; dropped silently when nobody listens.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
