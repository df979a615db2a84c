//! Action recording.
//!
//! While a recording is active the page reports the user's clicks, text entry,
//! scrolling and special keys, and each one becomes a root [`FlowNode`] the editor can
//! replay. Consecutive edits of one field and consecutive scrolls fold into a single
//! node. Only one recording exists at a time, and it holds the lifecycle's recording
//! slot so runs and picker sessions stay out of the page meanwhile.

pub mod script;

use crate::driver::{MessageReceiver, Page};
use crate::error::{FlowError, Result};
use crate::flow::events::{EventBus, RunEvent};
use crate::flow::lifecycle::RecordingLease;
use crate::flow::schema::FlowNode;
use parking_lot::Mutex;
use script::{RecordedAction, CHANNEL_NAME, STOP_SCRIPT};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// How long `stop` waits for already posted actions to be processed.
const DRAIN_WAIT: Duration = Duration::from_secs(1);

/// A finished recording.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub id: String,
    pub nodes: Vec<FlowNode>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordingInfo {
    pub id: String,
    /// Page address when recording started; recorded as the first node
    pub start_url: Option<String>,
}

/// Nodes recorded so far.
#[derive(Debug, Default)]
struct NodeLog {
    nodes: Vec<FlowNode>,
}

impl NodeLog {
    fn next_id(&self) -> String {
        format!("rec-{}", self.nodes.len() + 1)
    }

    fn navigation(&mut self, url: &str) -> FlowNode {
        let node = FlowNode::new(
            self.next_id(),
            "browser",
            json!({ "actionType": "goto", "url": url, "waitForLoad": true }),
        );
        self.nodes.push(node.clone());
        node
    }

    /// Append `action`, or fold it into the last node when it only updates it.
    /// Returns the node that was added or changed.
    fn record(&mut self, action: &RecordedAction) -> FlowNode {
        if let Some(last) = self.nodes.last_mut() {
            let folded = match action {
                RecordedAction::Input {
                    selector, value, ..
                } if last.node_type == "input"
                    && last.properties.get("selector").and_then(|s| s.as_str())
                        == Some(selector.as_str()) =>
                {
                    last.properties.insert("text".to_string(), json!(value));
                    true
                }
                RecordedAction::Scroll { x, y } if last.node_type == "scroll" => {
                    last.properties.insert("x".to_string(), json!(x));
                    last.properties.insert("y".to_string(), json!(y));
                    true
                }
                _ => false,
            };
            if folded {
                return last.clone();
            }
        }
        let node = action.to_node(self.next_id());
        self.nodes.push(node.clone());
        node
    }
}

struct ActiveRecording {
    id: String,
    page: Arc<dyn Page>,
    started: Instant,
    log: Arc<Mutex<NodeLog>>,
    pump: JoinHandle<()>,
    _lease: RecordingLease,
}

async fn pump(
    mut rx: MessageReceiver,
    log: Arc<Mutex<NodeLog>>,
    events: EventBus,
    recording_id: String,
) {
    while let Some(raw) = rx.recv().await {
        let Some(action) = RecordedAction::parse(&raw) else {
            tracing::debug!("Ignoring recorder channel message: {}", raw);
            continue;
        };
        let node = log.lock().record(&action);
        tracing::debug!("Recorded {} node {}", node.node_type, node.id);
        events.emit(RunEvent::ActionRecorded {
            recording_id: recording_id.clone(),
            node,
        });
    }
}

/// Owns the single active recording, if any.
pub struct Recorder {
    events: EventBus,
    active: Mutex<Option<ActiveRecording>>,
}

impl Recorder {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            active: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Start recording on `page`. The lease is held until [`Recorder::stop`].
    pub async fn start(&self, page: Arc<dyn Page>, lease: RecordingLease) -> Result<RecordingInfo> {
        if self.is_active() {
            return Err(FlowError::RecordingInProgress);
        }

        if let Err(e) = page.evaluate(STOP_SCRIPT).await {
            tracing::debug!("No previous recorder to stop: {}", e);
        }
        let rx = page.open_channel(CHANNEL_NAME).await?;
        if let Err(e) = page.evaluate(&script::start_script(CHANNEL_NAME)).await {
            let _ = page.close_channel(CHANNEL_NAME).await;
            return Err(e);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut log = NodeLog::default();
        let start_url = match page.url().await {
            Ok(url) if url.starts_with("http://") || url.starts_with("https://") => Some(url),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Could not read page address: {}", e);
                None
            }
        };
        if let Some(url) = &start_url {
            let node = log.navigation(url);
            self.events.emit(RunEvent::ActionRecorded {
                recording_id: id.clone(),
                node,
            });
        }

        let log = Arc::new(Mutex::new(log));
        let pump = tokio::spawn(pump(rx, Arc::clone(&log), self.events.clone(), id.clone()));
        *self.active.lock() = Some(ActiveRecording {
            id: id.clone(),
            page,
            started: Instant::now(),
            log,
            pump,
            _lease: lease,
        });

        tracing::info!("Recording {} started", id);
        Ok(RecordingInfo { id, start_url })
    }

    /// Stop the active recording and return its nodes.
    pub async fn stop(&self) -> Result<Recording> {
        let active = self
            .active
            .lock()
            .take()
            .ok_or(FlowError::NotRecording)?;
        let ActiveRecording {
            id,
            page,
            started,
            log,
            mut pump,
            _lease,
        } = active;

        if let Err(e) = page.evaluate(STOP_SCRIPT).await {
            tracing::warn!("Failed to stop page recorder: {}", e);
        }
        if let Err(e) = page.close_channel(CHANNEL_NAME).await {
            tracing::warn!("Failed to remove recorder channel: {}", e);
        }
        // Closing the channel ends the pump once it has drained what was posted
        if tokio::time::timeout(DRAIN_WAIT, &mut pump).await.is_err() {
            tracing::warn!("Recorder did not drain in time");
            pump.abort();
        }

        let nodes = std::mem::take(&mut log.lock().nodes);
        tracing::info!("Recording {} stopped with {} nodes", id, nodes.len());
        Ok(Recording {
            id,
            nodes,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
