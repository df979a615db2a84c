//! The in-page recorder script and the actions it posts back.

use crate::flow::schema::{FlowNode, SelectorType};
use crate::picker::script::PICKER_SOURCE;
use serde::Deserialize;
use serde_json::{json, Value};

/// Binding the recorder posts through.
pub const CHANNEL_NAME: &str = "__flowrunnerRecorderPost";

const RECORDER_SOURCE: &str = include_str!("recorder.js");

/// Install the selector generator and the recorder, then start it on `channel`.
pub fn start_script(channel: &str) -> String {
    format!(
        "{}\n{}\nwindow.__flowrunnerRecorder.start({});\ntrue",
        PICKER_SOURCE,
        RECORDER_SOURCE,
        Value::String(channel.to_string())
    )
}

pub const STOP_SCRIPT: &str =
    "(() => { if (window.__flowrunnerRecorder) { window.__flowrunnerRecorder.stop(); } return true; })()";

/// One user action as the recorder reports it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecordedAction {
    #[serde(rename_all = "camelCase")]
    Click {
        selector: String,
        #[serde(default)]
        selector_type: SelectorType,
    },
    #[serde(rename_all = "camelCase")]
    Input {
        selector: String,
        #[serde(default)]
        selector_type: SelectorType,
        #[serde(default)]
        value: String,
    },
    Scroll {
        x: f64,
        y: f64,
    },
    Keypress {
        key: String,
    },
}

impl RecordedAction {
    /// `None` for malformed messages and actions without a usable target.
    pub fn parse(message: &Value) -> Option<Self> {
        let action: RecordedAction = serde_json::from_value(message.clone()).ok()?;
        let usable = match &action {
            RecordedAction::Click { selector, .. } | RecordedAction::Input { selector, .. } => {
                !selector.trim().is_empty()
            }
            RecordedAction::Scroll { x, y } => x.is_finite() && y.is_finite(),
            RecordedAction::Keypress { key } => !key.is_empty(),
        };
        usable.then_some(action)
    }

    /// The node that replays this action.
    pub fn to_node(&self, id: impl Into<String>) -> FlowNode {
        match self {
            RecordedAction::Click {
                selector,
                selector_type,
            } => FlowNode::new(
                id,
                "click",
                json!({ "selector": selector, "selectorType": selector_type }),
            ),
            RecordedAction::Input {
                selector,
                selector_type,
                value,
            } => FlowNode::new(
                id,
                "input",
                json!({
                    "selector": selector,
                    "selectorType": selector_type,
                    "text": value,
                    "clearFirst": true,
                }),
            ),
            RecordedAction::Scroll { x, y } => FlowNode::new(
                id,
                "scroll",
                json!({ "scrollType": "position", "x": x, "y": y }),
            ),
            RecordedAction::Keypress { key } => FlowNode::new(
                id,
                "keyboard",
                json!({ "actionType": "press", "key": key }),
            ),
        }
    }
}
