//! The in-page picker script and the messages it posts back.

use crate::flow::schema::SelectorType;
use crate::picker::PickedSelector;
use serde_json::Value;

/// Binding the page script posts through.
pub const CHANNEL_NAME: &str = "__flowrunnerPickerPost";

/// Picker source; defines `window.__flowrunnerPicker`, including the selector generator.
pub(crate) const PICKER_SOURCE: &str = include_str!("picker.js");

/// Install the picker (replacing any earlier instance) and arm it on `channel`.
pub fn arm_script(channel: &str) -> String {
    format!(
        "{}\nwindow.__flowrunnerPicker.enable({});\ntrue",
        PICKER_SOURCE,
        Value::String(channel.to_string())
    )
}

pub const DISARM_SCRIPT: &str =
    "(() => { if (window.__flowrunnerPicker) { window.__flowrunnerPicker.disable(); } return true; })()";

/// Install the picker without arming it and run the selector generator on the first
/// element matching `css`. Evaluates to `{ selector, selectorType, unique }`, or
/// `null` when nothing matches.
pub fn generate_for_script(css: &str) -> String {
    format!(
        "{}\n(() => {{ \
           const el = document.querySelector({}); \
           if (!el) return null; \
           const r = window.__flowrunnerPicker.generateSelector(el); \
           const hits = document.querySelectorAll(r.selector); \
           return {{ selector: r.selector, selectorType: r.selectorType, unique: hits.length === 1 && hits[0] === el }}; \
         }})()",
        PICKER_SOURCE,
        Value::String(css.to_string())
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickerMessage {
    Selected(PickedSelector),
    Cancelled,
}

impl PickerMessage {
    /// `None` for anything that is not a picker message.
    pub fn parse(message: &Value) -> Option<Self> {
        match message.get("type")?.as_str()? {
            "ELEMENT_SELECTED" => {
                let selector = message.get("selector")?.as_str()?.trim();
                if selector.is_empty() {
                    return None;
                }
                let selector_type = message
                    .get("selectorType")
                    .cloned()
                    .and_then(|t| serde_json::from_value::<SelectorType>(t).ok())
                    .unwrap_or_default();
                Some(PickerMessage::Selected(PickedSelector {
                    selector: selector.to_string(),
                    selector_type,
                }))
            }
            "PICKER_CANCELLED" => Some(PickerMessage::Cancelled),
            _ => None,
        }
    }
}
