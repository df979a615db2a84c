use crate::driver::ElementHandle;
use crate::picker::PickedSelector;
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Placeholder name that resolves to the current loop index.
pub const LOOP_INDEX_PLACEHOLDER: &str = "loopIndex";

/// State owned by one run and threaded through every handler.
#[derive(Debug, Default)]
pub struct RunContext {
    /// Values written by extraction, readable by every later node
    pub variables: HashMap<String, Value>,
    /// Current iteration of the innermost loop that ran
    pub loop_index: Option<usize>,
    /// Current element of the innermost elements loop that ran
    pub loop_element: Option<ElementHandle>,
    /// Selectors resolved by the picker, keyed by node id
    pub picked_selectors: HashMap<String, PickedSelector>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Default::default()
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    /// Push `value` onto the list stored under `name`, creating or widening it.
    pub fn append_variable(&mut self, name: &str, value: Value) {
        match self.variables.get_mut(name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let previous = existing.take();
                *existing = Value::Array(vec![previous, value]);
            }
            None => {
                self.variables
                    .insert(name.to_string(), Value::Array(vec![value]));
            }
        }
    }

    /// Replace `${name}` placeholders with run variables. Unknown names are left as is.
    pub fn interpolate(&self, input: &str) -> String {
        if !input.contains("${") {
            return input.to_string();
        }

        let mut result = input.to_string();
        if let Some(index) = self.loop_index {
            result = result.replace(
                &format!("${{{}}}", LOOP_INDEX_PLACEHOLDER),
                &index.to_string(),
            );
        }
        for (key, value) in &self.variables {
            let placeholder = format!("${{{}}}", key);
            if !result.contains(&placeholder) {
                continue;
            }
            let replacement = match value {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            result = result.replace(&placeholder, &replacement);
        }
        result
    }

    pub fn interpolate_opt(&self, input: Option<&String>) -> Option<String> {
        input.map(|s| self.interpolate(s))
    }
}
