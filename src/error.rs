use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid filter pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Timed out after {timeout_ms}ms waiting for {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("Browser is not started")]
    BrowserNotStarted,

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Invalid node {id}: {reason}")]
    InvalidNode { id: String, reason: String },

    #[error("input failed: {0}")]
    Input(String),

    #[error("input failed: field value {actual:?} does not match {expected:?}")]
    InputVerification { expected: String, actual: String },

    #[error("Element picker is already in progress")]
    PickerInProgress,

    #[error("Page cannot be replaced while the element picker is active")]
    PageLocked,

    #[error("Element picking was cancelled")]
    PickerCancelled,

    #[error("Element picking timed out after {0}s")]
    PickerTimedOut(u64),

    #[error("A flow is running")]
    FlowRunning,

    #[error("Action recording is already in progress")]
    RecordingInProgress,

    #[error("No action recording is in progress")]
    NotRecording,
}

impl FlowError {
    pub fn driver(msg: impl Into<String>) -> Self {
        FlowError::Driver(msg.into())
    }

    /// Stable machine-readable identifier for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            FlowError::Io(_) => "io",
            FlowError::Config(_) | FlowError::TomlSerialize(_) | FlowError::TomlDeserialize(_) => {
                "config"
            }
            FlowError::Json(_) => "json",
            FlowError::Regex(_) => "invalid_filter",
            FlowError::Validation(_) => "validation",
            FlowError::Driver(_) => "driver",
            FlowError::Timeout { .. } => "timeout",
            FlowError::BrowserNotStarted => "browser_not_started",
            FlowError::UnknownNodeType(_) => "unknown_node_type",
            FlowError::InvalidNode { .. } => "invalid_node",
            FlowError::Input(_) | FlowError::InputVerification { .. } => "input_failed",
            FlowError::PickerInProgress => "picker_in_progress",
            FlowError::PageLocked => "page_locked",
            FlowError::PickerCancelled => "picker_cancelled",
            FlowError::PickerTimedOut(_) => "picker_timed_out",
            FlowError::FlowRunning => "flow_running",
            FlowError::RecordingInProgress => "recording_in_progress",
            FlowError::NotRecording => "not_recording",
        }
    }

    /// Conflicts with the current lifecycle state rather than bad input or a broken page.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            FlowError::PickerInProgress
                | FlowError::PageLocked
                | FlowError::BrowserNotStarted
                | FlowError::FlowRunning
                | FlowError::RecordingInProgress
                | FlowError::NotRecording
        )
    }

    /// Errors caused by the submitted node tree itself.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            FlowError::UnknownNodeType(_)
                | FlowError::InvalidNode { .. }
                | FlowError::Validation(_)
                | FlowError::Regex(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(FlowError::PageLocked.is_conflict());
        assert!(FlowError::UnknownNodeType("x".into()).is_invalid_input());
        assert!(!FlowError::driver("boom").is_conflict());
        assert_eq!(FlowError::PickerInProgress.code(), "picker_in_progress");
    }

    #[test]
    fn test_input_errors_share_prefix() {
        let mismatch = FlowError::InputVerification {
            expected: "abc".into(),
            actual: "ab".into(),
        };
        assert!(mismatch.to_string().starts_with("input failed:"));
        assert!(FlowError::Input("x".into()).to_string().starts_with("input failed:"));
    }
}
