use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    /// Browser launch settings
    #[serde(default)]
    pub browser: BrowserSettings,

    /// Flow execution defaults
    #[serde(default)]
    pub run: RunSettings,

    /// Local HTTP API used by the flow editor
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserSettings {
    /// Chrome executable path
    #[serde(default = "default_chrome_path")]
    pub chrome_path: PathBuf,

    /// Run Chrome without a visible window
    #[serde(default)]
    pub headless: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// User data directory; a fresh temporary directory is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data_dir: Option<PathBuf>,

    /// Additional Chrome command line arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: default_chrome_path(),
            headless: false,
            viewport_width: None,
            viewport_height: None,
            user_agent: None,
            user_data_dir: None,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserSettings {
    /// Viewport override, only when both dimensions are configured.
    pub fn viewport(&self) -> Option<(u32, u32)> {
        match (self.viewport_width, self.viewport_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    /// Element wait timeout when a node does not set its own
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// How long a picker session waits for the user
    #[serde(default = "default_picker_timeout_secs")]
    pub picker_timeout_secs: u64,

    /// Fixed delay after a click that waits for navigation
    #[serde(default = "default_click_settle_ms")]
    pub click_settle_ms: u64,

    /// Quiet period without new network requests that counts as network-idle
    #[serde(default = "default_network_idle_ms")]
    pub network_idle_ms: u64,

    /// Poll interval for element and load-state waits
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            picker_timeout_secs: default_picker_timeout_secs(),
            click_settle_ms: default_click_settle_ms(),
            network_idle_ms: default_network_idle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RunSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn picker_timeout(&self) -> Duration {
        Duration::from_secs(self.picker_timeout_secs)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Required `X-API-Key` header value; no auth when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
            api_key: None,
        }
    }
}

/// Get default Chrome path based on platform
fn default_chrome_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        PathBuf::from("C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe")
    }
    #[cfg(target_os = "macos")]
    {
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        PathBuf::from("/usr/bin/google-chrome")
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_picker_timeout_secs() -> u64 {
    300
}

fn default_click_settle_ms() -> u64 {
    500
}

fn default_network_idle_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_api_port() -> u16 {
    38473
}

fn default_true() -> bool {
    true
}
