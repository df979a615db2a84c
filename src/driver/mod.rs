//! Browser driver interface consumed by the flow engine, and its Chrome DevTools
//! Protocol implementation.

pub mod cdp;
pub mod keys;
pub mod launcher;
pub mod port;

pub use cdp::{CdpConnection, CdpPage};
pub use launcher::{ChromeBrowser, ChromeLauncher};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Opaque reference to a DOM element living in the page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

/// How an element is looked up in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn expression(&self) -> &str {
        match self {
            Locator::Css(s) | Locator::XPath(s) => s,
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "{}", s),
            Locator::XPath(s) => write!(f, "xpath={}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Attached,
    Detached,
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Visible,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    Top,
    Bottom,
    Position { x: f64, y: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    pub format: ImageFormat,
    /// JPEG quality 0-100, ignored for PNG
    pub quality: Option<u8>,
    pub omit_background: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOptions {
    pub viewport: Option<(u32, u32)>,
    pub user_agent: Option<String>,
}

/// Poll cadence shared by every wait the driver performs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverTimings {
    pub poll_interval: Duration,
    pub network_idle: Duration,
}

impl Default for DriverTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            network_idle: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOptions {
    pub chrome_path: PathBuf,
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub timings: DriverTimings,
}

impl LaunchOptions {
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            chrome_path: config.browser.chrome_path.clone(),
            headless: config.browser.headless,
            user_data_dir: config.browser.user_data_dir.clone(),
            extra_args: config.browser.extra_args.clone(),
            timings: DriverTimings {
                poll_interval: Duration::from_millis(config.run.poll_interval_ms),
                network_idle: Duration::from_millis(config.run.network_idle_ms),
            },
        }
    }
}

/// Messages posted from page scripts to the host on a named channel.
pub type MessageReceiver = tokio::sync::mpsc::UnboundedReceiver<serde_json::Value>;

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Browser>>;
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn is_connected(&self) -> bool;
    async fn new_page(&self, options: &PageOptions) -> Result<Arc<dyn Page>>;
    async fn close(&self) -> Result<()>;
}

/// One browser tab. Every call is a suspension point and either completes,
/// fails with a driver error, or times out.
#[async_trait]
pub trait Page: Send + Sync {
    fn is_closed(&self) -> bool;

    async fn url(&self) -> Result<String>;
    async fn goto(&self, url: &str) -> Result<()>;
    async fn go_back(&self) -> Result<()>;
    async fn go_forward(&self) -> Result<()>;
    async fn reload(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> Result<()>;
    /// Resolves with the new URL once it differs from `from`.
    async fn wait_for_url_change(&self, from: &str, timeout: Duration) -> Result<String>;
    /// Returns the element for `Attached`/`Visible`, `None` for `Detached`/`Hidden`.
    async fn wait_for_selector(
        &self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>>;
    async fn wait_for_element_state(
        &self,
        element: &ElementHandle,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()>;

    async fn query(&self, locator: &Locator) -> Result<Option<ElementHandle>>;
    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>>;
    async fn query_within(&self, parent: &ElementHandle, css: &str) -> Result<Vec<ElementHandle>>;

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool>;
    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;
    async fn hover(&self, element: &ElementHandle) -> Result<()>;
    async fn focus(&self, element: &ElementHandle) -> Result<()>;
    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()>;
    async fn type_text(&self, element: &ElementHandle, text: &str, delay: Duration) -> Result<()>;
    /// Empties the value and dispatches `input` and `change`.
    async fn clear_value(&self, element: &ElementHandle) -> Result<()>;
    async fn input_value(&self, element: &ElementHandle) -> Result<String>;
    async fn scroll_into_view(&self, element: &ElementHandle, smooth: bool) -> Result<()>;

    async fn text_content(&self, element: &ElementHandle) -> Result<Option<String>>;
    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;
    async fn inner_html(&self, element: &ElementHandle) -> Result<String>;

    /// `combo` is a key or `Modifier+...+Key`, using DOM key names.
    async fn press_key(&self, combo: &str) -> Result<()>;
    async fn keyboard_type(&self, text: &str, delay: Duration) -> Result<()>;
    async fn mouse_move(&self, x: f64, y: f64) -> Result<()>;
    async fn scroll_to(&self, target: ScrollTarget, smooth: bool) -> Result<()>;

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>>;
    async fn element_screenshot(
        &self,
        element: &ElementHandle,
        options: &ScreenshotOptions,
    ) -> Result<Vec<u8>>;

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()>;
    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<()>;

    /// Evaluate a script in page context and return its JSON value.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;
    /// Expose `window[name](payload)` to page scripts; payloads arrive on the receiver.
    async fn open_channel(&self, name: &str) -> Result<MessageReceiver>;
    async fn close_channel(&self, name: &str) -> Result<()>;
}
