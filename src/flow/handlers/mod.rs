//! Per-node action handlers.
//!
//! Each handler turns one node's typed properties into driver calls against the
//! session page. A handler missing a property it needs returns `Ok(())` without
//! touching the page; the input handler is the exception and fails instead.

pub mod browser;
pub mod click;
pub mod extract;
pub mod input;
pub mod keyboard;
pub mod mouse;
pub mod screenshot;
pub mod scroll;
pub mod wait;

use crate::config::RunSettings;
use crate::driver::{ElementHandle, Locator, Page, WaitState};
use crate::error::{FlowError, Result};
use crate::flow::context::RunContext;
use crate::flow::schema::{SelectorType, Target};
use crate::picker::SelectorPicker;
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler needs besides the run context.
pub struct Session {
    page: Option<Arc<dyn Page>>,
    pub settings: RunSettings,
    pub picker: Arc<dyn SelectorPicker>,
}

impl Session {
    pub fn new(page: Arc<dyn Page>, settings: RunSettings, picker: Arc<dyn SelectorPicker>) -> Self {
        Self {
            page: Some(page),
            settings,
            picker,
        }
    }

    /// The live page, or `BrowserNotStarted` once a node closed it.
    pub fn page(&self) -> Result<&Arc<dyn Page>> {
        self.page.as_ref().ok_or(FlowError::BrowserNotStarted)
    }

    /// Detach the page from the session so later nodes see no browser.
    pub fn take_page(&mut self) -> Option<Arc<dyn Page>> {
        self.page.take()
    }

    /// Node timeout in seconds, else the configured default.
    pub fn timeout(&self, secs: Option<f64>) -> Duration {
        secs_or(secs, self.settings.default_timeout())
    }

    /// Fixed sleep in seconds. Unlike [`Session::timeout`], an explicit zero means
    /// no sleep at all.
    pub fn delay(&self, secs: Option<f64>) -> Duration {
        delay_or(secs, self.settings.default_timeout())
    }
}

/// Bound for a wait-for-element. Zero or negative values fall back to `default`,
/// since a zero bound would fail before the first check.
pub(crate) fn secs_or(secs: Option<f64>, default: Duration) -> Duration {
    match secs {
        Some(s) if s.is_finite() && s > 0.0 => Duration::from_secs_f64(s),
        _ => default,
    }
}

/// Length of a fixed sleep. `default` applies only when the field is absent.
pub(crate) fn delay_or(secs: Option<f64>, default: Duration) -> Duration {
    match secs {
        Some(s) if s.is_finite() && s > 0.0 => Duration::from_secs_f64(s),
        Some(_) => Duration::ZERO,
        None => default,
    }
}

/// Apply the `selectorType` prefix rules to a raw selector.
pub fn normalize_selector(selector: &str, selector_type: Option<SelectorType>) -> Locator {
    let selector = selector.trim();
    match selector_type.unwrap_or_default() {
        SelectorType::Id if selector.starts_with('#') => Locator::css(selector),
        SelectorType::Id => Locator::css(format!("#{}", selector)),
        SelectorType::Class if selector.starts_with('.') => Locator::css(selector),
        SelectorType::Class => Locator::css(
            selector
                .split_whitespace()
                .map(|c| format!(".{}", c))
                .collect::<String>(),
        ),
        SelectorType::Name if selector.starts_with("[name=") => Locator::css(selector),
        SelectorType::Name => Locator::css(format!("[name=\"{}\"]", selector)),
        SelectorType::Xpath => Locator::XPath(selector.to_string()),
        SelectorType::Css => Locator::css(selector),
    }
}

impl Target {
    /// Interpolated, normalized locator; `None` when no selector is set.
    pub fn locator(&self, ctx: &RunContext) -> Option<Locator> {
        let selector = ctx.interpolate_opt(self.selector.as_ref())?;
        if selector.trim().is_empty() {
            return None;
        }
        Some(normalize_selector(&selector, self.selector_type))
    }
}

/// Wait for `locator` to reach `state` and return the element it resolved to.
pub(crate) async fn wait_for_element(
    page: &Arc<dyn Page>,
    locator: &Locator,
    state: WaitState,
    timeout: Duration,
) -> Result<ElementHandle> {
    page.wait_for_selector(locator, state, timeout)
        .await?
        .ok_or_else(|| FlowError::driver(format!("No element matches {}", locator)))
}
