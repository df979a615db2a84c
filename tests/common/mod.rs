//! In-memory driver doubles shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use flowrunner_lib::driver::{
    Browser, BrowserLauncher, ElementHandle, ElementState, LaunchOptions, LoadState, Locator,
    MessageReceiver, Page, PageOptions, ScreenshotOptions, ScrollTarget, WaitState,
};
use flowrunner_lib::error::{FlowError, Result};
use flowrunner_lib::flow::FlowNode;
use flowrunner_lib::picker::{PickedSelector, SelectorPicker};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// One element of the fake document. `tags` lists the selector strings it answers to.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub tags: Vec<String>,
    pub text: String,
    pub html: String,
    pub attrs: HashMap<String, String>,
    pub hidden: bool,
    pub disabled: bool,
    pub value: String,
    pub max_length: Option<usize>,
    pub parent: Option<usize>,
}

impl FakeElement {
    pub fn new(tags: &[&str], text: &str) -> Self {
        Self {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            text: text.to_string(),
            html: text.to_string(),
            ..Default::default()
        }
    }

    pub fn child_of(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    fn matches(&self, selector: &str) -> bool {
        selector
            .split(',')
            .map(str::trim)
            .any(|part| self.tags.iter().any(|t| t == part))
    }
}

type ClickHook = Arc<dyn Fn(&FakePage) + Send + Sync>;

/// A page whose document is a flat list of [`FakeElement`]s. Every driver call is
/// recorded in `calls` as `"<op>"` or `"<op>:<arg>"`.
#[derive(Default)]
pub struct FakePage {
    dom: Mutex<Vec<Option<FakeElement>>>,
    sites: Mutex<HashMap<String, Vec<FakeElement>>>,
    url: Mutex<String>,
    calls: Mutex<Vec<String>>,
    click_hooks: Mutex<HashMap<usize, ClickHook>>,
    channels: Mutex<HashMap<String, UnboundedSender<Value>>>,
    closed: AtomicBool,
}

impl FakePage {
    pub fn new() -> Arc<Self> {
        let page = Self::default();
        *page.url.lock() = "about:blank".to_string();
        Arc::new(page)
    }

    /// Add an element and return its index.
    pub fn insert(&self, element: FakeElement) -> usize {
        let mut dom = self.dom.lock();
        dom.push(Some(element));
        dom.len() - 1
    }

    pub fn remove(&self, index: usize) {
        if let Some(slot) = self.dom.lock().get_mut(index) {
            *slot = None;
        }
    }

    pub fn update(&self, index: usize, f: impl FnOnce(&mut FakeElement)) {
        if let Some(Some(el)) = self.dom.lock().get_mut(index) {
            f(el);
        }
    }

    /// Document served when `goto(url)` is called.
    pub fn add_site(&self, url: &str, elements: Vec<FakeElement>) {
        self.sites.lock().insert(url.to_string(), elements);
    }

    pub fn on_click(&self, index: usize, hook: impl Fn(&FakePage) + Send + Sync + 'static) {
        self.click_hooks.lock().insert(index, Arc::new(hook));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn current_url(&self) -> String {
        self.url.lock().clone()
    }

    pub fn handle(index: usize) -> ElementHandle {
        ElementHandle::new(format!("el-{}", index))
    }

    /// Deliver `message` as if a page script had posted it on `channel`.
    pub fn post(&self, channel: &str, message: Value) -> bool {
        match self.channels.lock().get(channel) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    pub fn has_channel(&self, channel: &str) -> bool {
        self.channels.lock().contains_key(channel)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn index_of(element: &ElementHandle) -> Result<usize> {
        element
            .id()
            .strip_prefix("el-")
            .and_then(|i| i.parse().ok())
            .ok_or_else(|| FlowError::driver(format!("Bad handle {}", element.id())))
    }

    fn with_element<T>(&self, element: &ElementHandle, f: impl FnOnce(&mut FakeElement) -> T) -> Result<T> {
        let index = Self::index_of(element)?;
        let mut dom = self.dom.lock();
        match dom.get_mut(index) {
            Some(Some(el)) => Ok(f(el)),
            _ => Err(FlowError::driver("Element is detached from the document")),
        }
    }

    fn find_all(&self, locator: &Locator) -> Vec<usize> {
        self.dom
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(i, el)| match el {
                Some(el) if el.matches(locator.expression()) => Some(i),
                _ => None,
            })
            .collect()
    }

    fn is_descendant(dom: &[Option<FakeElement>], mut index: usize, ancestor: usize) -> bool {
        while let Some(Some(el)) = dom.get(index) {
            match el.parent {
                Some(p) if p == ancestor => return true,
                Some(p) => index = p,
                None => return false,
            }
        }
        false
    }

    fn set_value(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.with_element(element, |el| {
            el.value = match el.max_length {
                Some(max) => text.chars().take(max).collect(),
                None => text.to_string(),
            };
        })
    }
}

fn timeout(what: impl Into<String>, timeout: Duration) -> FlowError {
    FlowError::Timeout {
        what: what.into(),
        timeout_ms: timeout.as_millis() as u64,
    }
}

#[async_trait]
impl Page for FakePage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn url(&self) -> Result<String> {
        Ok(self.current_url())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        self.record(format!("goto:{}", url));
        *self.url.lock() = url.to_string();
        if let Some(site) = self.sites.lock().get(url).cloned() {
            *self.dom.lock() = site.into_iter().map(Some).collect();
        }
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        self.record("back");
        Ok(())
    }

    async fn go_forward(&self) -> Result<()> {
        self.record("forward");
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.record("reload");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_load_state(&self, _state: LoadState, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn wait_for_url_change(&self, from: &str, t: Duration) -> Result<String> {
        let url = self.current_url();
        if url != from {
            return Ok(url);
        }
        Err(timeout("URL change", t))
    }

    async fn wait_for_selector(
        &self,
        locator: &Locator,
        state: WaitState,
        t: Duration,
    ) -> Result<Option<ElementHandle>> {
        let found = self.find_all(locator).first().copied();
        let visible = match found {
            Some(i) => self.dom.lock()[i].as_ref().is_some_and(|el| !el.hidden),
            None => false,
        };
        match (state, found) {
            (WaitState::Attached, Some(i)) => Ok(Some(Self::handle(i))),
            (WaitState::Visible, Some(i)) if visible => Ok(Some(Self::handle(i))),
            (WaitState::Detached, None) => Ok(None),
            (WaitState::Hidden, _) if !visible => Ok(None),
            _ => Err(timeout(format!("{} to be {:?}", locator, state), t)),
        }
    }

    async fn wait_for_element_state(
        &self,
        element: &ElementHandle,
        state: ElementState,
        t: Duration,
    ) -> Result<()> {
        let ready = self.with_element(element, |el| match state {
            ElementState::Visible => !el.hidden,
            ElementState::Enabled => !el.disabled,
        })?;
        if ready {
            Ok(())
        } else {
            Err(timeout(format!("element to be {:?}", state), t))
        }
    }

    async fn query(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        Ok(self.find_all(locator).first().map(|i| Self::handle(*i)))
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        Ok(self.find_all(locator).into_iter().map(Self::handle).collect())
    }

    async fn query_within(&self, parent: &ElementHandle, css: &str) -> Result<Vec<ElementHandle>> {
        let parent = Self::index_of(parent)?;
        let dom = self.dom.lock();
        Ok(dom
            .iter()
            .enumerate()
            .filter_map(|(i, el)| match el {
                Some(el) if el.matches(css) && Self::is_descendant(&dom, i, parent) => {
                    Some(Self::handle(i))
                }
                _ => None,
            })
            .collect())
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool> {
        self.with_element(element, |el| !el.hidden)
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool> {
        self.with_element(element, |el| !el.disabled)
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let index = Self::index_of(element)?;
        self.with_element(element, |_| ())?;
        self.record(format!("click:{}", index));
        let hook = self.click_hooks.lock().get(&index).cloned();
        if let Some(hook) = hook {
            hook(self);
        }
        Ok(())
    }

    async fn hover(&self, element: &ElementHandle) -> Result<()> {
        self.record(format!("hover:{}", Self::index_of(element)?));
        Ok(())
    }

    async fn focus(&self, element: &ElementHandle) -> Result<()> {
        self.record(format!("focus:{}", Self::index_of(element)?));
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.record(format!("fill:{}", text));
        self.set_value(element, text)
    }

    async fn type_text(&self, element: &ElementHandle, text: &str, _delay: Duration) -> Result<()> {
        self.record(format!("type:{}", text));
        let current = self.with_element(element, |el| el.value.clone())?;
        self.set_value(element, &format!("{}{}", current, text))
    }

    async fn clear_value(&self, element: &ElementHandle) -> Result<()> {
        self.record("clear");
        self.with_element(element, |el| el.value.clear())
    }

    async fn input_value(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |el| el.value.clone())
    }

    async fn scroll_into_view(&self, element: &ElementHandle, _smooth: bool) -> Result<()> {
        self.with_element(element, |_| ())
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<Option<String>> {
        self.with_element(element, |el| Some(el.text.clone()))
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.with_element(element, |el| el.attrs.get(name).cloned())
    }

    async fn inner_html(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |el| el.html.clone())
    }

    async fn press_key(&self, combo: &str) -> Result<()> {
        self.record(format!("press:{}", combo));
        Ok(())
    }

    async fn keyboard_type(&self, text: &str, _delay: Duration) -> Result<()> {
        self.record(format!("keyboard:{}", text));
        Ok(())
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
        self.record(format!("move:{},{}", x, y));
        Ok(())
    }

    async fn scroll_to(&self, target: ScrollTarget, _smooth: bool) -> Result<()> {
        self.record(format!("scroll:{:?}", target));
        Ok(())
    }

    async fn screenshot(&self, _options: &ScreenshotOptions) -> Result<Vec<u8>> {
        self.record("screenshot");
        Ok(b"\x89PNG".to_vec())
    }

    async fn element_screenshot(
        &self,
        element: &ElementHandle,
        _options: &ScreenshotOptions,
    ) -> Result<Vec<u8>> {
        self.record(format!("screenshot:{}", Self::index_of(element)?));
        Ok(b"\x89PNG".to_vec())
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.record(format!("viewport:{}x{}", width, height));
        Ok(())
    }

    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        let mut names: Vec<&String> = headers.keys().collect();
        names.sort();
        for name in names {
            self.record(format!("header:{}={}", name, headers[name]));
        }
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value> {
        self.record("evaluate");
        Ok(Value::Null)
    }

    async fn open_channel(&self, name: &str) -> Result<MessageReceiver> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.channels.lock().insert(name.to_string(), tx);
        Ok(rx)
    }

    async fn close_channel(&self, name: &str) -> Result<()> {
        self.channels.lock().remove(name);
        Ok(())
    }
}

/// Hands out the same [`FakePage`] for every `new_page`.
pub struct FakeBrowser {
    page: Arc<FakePage>,
    connected: AtomicBool,
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn new_page(&self, _options: &PageOptions) -> Result<Arc<dyn Page>> {
        Ok(self.page.clone())
    }

    async fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub page: Arc<FakePage>,
    launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new(page: Arc<FakePage>) -> Arc<Self> {
        Arc::new(Self {
            page,
            launches: AtomicUsize::new(0),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn Browser>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeBrowser {
            page: self.page.clone(),
            connected: AtomicBool::new(true),
        }))
    }
}

/// Answers every pick with a fixed selector and counts the calls.
pub struct StubPicker {
    pub answer: PickedSelector,
    picks: AtomicUsize,
}

impl StubPicker {
    pub fn new(answer: PickedSelector) -> Arc<Self> {
        Arc::new(Self {
            answer,
            picks: AtomicUsize::new(0),
        })
    }

    pub fn picks(&self) -> usize {
        self.picks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SelectorPicker for StubPicker {
    async fn pick(&self, _page: &Arc<dyn Page>, cancel: &CancellationToken) -> Result<PickedSelector> {
        if cancel.is_cancelled() {
            return Err(FlowError::PickerCancelled);
        }
        self.picks.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

pub fn node(id: &str, node_type: &str, properties: Value) -> FlowNode {
    FlowNode::new(id, node_type, properties)
}
