use crate::driver::keys::{self, KeyDefinition, MOD_ALT, MOD_CONTROL, MOD_META};
use crate::driver::{
    DriverTimings, ElementHandle, ElementState, ImageFormat, LoadState, Locator, MessageReceiver,
    Page, ScreenshotOptions, ScrollTarget, WaitState,
};
use crate::error::{FlowError, Result};
use async_trait::async_trait;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

const IS_VISIBLE_JS: &str = "function(el) { \
    const style = window.getComputedStyle(el); \
    if (style.visibility === 'hidden' || style.display === 'none') return false; \
    const r = el.getBoundingClientRect(); \
    return r.width > 0 && r.height > 0; }";

const IS_ENABLED_JS: &str = "function() { \
    return !this.disabled && this.getAttribute('aria-disabled') !== 'true'; }";

type WsSink = futures::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    WsMessage,
>;
type ResponseMap = Arc<SyncMutex<HashMap<u64, oneshot::Sender<Value>>>>;
type BindingMap = Arc<SyncMutex<HashMap<String, mpsc::UnboundedSender<Value>>>>;

/// One WebSocket session to a CDP target.
pub struct CdpConnection {
    ws_tx: Mutex<WsSink>,
    responses: ResponseMap,
    bindings: BindingMap,
    msg_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| FlowError::driver(format!("Failed to connect WebSocket: {}", e)))?;
        let (tx, mut rx) = StreamExt::split(ws_stream);

        let responses: ResponseMap = Arc::new(SyncMutex::new(HashMap::new()));
        let bindings: BindingMap = Arc::new(SyncMutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_responses = Arc::clone(&responses);
        let reader_bindings = Arc::clone(&bindings);
        let reader_closed = Arc::clone(&closed);
        tokio::spawn(async move {
            while let Some(msg) = rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        tracing::trace!("WS received: {}", text.chars().take(100).collect::<String>());
                        if route_message(&text, &reader_responses, &reader_bindings) {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::debug!("WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("WebSocket error: {:?}", e);
                        break;
                    }
                    _ => {}
                }
            }
            reader_closed.store(true, Ordering::SeqCst);
            // Dropping the senders fails every pending command and channel.
            reader_responses.lock().clear();
            reader_bindings.lock().clear();
        });

        tracing::debug!("CDP connection opened: {}", ws_url);
        Ok(Self {
            ws_tx: Mutex::new(tx),
            responses,
            bindings,
            msg_id: AtomicU64::new(1),
            closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a CDP command and wait for its `result`.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(FlowError::driver(format!(
                "{} failed: CDP connection is closed",
                method
            )));
        }

        let id = self.msg_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.responses.lock().insert(id, tx);

        let command = json!({ "id": id, "method": method, "params": params });
        {
            let mut sink = self.ws_tx.lock().await;
            if let Err(e) = sink.send(WsMessage::Text(command.to_string())).await {
                self.responses.lock().remove(&id);
                return Err(FlowError::driver(format!("Failed to send {}: {}", method, e)));
            }
        }

        let response = match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(FlowError::driver(format!(
                    "{} failed: connection closed",
                    method
                )))
            }
            Err(_) => {
                self.responses.lock().remove(&id);
                return Err(FlowError::Timeout {
                    what: format!("CDP {}", method),
                    timeout_ms: COMMAND_TIMEOUT.as_millis() as u64,
                });
            }
        };

        if let Some(err) = response.get("error") {
            let message = err
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(FlowError::driver(format!("{} failed: {}", method, message)));
        }

        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    fn register_binding(&self, name: &str) -> MessageReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.bindings.lock().insert(name.to_string(), tx);
        rx
    }

    fn unregister_binding(&self, name: &str) {
        self.bindings.lock().remove(name);
    }

    pub async fn close(&self) {
        let mut sink = self.ws_tx.lock().await;
        let _ = sink.close().await;
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Dispatch one inbound frame. Returns true when the target went away.
fn route_message(text: &str, responses: &ResponseMap, bindings: &BindingMap) -> bool {
    let Ok(json) = serde_json::from_str::<Value>(text) else {
        return false;
    };

    if let Some(id) = json.get("id").and_then(|i| i.as_u64()) {
        if let Some(sender) = responses.lock().remove(&id) {
            let _ = sender.send(json);
        }
        return false;
    }

    match json.get("method").and_then(|m| m.as_str()) {
        Some("Runtime.bindingCalled") => {
            let params = json.get("params").cloned().unwrap_or_default();
            let name = params.get("name").and_then(|n| n.as_str()).unwrap_or_default();
            let payload = params.get("payload").and_then(|p| p.as_str()).unwrap_or_default();
            let message = serde_json::from_str(payload)
                .unwrap_or_else(|_| Value::String(payload.to_string()));
            if let Some(tx) = bindings.lock().get(name) {
                let _ = tx.send(message);
            }
            false
        }
        Some("Inspector.detached") => true,
        _ => false,
    }
}

fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

fn single_expression(locator: &Locator) -> String {
    match locator {
        Locator::Css(s) => format!("document.querySelector({})", js_string(s)),
        Locator::XPath(s) => format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            js_string(s)
        ),
    }
}

fn all_expression(locator: &Locator) -> String {
    match locator {
        Locator::Css(s) => format!("Array.from(document.querySelectorAll({}))", js_string(s)),
        Locator::XPath(s) => format!(
            "(() => {{ const r = document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
             const out = []; for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); return out; }})()",
            js_string(s)
        ),
    }
}

fn exception_message(result: &Value) -> Option<String> {
    let details = result.get("exceptionDetails")?;
    let message = details
        .get("exception")
        .and_then(|e| e.get("description"))
        .and_then(|d| d.as_str())
        .or_else(|| details.get("text").and_then(|t| t.as_str()))
        .unwrap_or("script exception");
    Some(message.to_string())
}

/// A page target driven over CDP.
pub struct CdpPage {
    conn: CdpConnection,
    target_id: String,
    http_base: String,
    timings: DriverTimings,
    closed: AtomicBool,
}

impl CdpPage {
    /// Enable the domains the engine relies on for an already connected target.
    pub async fn attach(
        conn: CdpConnection,
        target_id: String,
        http_base: String,
        timings: DriverTimings,
    ) -> Result<Self> {
        conn.send("Page.enable", json!({})).await?;
        conn.send("Runtime.enable", json!({})).await?;
        tracing::info!("CDP page attached: {}", target_id);
        Ok(Self {
            conn,
            target_id,
            http_base,
            timings,
            closed: AtomicBool::new(false),
        })
    }

    pub async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.conn
            .send(
                "Emulation.setUserAgentOverride",
                json!({ "userAgent": user_agent }),
            )
            .await?;
        Ok(())
    }

    async fn eval(&self, expression: &str) -> Result<Value> {
        let result = self
            .conn
            .send(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        if let Some(message) = exception_message(&result) {
            return Err(FlowError::driver(message));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn eval_handle(&self, expression: &str) -> Result<Option<ElementHandle>> {
        let result = self
            .conn
            .send("Runtime.evaluate", json!({ "expression": expression }))
            .await?;
        if let Some(message) = exception_message(&result) {
            return Err(FlowError::driver(message));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("objectId"))
            .and_then(|id| id.as_str())
            .map(ElementHandle::new))
    }

    async fn eval_handles(&self, expression: &str) -> Result<Vec<ElementHandle>> {
        match self.eval_handle(expression).await? {
            Some(array) => self.array_elements(array).await,
            None => Ok(Vec::new()),
        }
    }

    async fn call(&self, element: &ElementHandle, function: &str, args: Vec<Value>) -> Result<Value> {
        let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
        let result = self
            .conn
            .send(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": element.id(),
                    "functionDeclaration": function,
                    "arguments": arguments,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        if let Some(message) = exception_message(&result) {
            return Err(FlowError::driver(message));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn call_handles(
        &self,
        element: &ElementHandle,
        function: &str,
        args: Vec<Value>,
    ) -> Result<Vec<ElementHandle>> {
        let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
        let result = self
            .conn
            .send(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": element.id(),
                    "functionDeclaration": function,
                    "arguments": arguments
                }),
            )
            .await?;
        if let Some(message) = exception_message(&result) {
            return Err(FlowError::driver(message));
        }
        match result
            .get("result")
            .and_then(|r| r.get("objectId"))
            .and_then(|id| id.as_str())
        {
            Some(id) => self.array_elements(ElementHandle::new(id)).await,
            None => Ok(Vec::new()),
        }
    }

    /// Expand a remote array object into handles for its elements, in index order.
    async fn array_elements(&self, array: ElementHandle) -> Result<Vec<ElementHandle>> {
        let props = self
            .conn
            .send(
                "Runtime.getProperties",
                json!({ "objectId": array.id(), "ownProperties": true }),
            )
            .await?;

        let mut indexed: Vec<(usize, ElementHandle)> = props
            .get("result")
            .and_then(|r| r.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| {
                        let index = p.get("name")?.as_str()?.parse::<usize>().ok()?;
                        let id = p.get("value")?.get("objectId")?.as_str()?;
                        Some((index, ElementHandle::new(id)))
                    })
                    .collect()
            })
            .unwrap_or_default();
        indexed.sort_by_key(|(i, _)| *i);

        let _ = self
            .conn
            .send("Runtime.releaseObject", json!({ "objectId": array.id() }))
            .await;
        Ok(indexed.into_iter().map(|(_, h)| h).collect())
    }

    /// Viewport coordinates of the element's center, after scrolling it into view.
    async fn element_center(&self, element: &ElementHandle) -> Result<(f64, f64)> {
        let rect = self
            .call(
                element,
                "function() { \
                   if (this.scrollIntoViewIfNeeded) { this.scrollIntoViewIfNeeded(true); } \
                   else { this.scrollIntoView({ block: 'center' }); } \
                   const r = this.getBoundingClientRect(); \
                   return { x: r.left + r.width / 2, y: r.top + r.height / 2, w: r.width, h: r.height }; }",
                vec![],
            )
            .await?;
        let w = rect.get("w").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let h = rect.get("h").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if w == 0.0 && h == 0.0 {
            return Err(FlowError::driver("Element has no visible box"));
        }
        let x = rect.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let y = rect.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok((x, y))
    }

    async fn mouse_event(&self, kind: &str, x: f64, y: f64) -> Result<()> {
        let mut params = json!({ "type": kind, "x": x, "y": y });
        if kind != "mouseMoved" {
            params["button"] = json!("left");
            params["clickCount"] = json!(1);
        }
        self.conn.send("Input.dispatchMouseEvent", params).await?;
        Ok(())
    }

    async fn dispatch_key(
        &self,
        kind: &str,
        def: &KeyDefinition,
        modifiers: i64,
        with_text: bool,
    ) -> Result<()> {
        let mut params = json!({
            "type": kind,
            "key": def.key,
            "code": def.code,
            "windowsVirtualKeyCode": def.key_code,
            "nativeVirtualKeyCode": def.key_code,
            "modifiers": modifiers
        });
        if with_text {
            if let Some(text) = &def.text {
                params["text"] = json!(text);
                params["unmodifiedText"] = json!(text);
            }
        }
        self.conn.send("Input.dispatchKeyEvent", params).await?;
        Ok(())
    }

    async fn type_chars(&self, text: &str, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            self.conn
                .send("Input.insertText", json!({ "text": text }))
                .await?;
            return Ok(());
        }
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            let def = keys::key_definition(ch.encode_utf8(&mut buf));
            self.dispatch_key("keyDown", &def, 0, true).await?;
            self.dispatch_key("keyUp", &def, 0, false).await?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn navigate_history(&self, delta: i64) -> Result<()> {
        let history = self
            .conn
            .send("Page.getNavigationHistory", json!({}))
            .await?;
        let current = history.get("currentIndex").and_then(|v| v.as_i64()).unwrap_or(0);
        let entries = history
            .get("entries")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let target = current + delta;
        if target < 0 || target as usize >= entries.len() {
            tracing::debug!("No history entry at offset {}", delta);
            return Ok(());
        }
        let entry_id = entries[target as usize]
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| FlowError::driver("History entry without id"))?;
        self.conn
            .send("Page.navigateToHistoryEntry", json!({ "entryId": entry_id }))
            .await?;
        self.wait_for_load_state(LoadState::Load, NAVIGATION_TIMEOUT).await
    }

    async fn capture(&self, options: &ScreenshotOptions, clip: Option<Value>) -> Result<Vec<u8>> {
        if options.omit_background {
            self.conn
                .send(
                    "Emulation.setDefaultBackgroundColorOverride",
                    json!({ "color": { "r": 0, "g": 0, "b": 0, "a": 0 } }),
                )
                .await?;
        }

        let mut params = json!({
            "format": match options.format { ImageFormat::Png => "png", ImageFormat::Jpeg => "jpeg" },
            "captureBeyondViewport": clip.is_some()
        });
        if options.format == ImageFormat::Jpeg {
            params["quality"] = json!(options.quality.unwrap_or(100));
        }
        if let Some(clip) = clip {
            params["clip"] = clip;
        }
        let result = self.conn.send("Page.captureScreenshot", params).await;

        if options.omit_background {
            let _ = self
                .conn
                .send("Emulation.setDefaultBackgroundColorOverride", json!({}))
                .await;
        }

        let data = result?
            .get("data")
            .and_then(|d| d.as_str())
            .map(str::to_string)
            .ok_or_else(|| FlowError::driver("Failed to capture screenshot"))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| FlowError::driver(format!("Invalid screenshot data: {}", e)))
    }
}

#[async_trait]
impl Page for CdpPage {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.conn.is_closed()
    }

    async fn url(&self) -> Result<String> {
        Ok(self
            .eval("window.location.href")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    async fn goto(&self, url: &str) -> Result<()> {
        let result = self.conn.send("Page.navigate", json!({ "url": url })).await?;
        if let Some(err) = result.get("errorText").and_then(|e| e.as_str()) {
            if !err.is_empty() {
                return Err(FlowError::driver(format!("Navigation to {} failed: {}", url, err)));
            }
        }
        self.wait_for_load_state(LoadState::Load, NAVIGATION_TIMEOUT).await?;
        tracing::info!("Navigated to: {}", url);
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        self.navigate_history(-1).await
    }

    async fn go_forward(&self) -> Result<()> {
        self.navigate_history(1).await
    }

    async fn reload(&self) -> Result<()> {
        self.conn.send("Page.reload", json!({})).await?;
        self.wait_for_load_state(LoadState::Load, NAVIGATION_TIMEOUT).await
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let url = format!("{}/json/close/{}", self.http_base, self.target_id);
        let result = reqwest::get(&url).await;
        self.conn.close().await;
        result.map_err(|e| FlowError::driver(format!("Failed to close page: {}", e)))?;
        tracing::info!("CDP page closed: {}", self.target_id);
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let snapshot = self
                .eval("({ state: document.readyState, resources: performance.getEntriesByType('resource').length })")
                .await?;
            let ready = snapshot.get("state").and_then(|s| s.as_str()).unwrap_or("loading");
            let now = Instant::now();

            let done = match state {
                LoadState::DomContentLoaded => ready != "loading",
                LoadState::Load => ready == "complete",
                LoadState::NetworkIdle => {
                    let count = snapshot.get("resources").and_then(|c| c.as_u64());
                    if ready != "complete" || last_count != count {
                        last_count = count;
                        quiet_since = now;
                        false
                    } else {
                        now.duration_since(quiet_since) >= self.timings.network_idle
                    }
                }
            };

            if done {
                return Ok(());
            }
            if now >= deadline {
                return Err(FlowError::Timeout {
                    what: format!("load state {:?}", state),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    async fn wait_for_url_change(&self, from: &str, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            let url = self.url().await?;
            if url != from {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(FlowError::Timeout {
                    what: format!("URL to change from {}", from),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    async fn wait_for_selector(
        &self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        let deadline = Instant::now() + timeout;
        let check = format!(
            "(() => {{ const el = {}; if (!el) return 'detached'; return ({})(el) ? 'visible' : 'hidden'; }})()",
            single_expression(locator),
            IS_VISIBLE_JS
        );

        loop {
            let status = self.eval(&check).await?;
            let status = status.as_str().unwrap_or("detached");
            let satisfied = match state {
                WaitState::Attached => status != "detached",
                WaitState::Detached => status == "detached",
                WaitState::Visible => status == "visible",
                WaitState::Hidden => status != "visible",
            };

            if satisfied {
                match state {
                    WaitState::Attached | WaitState::Visible => {
                        if let Some(handle) = self.query(locator).await? {
                            return Ok(Some(handle));
                        }
                    }
                    WaitState::Detached | WaitState::Hidden => return Ok(None),
                }
            }

            if Instant::now() >= deadline {
                return Err(FlowError::Timeout {
                    what: format!("{} to be {:?}", locator, state),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    async fn wait_for_element_state(
        &self,
        element: &ElementHandle,
        state: ElementState,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let ok = match state {
                ElementState::Visible => self.is_visible(element).await?,
                ElementState::Enabled => self.is_enabled(element).await?,
            };
            if ok {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FlowError::Timeout {
                    what: format!("element to be {:?}", state),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }

    async fn query(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        self.eval_handle(&single_expression(locator)).await
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        self.eval_handles(&all_expression(locator)).await
    }

    async fn query_within(&self, parent: &ElementHandle, css: &str) -> Result<Vec<ElementHandle>> {
        self.call_handles(
            parent,
            "function(sel) { return Array.from(this.querySelectorAll(sel)); }",
            vec![json!(css)],
        )
        .await
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool> {
        let function = format!("function() {{ return ({})(this); }}", IS_VISIBLE_JS);
        Ok(self.call(element, &function, vec![]).await?.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool> {
        Ok(self
            .call(element, IS_ENABLED_JS, vec![])
            .await?
            .as_bool()
            .unwrap_or(false))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let (x, y) = self.element_center(element).await?;
        self.mouse_event("mouseMoved", x, y).await?;
        self.mouse_event("mousePressed", x, y).await?;
        self.mouse_event("mouseReleased", x, y).await?;
        tracing::debug!("Clicked element at ({}, {})", x, y);
        Ok(())
    }

    async fn hover(&self, element: &ElementHandle) -> Result<()> {
        let (x, y) = self.element_center(element).await?;
        self.mouse_event("mouseMoved", x, y).await
    }

    async fn focus(&self, element: &ElementHandle) -> Result<()> {
        self.call(element, "function() { this.focus(); }", vec![]).await?;
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        if text.is_empty() {
            return self.clear_value(element).await;
        }
        self.call(
            element,
            "function() { \
               this.focus(); \
               if (typeof this.select === 'function') { this.select(); } \
               else if (this.isContentEditable) { \
                 const range = document.createRange(); range.selectNodeContents(this); \
                 const sel = window.getSelection(); sel.removeAllRanges(); sel.addRange(range); } }",
            vec![],
        )
        .await?;
        self.conn
            .send("Input.insertText", json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn type_text(&self, element: &ElementHandle, text: &str, delay: Duration) -> Result<()> {
        self.focus(element).await?;
        self.type_chars(text, delay).await
    }

    async fn clear_value(&self, element: &ElementHandle) -> Result<()> {
        self.call(
            element,
            "function() { \
               this.value = ''; \
               this.dispatchEvent(new Event('input', { bubbles: true })); \
               this.dispatchEvent(new Event('change', { bubbles: true })); }",
            vec![],
        )
        .await?;
        Ok(())
    }

    async fn input_value(&self, element: &ElementHandle) -> Result<String> {
        let value = self
            .call(
                element,
                "function() { return 'value' in this ? String(this.value) : (this.textContent || ''); }",
                vec![],
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn scroll_into_view(&self, element: &ElementHandle, smooth: bool) -> Result<()> {
        self.call(
            element,
            "function(smooth) { this.scrollIntoView({ block: 'center', inline: 'nearest', behavior: smooth ? 'smooth' : 'auto' }); }",
            vec![json!(smooth)],
        )
        .await?;
        Ok(())
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<Option<String>> {
        let value = self
            .call(element, "function() { return this.textContent; }", vec![])
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let value = self
            .call(
                element,
                "function(name) { return this.getAttribute(name); }",
                vec![json!(name)],
            )
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn inner_html(&self, element: &ElementHandle) -> Result<String> {
        let value = self
            .call(element, "function() { return this.innerHTML; }", vec![])
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn press_key(&self, combo: &str) -> Result<()> {
        let (mods, key) = keys::split_combo(combo);
        let mut modifiers = 0;
        for m in &mods {
            modifiers |= keys::modifier_bit(m).unwrap_or(0);
            self.dispatch_key("rawKeyDown", &keys::key_definition(m), modifiers, false)
                .await?;
        }

        let def = keys::key_definition(key);
        let with_text = modifiers & (MOD_CONTROL | MOD_META | MOD_ALT) == 0 && def.text.is_some();
        let down = if with_text { "keyDown" } else { "rawKeyDown" };
        self.dispatch_key(down, &def, modifiers, with_text).await?;
        self.dispatch_key("keyUp", &def, modifiers, false).await?;

        for m in mods.iter().rev() {
            modifiers &= !keys::modifier_bit(m).unwrap_or(0);
            self.dispatch_key("keyUp", &keys::key_definition(m), modifiers, false)
                .await?;
        }

        tracing::debug!("Pressed key: {}", combo);
        Ok(())
    }

    async fn keyboard_type(&self, text: &str, delay: Duration) -> Result<()> {
        self.type_chars(text, delay).await
    }

    async fn mouse_move(&self, x: f64, y: f64) -> Result<()> {
        self.mouse_event("mouseMoved", x, y).await
    }

    async fn scroll_to(&self, target: ScrollTarget, smooth: bool) -> Result<()> {
        let behavior = if smooth { "smooth" } else { "auto" };
        let expression = match target {
            ScrollTarget::Top => format!("window.scrollTo({{ top: 0, behavior: '{}' }})", behavior),
            ScrollTarget::Bottom => format!(
                "window.scrollTo({{ top: document.documentElement.scrollHeight, behavior: '{}' }})",
                behavior
            ),
            ScrollTarget::Position { x, y } => format!(
                "window.scrollTo({{ left: {}, top: {}, behavior: '{}' }})",
                x, y, behavior
            ),
        };
        self.eval(&expression).await?;
        Ok(())
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>> {
        if !options.full_page {
            return self.capture(options, None).await;
        }
        let metrics = self.conn.send("Page.getLayoutMetrics", json!({})).await?;
        let size = metrics
            .get("cssContentSize")
            .or_else(|| metrics.get("contentSize"))
            .cloned()
            .unwrap_or_default();
        let width = size.get("width").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let height = size.get("height").and_then(|v| v.as_f64()).unwrap_or(0.0);
        let clip = json!({ "x": 0, "y": 0, "width": width, "height": height, "scale": 1 });
        self.capture(options, Some(clip)).await
    }

    async fn element_screenshot(
        &self,
        element: &ElementHandle,
        options: &ScreenshotOptions,
    ) -> Result<Vec<u8>> {
        self.scroll_into_view(element, false).await?;
        let rect = self
            .call(
                element,
                "function() { const r = this.getBoundingClientRect(); \
                   return { x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }; }",
                vec![],
            )
            .await?;
        let mut clip = rect;
        clip["scale"] = json!(1);
        self.capture(options, Some(clip)).await
    }

    async fn set_viewport(&self, width: u32, height: u32) -> Result<()> {
        self.conn
            .send(
                "Emulation.setDeviceMetricsOverride",
                json!({ "width": width, "height": height, "deviceScaleFactor": 1, "mobile": false }),
            )
            .await?;
        Ok(())
    }

    async fn set_extra_http_headers(&self, headers: &HashMap<String, String>) -> Result<()> {
        self.conn.send("Network.enable", json!({})).await?;
        self.conn
            .send("Network.setExtraHTTPHeaders", json!({ "headers": headers }))
            .await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        self.eval(script).await
    }

    async fn open_channel(&self, name: &str) -> Result<MessageReceiver> {
        let rx = self.conn.register_binding(name);
        if let Err(e) = self
            .conn
            .send("Runtime.addBinding", json!({ "name": name }))
            .await
        {
            self.conn.unregister_binding(name);
            return Err(e);
        }
        Ok(rx)
    }

    async fn close_channel(&self, name: &str) -> Result<()> {
        self.conn.unregister_binding(name);
        self.conn
            .send("Runtime.removeBinding", json!({ "name": name }))
            .await?;
        Ok(())
    }
}
