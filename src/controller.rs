//! Owns the browser and page, and runs flows against them one at a time.

use crate::config::AppConfig;
use crate::driver::{Browser, BrowserLauncher, LaunchOptions, Page, PageOptions};
use crate::error::{FlowError, Result};
use crate::flow::events::{EventBus, RunEvent, RunStatus};
use crate::flow::handlers::extract::extract_filtered;
use crate::flow::handlers::Session;
use crate::flow::schema::{ExtractProps, FlowNode, FlowTree};
use crate::flow::{Interpreter, Lifecycle, RunContext};
use crate::picker::{ElementPicker, PickedSelector, SelectorPicker};
use crate::recording::{Recorder, Recording, RecordingInfo};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How long `stop_flow` lets an active picker session disarm before tearing down.
const PICKER_RELEASE_WAIT: Duration = Duration::from_secs(2);

/// Outcome of one `start_flow` call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub variables: HashMap<String, Value>,
    pub loop_index: Option<usize>,
    /// Selectors the picker produced, keyed by node id, for the editor to persist
    pub picked_selectors: HashMap<String, PickedSelector>,
    pub duration_ms: u64,
}

impl RunReport {
    fn skipped() -> Self {
        Self {
            run_id: None,
            status: RunStatus::Skipped,
            variables: HashMap::new(),
            loop_index: None,
            picked_selectors: HashMap::new(),
            duration_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ControllerStatus {
    pub running: bool,
    pub picker_active: bool,
    pub recording: bool,
    pub browser_open: bool,
}

#[derive(Default)]
struct Resources {
    browser: Option<Arc<dyn Browser>>,
    page: Option<Arc<dyn Page>>,
}

pub struct FlowController {
    config: Arc<RwLock<AppConfig>>,
    launcher: Arc<dyn BrowserLauncher>,
    picker: Arc<dyn SelectorPicker>,
    recorder: Recorder,
    resources: tokio::sync::Mutex<Resources>,
    lifecycle: Lifecycle,
    events: EventBus,
    run_cancel: Mutex<CancellationToken>,
    picker_cancel: Mutex<Option<CancellationToken>>,
    last_variables: Mutex<HashMap<String, Value>>,
}

impl FlowController {
    pub fn new(
        config: Arc<RwLock<AppConfig>>,
        launcher: Arc<dyn BrowserLauncher>,
        events: EventBus,
    ) -> Self {
        let lifecycle = Lifecycle::new();
        let picker_timeout = config.read().run.picker_timeout();
        let picker = Arc::new(ElementPicker::new(
            lifecycle.clone(),
            picker_timeout,
            events.clone(),
        ));
        Self {
            config,
            launcher,
            picker,
            recorder: Recorder::new(events.clone()),
            resources: tokio::sync::Mutex::new(Resources::default()),
            lifecycle,
            events,
            run_cancel: Mutex::new(CancellationToken::new()),
            picker_cancel: Mutex::new(None),
            last_variables: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the element picker, e.g. with a scripted one.
    pub fn with_picker(mut self, picker: Arc<dyn SelectorPicker>) -> Self {
        self.picker = picker;
        self
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run `nodes` to completion. A call while another run is active returns a
    /// `Skipped` report without touching anything.
    pub async fn start_flow(&self, nodes: Vec<FlowNode>) -> Result<RunReport> {
        let Some(_ticket) = self.lifecycle.try_start() else {
            tracing::info!("Flow already running, ignoring start request");
            return Ok(RunReport::skipped());
        };
        if self.lifecycle.is_recording() {
            return Err(FlowError::RecordingInProgress);
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let tree = match FlowTree::parse(&nodes) {
            Ok(tree) => tree,
            Err(e) => return Err(self.fail_run(&run_id, e).await),
        };
        let started = Instant::now();

        let cancel = CancellationToken::new();
        *self.run_cancel.lock() = cancel.clone();
        let settings = self.config.read().run.clone();

        tracing::info!("Starting flow run {} with {} nodes", run_id, tree.len());
        self.events.emit(RunEvent::RunStarted {
            run_id: run_id.clone(),
            node_count: tree.len(),
        });

        let page = match self.ensure_page().await {
            Ok(page) => page,
            Err(e) => return Err(self.fail_run(&run_id, e).await),
        };

        let mut ctx = RunContext::new(cancel);
        let session = Session::new(page, settings, Arc::clone(&self.picker));
        let mut interpreter = Interpreter::new(session).with_events(self.events.clone(), &run_id);
        let result = interpreter.run(&tree, &mut ctx).await;
        let page_closed = interpreter.session().page().is_err();

        *self.last_variables.lock() = ctx.variables.clone();

        let status = match result {
            Ok(()) if ctx.is_cancelled() => RunStatus::Cancelled,
            Ok(()) => {
                if page_closed {
                    self.resources.lock().await.page = None;
                }
                RunStatus::Completed
            }
            Err(e) if ctx.is_cancelled() => {
                tracing::info!("Flow run {} interrupted by stop: {}", run_id, e);
                RunStatus::Cancelled
            }
            Err(e) => return Err(self.fail_run(&run_id, e).await),
        };

        tracing::info!("Flow run {} finished: {:?}", run_id, status);
        self.events.emit(RunEvent::RunFinished {
            run_id: run_id.clone(),
            status,
            error: None,
        });

        Ok(RunReport {
            run_id: Some(run_id),
            status,
            variables: ctx.variables,
            loop_index: ctx.loop_index,
            picked_selectors: ctx.picked_selectors,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn fail_run(&self, run_id: &str, error: FlowError) -> FlowError {
        tracing::error!("Flow run {} failed: {}", run_id, error);
        self.stop_flow().await;
        self.events.emit(RunEvent::RunFinished {
            run_id: run_id.to_string(),
            status: RunStatus::Failed,
            error: Some(error.to_string()),
        });
        error
    }

    /// Cancel the active run, any picker session and any recording, then close page
    /// and browser. A recording ended this way is discarded.
    pub async fn stop_flow(&self) {
        self.run_cancel.lock().cancel();
        if let Some(token) = self.picker_cancel.lock().clone() {
            token.cancel();
        }
        if self.recorder.is_active() {
            match self.recorder.stop().await {
                Ok(recording) => tracing::info!(
                    "Discarded recording {} with {} nodes",
                    recording.id,
                    recording.nodes.len()
                ),
                Err(e) => tracing::debug!("No recording to discard: {}", e),
            }
        }

        let deadline = Instant::now() + PICKER_RELEASE_WAIT;
        while self.lifecycle.is_picker_active() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut resources = self.resources.lock().await;
        if let Some(page) = resources.page.take() {
            if let Err(e) = page.close().await {
                tracing::warn!("Failed to close page: {}", e);
            }
        }
        if let Some(browser) = resources.browser.take() {
            if let Err(e) = browser.close().await {
                tracing::warn!("Failed to close browser: {}", e);
            }
        }
        tracing::info!("Flow stopped, browser closed");
    }

    /// Let the user click an element on the current page and return its selector.
    pub async fn start_element_picker(&self) -> Result<PickedSelector> {
        if self.lifecycle.is_picker_active() {
            return Err(FlowError::PickerInProgress);
        }
        if self.lifecycle.is_recording() {
            return Err(FlowError::RecordingInProgress);
        }
        let page = self.ensure_page().await?;

        let token = CancellationToken::new();
        *self.picker_cancel.lock() = Some(token.clone());
        let result = self.picker.pick(&page, &token).await;
        self.picker_cancel.lock().take();
        result
    }

    /// Record the user's actions on the current page until [`FlowController::stop_recording`].
    pub async fn start_recording(&self) -> Result<RecordingInfo> {
        if self.lifecycle.is_recording() {
            return Err(FlowError::RecordingInProgress);
        }
        if self.lifecycle.is_running() {
            return Err(FlowError::FlowRunning);
        }
        if self.lifecycle.is_picker_active() {
            return Err(FlowError::PickerInProgress);
        }
        let page = self.ensure_page().await?;
        let lease = self.lifecycle.try_lock_for_recording()?;
        self.recorder.start(page, lease).await
    }

    /// Stop recording and return the nodes captured so far. The browser stays open.
    pub async fn stop_recording(&self) -> Result<Recording> {
        self.recorder.stop().await
    }

    /// Run an extract node's properties against the current page without storing
    /// anything. `${name}` placeholders resolve from the last run's variables.
    pub async fn preview_extraction(&self, properties: Value) -> Result<Value> {
        let props = ExtractProps::from_value(properties)?;
        let page = self
            .resources
            .lock()
            .await
            .page
            .clone()
            .filter(|p| !p.is_closed())
            .ok_or(FlowError::BrowserNotStarted)?;

        let mut ctx = RunContext::default();
        ctx.variables = self.last_variables.lock().clone();
        let timeout = self.config.read().run.default_timeout();
        extract_filtered(&page, &props, &ctx, timeout).await
    }

    /// Variables of the most recent run.
    pub fn variables(&self) -> HashMap<String, Value> {
        self.last_variables.lock().clone()
    }

    pub async fn status(&self) -> ControllerStatus {
        let browser_open = self
            .resources
            .lock()
            .await
            .page
            .as_ref()
            .is_some_and(|p| !p.is_closed());
        ControllerStatus {
            running: self.lifecycle.is_running(),
            picker_active: self.lifecycle.is_picker_active(),
            recording: self.lifecycle.is_recording(),
            browser_open,
        }
    }

    /// Reuse the live page, or launch/open whatever is missing.
    async fn ensure_page(&self) -> Result<Arc<dyn Page>> {
        let mut resources = self.resources.lock().await;

        let browser_alive = match &resources.browser {
            Some(browser) => browser.is_connected().await,
            None => false,
        };
        if browser_alive {
            if let Some(page) = resources.page.as_ref().filter(|p| !p.is_closed()) {
                return Ok(Arc::clone(page));
            }
        }

        self.lifecycle.ensure_page_replaceable()?;

        let (launch_options, page_options) = {
            let config = self.config.read();
            (
                LaunchOptions::from_config(&config),
                PageOptions {
                    viewport: config.browser.viewport(),
                    user_agent: config.browser.user_agent.clone(),
                },
            )
        };

        if !browser_alive {
            resources.page = None;
            if let Some(old) = resources.browser.take() {
                if let Err(e) = old.close().await {
                    tracing::warn!("Failed to close dead browser: {}", e);
                }
            }
            tracing::info!("Launching browser");
            resources.browser = Some(self.launcher.launch(&launch_options).await?);
        }

        let browser = resources
            .browser
            .clone()
            .ok_or(FlowError::BrowserNotStarted)?;
        let page = browser.new_page(&page_options).await?;
        resources.page = Some(Arc::clone(&page));
        Ok(page)
    }
}
