use crate::config::AppConfig;
use crate::controller::FlowController;
use crate::driver::{BrowserLauncher, ChromeLauncher};
use crate::flow::EventBus;
use parking_lot::RwLock;
use std::sync::Arc;

/// Application global state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub controller: Arc<FlowController>,
    /// Run events fanned out to WebSocket clients
    pub events: EventBus,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self::with_launcher(config, Arc::new(ChromeLauncher::new()))
    }

    pub fn with_launcher(config: AppConfig, launcher: Arc<dyn BrowserLauncher>) -> Self {
        let config = Arc::new(RwLock::new(config));
        let events = EventBus::new();
        let controller = FlowController::new(Arc::clone(&config), launcher, events.clone());
        Self::from_parts(config, controller)
    }

    /// Wrap an already configured controller; its event bus becomes the app's.
    pub fn from_parts(config: Arc<RwLock<AppConfig>>, controller: FlowController) -> Self {
        let events = controller.events().clone();
        Self {
            config,
            controller: Arc::new(controller),
            events,
        }
    }
}
