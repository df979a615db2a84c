use crate::config::validate_chrome_path;
use crate::driver::cdp::{CdpConnection, CdpPage};
use crate::driver::port::allocate_cdp_port;
use crate::driver::{Browser, BrowserLauncher, DriverTimings, LaunchOptions, Page, PageOptions};
use crate::error::{FlowError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

const MAX_RETRIES: u32 = 30;
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Build Chrome launch command with remote debugging enabled
pub fn build_command(options: &LaunchOptions, user_data_dir: &Path, cdp_port: u16) -> Command {
    let mut cmd = Command::new(&options.chrome_path);

    cmd.arg(format!("--user-data-dir={}", user_data_dir.display()));
    cmd.arg(format!("--remote-debugging-port={}", cdp_port));

    if options.headless {
        cmd.arg("--headless=new");
        cmd.arg("--disable-gpu");
    }

    cmd.arg("--no-first-run");
    cmd.arg("--no-default-browser-check");
    cmd.arg("--disable-background-networking");
    cmd.arg("--disable-sync");

    for arg in &options.extra_args {
        cmd.arg(arg);
    }

    cmd.arg("about:blank");
    cmd.stdout(Stdio::null()).stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // New process group so terminal signals aimed at us do not hit Chrome
        unsafe {
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
    }

    cmd
}

/// Launches a local Chrome and talks to it over the DevTools HTTP and WebSocket endpoints.
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn Browser>> {
        validate_chrome_path(&options.chrome_path)?;

        let cdp_port = allocate_cdp_port();
        let (user_data_dir, temp_dir) = match &options.user_data_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let dir = std::env::temp_dir()
                    .join(format!("flowrunner-{}", uuid::Uuid::new_v4()));
                (dir.clone(), Some(dir))
            }
        };
        std::fs::create_dir_all(&user_data_dir)?;

        let child = build_command(options, &user_data_dir, cdp_port)
            .spawn()
            .map_err(|e| FlowError::driver(format!("Failed to launch Chrome: {}", e)))?;
        tracing::info!("Chrome launched (pid {}) on CDP port {}", child.id(), cdp_port);

        let browser = ChromeBrowser {
            http_base: format!("http://127.0.0.1:{}", cdp_port),
            child: Mutex::new(Some(child)),
            temp_dir,
            timings: options.timings,
        };

        let mut last_error = String::new();
        for retry in 1..=MAX_RETRIES {
            tokio::time::sleep(RETRY_INTERVAL).await;
            match browser.version().await {
                Ok(version) => {
                    tracing::info!("Connected to {}", version);
                    return Ok(Arc::new(browser));
                }
                Err(e) => last_error = e.to_string(),
            }
            if !browser.child_alive() {
                last_error = "Chrome exited during startup".to_string();
                break;
            }
            tracing::debug!("Retry {}/{}: {}", retry, MAX_RETRIES, last_error);
        }

        let _ = browser.close().await;
        Err(FlowError::driver(format!(
            "Failed to connect to Chrome after {} retries: {}",
            MAX_RETRIES, last_error
        )))
    }
}

pub struct ChromeBrowser {
    http_base: String,
    child: Mutex<Option<Child>>,
    temp_dir: Option<PathBuf>,
    timings: DriverTimings,
}

impl ChromeBrowser {
    async fn version(&self) -> Result<String> {
        let url = format!("{}/json/version", self.http_base);
        let response = reqwest::get(&url)
            .await
            .map_err(|e| FlowError::driver(format!("Connection error: {}", e)))?;
        if !response.status().is_success() {
            return Err(FlowError::driver(format!("HTTP error: {}", response.status())));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FlowError::driver(format!("Failed to parse version response: {}", e)))?;
        Ok(body
            .get("Browser")
            .and_then(|v| v.as_str())
            .unwrap_or("Chrome")
            .to_string())
    }

    fn child_alive(&self) -> bool {
        match self.child.lock().as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.kill();
            let _ = child.wait();
            tracing::info!("Chrome process {} stopped", child.id());
        }
        if let Some(dir) = &self.temp_dir {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::debug!("Failed to remove {:?}: {}", dir, e);
            }
        }
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn is_connected(&self) -> bool {
        self.child_alive() && self.version().await.is_ok()
    }

    async fn new_page(&self, options: &PageOptions) -> Result<Arc<dyn Page>> {
        let url = format!("{}/json/new?about:blank", self.http_base);
        let target: serde_json::Value = reqwest::Client::new()
            .put(&url)
            .send()
            .await
            .map_err(|e| FlowError::driver(format!("Failed to open tab: {}", e)))?
            .json()
            .await
            .map_err(|e| FlowError::driver(format!("Failed to parse new tab response: {}", e)))?;

        let target_id = target
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FlowError::driver("No id in new tab response"))?
            .to_string();
        let ws_url = target
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| FlowError::driver("No webSocketDebuggerUrl in page target"))?;

        tracing::info!("Connecting to page target WebSocket: {}", ws_url);
        let conn = CdpConnection::connect(ws_url).await?;
        let page = CdpPage::attach(conn, target_id, self.http_base.clone(), self.timings).await?;

        if let Some((width, height)) = options.viewport {
            page.set_viewport(width, height).await?;
        }
        if let Some(user_agent) = &options.user_agent {
            page.set_user_agent(user_agent).await?;
        }

        Ok(Arc::new(page))
    }

    async fn close(&self) -> Result<()> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for ChromeBrowser {
    fn drop(&mut self) {
        self.shutdown();
    }
}
