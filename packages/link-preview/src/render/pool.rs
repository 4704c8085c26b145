//! Lazily-started shared browser engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::CloseParams;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::types::config::RenderConfig;

/// A launched browser plus the task driving its CDP connection.
pub struct LiveBrowser {
    browser: Browser,
    alive: Arc<AtomicBool>,
    handler: JoinHandle<()>,
}

impl LiveBrowser {
    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    /// False once the CDP connection has closed (crash or shutdown).
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Drop for LiveBrowser {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

enum PoolState {
    Idle,
    Running(Arc<LiveBrowser>),
    /// Launch failed; the fallback stays disabled for the rest of the run.
    Failed(String),
}

/// Owns at most one browser process, started on first use.
///
/// Every render acquires the shared browser and opens its own isolated
/// context. A failed launch is remembered and reported as
/// [`RenderError::Unavailable`] without retrying; a browser whose connection
/// drops is discarded and relaunched on the next acquire.
pub struct BrowserPool {
    config: RenderConfig,
    state: Mutex<PoolState>,
}

impl BrowserPool {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            state: Mutex::new(PoolState::Idle),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Shared browser, launching it if needed.
    pub async fn acquire(&self) -> Result<Arc<LiveBrowser>, RenderError> {
        let mut state = self.state.lock().await;

        match &*state {
            PoolState::Failed(reason) => return Err(RenderError::Unavailable(reason.clone())),
            PoolState::Running(live) if live.is_alive() => return Ok(live.clone()),
            PoolState::Running(_) => {
                warn!("Browser connection lost, relaunching");
            }
            PoolState::Idle => {}
        }

        match self.launch().await {
            Ok(live) => {
                let live = Arc::new(live);
                *state = PoolState::Running(live.clone());
                Ok(live)
            }
            Err(reason) => {
                warn!(error = %reason, "Browser launch failed, rendering fallback disabled");
                *state = PoolState::Failed(reason.clone());
                Err(RenderError::Unavailable(reason))
            }
        }
    }

    /// Whether a previous launch failed.
    pub async fn is_disabled(&self) -> bool {
        matches!(&*self.state.lock().await, PoolState::Failed(_))
    }

    /// Close the browser if one is running. Later acquires relaunch.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let PoolState::Running(live) = std::mem::replace(&mut *state, PoolState::Idle) {
            if live.is_alive() {
                if let Err(e) = live.browser.execute(CloseParams::default()).await {
                    debug!(error = %e, "Browser close command failed");
                }
            }
            info!("Browser shut down");
        }
    }

    async fn launch(&self) -> Result<LiveBrowser, String> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.config.viewport_width, self.config.viewport_height)
            .request_timeout(self.config.navigation_timeout)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--mute-audio");

        if self.config.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.config.chrome_executable {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder.build()?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| e.to_string())?;

        let alive = Arc::new(AtomicBool::new(true));
        let flag = alive.clone();
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler error");
                }
            }
            flag.store(false, Ordering::SeqCst);
            debug!("Browser handler stream ended");
        });

        info!("Browser launched");
        Ok(LiveBrowser {
            browser,
            alive,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failed_launch_disables_pool() {
        let config = RenderConfig::default()
            .with_chrome_executable("/nonexistent/chrome-binary-for-tests");
        let pool = BrowserPool::new(config);

        let first = pool.acquire().await;
        assert!(matches!(first, Err(RenderError::Unavailable(_))));
        assert!(pool.is_disabled().await);

        // Not retried.
        let second = pool.acquire().await;
        assert!(matches!(second, Err(RenderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_shutdown_without_browser_is_noop() {
        let pool = BrowserPool::new(RenderConfig::default());
        pool.shutdown().await;
        assert!(!pool.is_disabled().await);
    }
}
