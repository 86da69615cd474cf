//! Chrome over CDP via chromiumoxide

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use dashprobe_common::StepError;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::BrowserSettings;
use crate::driver::{resolve_target, BrowserDriver, DriverFactory, Locator, WaitCondition};

/// Map a CDP error message onto the step error taxonomy
pub fn classify_cdp_error(message: &str) -> StepError {
    let lower = message.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if any(&["timeout", "timed out"]) {
        StepError::timeout(message)
    } else if any(&["detached", "stale", "no node with given id", "cannot find context"]) {
        StepError::stale_element(message)
    } else if any(&["could not find node", "not found", "no node"]) {
        StepError::element_not_found(message)
    } else if any(&["not interactable", "box model", "not clickable", "scroll", "not focusable"]) {
        StepError::not_interactable(message)
    } else {
        StepError::driver_unavailable(message)
    }
}

fn cdp_error(context: &str, err: impl std::fmt::Display) -> StepError {
    let message = err.to_string();
    let mut classified = classify_cdp_error(&message);
    classified.message = format!("{}: {}", context, message);
    classified
}

/// Launches headless (or headed) Chrome with the configured settings
pub struct ChromiumLauncher {
    settings: BrowserSettings,
}

impl ChromiumLauncher {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, StepError> {
        let s = &self.settings;
        let mut builder = BrowserConfig::builder()
            .window_size(s.window_width, s.window_height)
            .viewport(Viewport {
                width: s.window_width,
                height: s.window_height,
                ..Viewport::default()
            })
            .request_timeout(s.page_load_timeout())
            .arg("--disable-extensions")
            .arg("--allow-running-insecure-content");

        if !s.headless {
            builder = builder.with_head();
        }
        if s.no_sandbox {
            builder = builder.no_sandbox().arg("--disable-dev-shm-usage");
        }

        if let Some(exe) = &s.chrome_executable {
            builder = builder.chrome_executable(exe);
        } else if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
            info!("Using custom Chrome binary: {}", chrome_bin);
            builder = builder.chrome_executable(chrome_bin);
        }

        builder.build().map_err(|e| {
            StepError::driver_unavailable(format!("invalid browser configuration: {}", e))
        })
    }
}

#[async_trait]
impl DriverFactory for ChromiumLauncher {
    type Driver = ChromiumDriver;

    async fn launch(&self) -> Result<ChromiumDriver, StepError> {
        let config = self.browser_config()?;
        info!(
            "Launching Chrome ({}, {}x{})",
            if self.settings.headless { "headless" } else { "headed" },
            self.settings.window_width,
            self.settings.window_height
        );

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| StepError::driver_unavailable(format!("failed to launch Chrome: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            debug!("Browser handler task ended");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(cdp_error("failed to create page", e));
            }
        };

        let download_dir = self.settings.download_dir();
        if let Err(e) = allow_downloads(&page, &download_dir).await {
            warn!("Downloads may land elsewhere: {}", e);
        }

        Ok(ChromiumDriver {
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            page,
            base: Mutex::new(String::new()),
            poll: self.settings.poll_interval(),
            page_load_timeout: self.settings.page_load_timeout(),
        })
    }
}

async fn allow_downloads(page: &Page, dir: &Path) -> Result<(), StepError> {
    std::fs::create_dir_all(dir)?;
    let params = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(dir.display().to_string())
        .build()
        .map_err(StepError::driver_unavailable)?;
    page.execute(params)
        .await
        .map_err(|e| cdp_error("setDownloadBehavior", e))?;
    debug!("Downloads go to {}", dir.display());
    Ok(())
}

/// One Chrome process with a single page
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    page: Page,
    base: Mutex<String>,
    poll: Duration,
    page_load_timeout: Duration,
}

impl ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<(), StepError> {
        debug!("Navigating to: {}", url);
        match timeout(self.page_load_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(cdp_error(&format!("navigation to {} failed", url), e)),
            Err(_) => Err(StepError::timeout(format!(
                "navigation to {} exceeded {:.0}s",
                url,
                self.page_load_timeout.as_secs_f64()
            ))),
        }
    }

    async fn eval_json(&self, script: String) -> Result<serde_json::Value, StepError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| cdp_error("script failed", e))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn find_once(&self, locator: &Locator) -> Result<Option<Element>, StepError> {
        let found = match locator {
            Locator::Css(selector) => self.page.find_element(selector.as_str()).await,
            Locator::XPath(expr) => self.page.find_xpath(expr.as_str()).await,
        };
        match found {
            Ok(element) => Ok(Some(element)),
            Err(e) => {
                let err = cdp_error(&locator.to_string(), e);
                match err.kind {
                    dashprobe_common::ErrorKind::ElementNotFound => Ok(None),
                    _ => Err(err),
                }
            }
        }
    }

    async fn holds(&self, condition: &WaitCondition) -> Result<bool, StepError> {
        Ok(match condition {
            WaitCondition::DocumentReady => {
                self.eval_json("document.readyState".to_string())
                    .await?
                    .as_str()
                    == Some("complete")
            }
            WaitCondition::Present(locator) => self.count(locator).await? > 0,
            WaitCondition::Absent(locator) => self.count(locator).await? == 0,
            WaitCondition::TitleContains(text) => self.title().await?.contains(text.as_str()),
        })
    }
}

fn count_script(locator: &Locator) -> Result<String, StepError> {
    let quote = |s: &str| {
        serde_json::to_string(s).map_err(|e| StepError::driver_unavailable(e.to_string()))
    };
    Ok(match locator {
        Locator::Css(selector) => {
            format!("document.querySelectorAll({}).length", quote(selector)?)
        }
        Locator::XPath(expr) => format!(
            "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength",
            quote(expr)?
        ),
    })
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    type Element = Element;

    async fn open(&self, url: &str) -> Result<(), StepError> {
        *self.base.lock().await = url.to_string();
        self.goto(url).await
    }

    async fn navigate(&self, target: &str) -> Result<(), StepError> {
        let url = resolve_target(&self.base.lock().await, target);
        self.goto(&url).await
    }

    async fn find(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<Option<Element>, StepError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(element) = self.find_once(locator).await? {
                return Ok(Some(element));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(self.poll).await;
        }
    }

    async fn count(&self, locator: &Locator) -> Result<usize, StepError> {
        let value = self.eval_json(count_script(locator)?).await?;
        Ok(value.as_f64().unwrap_or(0.0).max(0.0) as usize)
    }

    async fn click(&self, element: &Element) -> Result<(), StepError> {
        element
            .click()
            .await
            .map_err(|e| cdp_error("click failed", e))?;
        Ok(())
    }

    async fn fill(&self, element: &Element, text: &str) -> Result<(), StepError> {
        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|e| cdp_error("clearing input failed", e))?;
        element
            .click()
            .await
            .map_err(|e| cdp_error("focusing input failed", e))?;
        element
            .type_str(text)
            .await
            .map_err(|e| cdp_error("typing failed", e))?;
        Ok(())
    }

    async fn wait_until(
        &self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<(), StepError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.holds(condition).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(StepError::timeout(format!(
                    "{} not met within {:.1}s",
                    condition,
                    timeout.as_secs_f64()
                )));
            }
            sleep(self.poll).await;
        }
    }

    async fn title(&self) -> Result<String, StepError> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(|e| cdp_error("reading title failed", e))?
            .unwrap_or_default())
    }

    async fn page_source(&self) -> Result<String, StepError> {
        self.page
            .content()
            .await
            .map_err(|e| cdp_error("reading page source failed", e))
    }

    async fn snapshot(&self) -> Result<Vec<u8>, StepError> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| cdp_error("screenshot failed", e))
    }

    async fn close(&self) -> Result<(), StepError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };
        debug!("Closing browser");
        let closed = browser.close().await;
        let _ = browser.wait().await;
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        closed
            .map(|_| ())
            .map_err(|e| cdp_error("closing browser failed", e))
    }
}
