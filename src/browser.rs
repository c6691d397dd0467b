//! Scripted browser used to expand a profile's publication list.
//!
//! Scholar only renders the first page of publications; the rest appear
//! after clicking "Show more". `BrowserSession` is the small capability the
//! discovery step needs (open, click the reveal control, read the page) and
//! `ChromiumLauncher` provides it with a headless Chromium over CDP.

use crate::error::{Result, ScholarError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Environment variable pointing at a Chromium/Chrome binary
pub const CHROMIUM_PATH_VAR: &str = "GSPROFILE_CHROMIUM_PATH";

/// Locates the reveal control by id, by role and aria-label, or by its
/// visible text, then reports its state or clicks it.
const REVEAL_SCRIPT: &str = r#"(() => {
  const label = /show more/i;
  const candidates = [
    document.getElementById('gsc_bpf_more'),
    ...Array.from(document.querySelectorAll('[role="button"]'))
      .filter(e => label.test(e.getAttribute('aria-label') || '')),
    ...Array.from(document.querySelectorAll('button, span.gs_lbl'))
      .filter(e => label.test((e.textContent || '').trim())),
  ].filter(Boolean);
  if (candidates.length === 0) return 'missing';
  const control = candidates[0].closest('button') || candidates[0];
  if (control.disabled || control.hasAttribute('disabled')
      || control.getAttribute('aria-disabled') === 'true') return 'disabled';
  control.scrollIntoView({ block: 'center' });
  control.click();
  return 'clicked';
})()"#;

/// State of the reveal control after one activation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealOutcome {
    /// No control matched any heuristic
    Missing,
    /// Control present but disabled: everything is shown
    Disabled,
    /// Control was scrolled into view and clicked
    Clicked,
}

impl RevealOutcome {
    fn from_script(value: &str) -> Result<Self> {
        match value {
            "missing" => Ok(RevealOutcome::Missing),
            "disabled" => Ok(RevealOutcome::Disabled),
            "clicked" => Ok(RevealOutcome::Clicked),
            other => Err(ScholarError::Browser(format!(
                "Unexpected reveal script result: {}",
                other
            ))),
        }
    }
}

/// An open browser with one page
#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate to `url` and wait for the load to finish.
    async fn open(&mut self, url: &str) -> Result<()>;
    /// Locate the reveal control and activate it if it is enabled.
    async fn reveal_more(&mut self) -> Result<RevealOutcome>;
    /// Current serialized DOM.
    async fn page_source(&mut self) -> Result<String>;
    /// Tear the browser down. Called on every exit path.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// Find a Chromium binary: env override first, then the usual names on PATH.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(p) = std::env::var(CHROMIUM_PATH_VAR) {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    for name in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Headless Chromium launcher
pub struct ChromiumLauncher {
    proxy: Option<String>,
    page_timeout: Duration,
}

impl ChromiumLauncher {
    pub fn new(proxy: Option<String>, page_timeout: Duration) -> Self {
        Self {
            proxy,
            page_timeout,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let chrome_path = find_chromium().ok_or_else(|| {
            ScholarError::Browser(format!(
                "Chromium not found (set {} or install chromium)",
                CHROMIUM_PATH_VAR
            ))
        })?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .request_timeout(self.page_timeout)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--lang=en-US");

        if let Some(proxy) = &self.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        let config = builder
            .build()
            .map_err(|e| ScholarError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScholarError::Browser(format!("Failed to launch Chromium: {}", e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    debug!("Browser handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(ScholarError::Browser(format!("Failed to open page: {}", e)));
            }
        };

        info!("Launched headless Chromium");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            page_timeout: self.page_timeout,
        }))
    }
}

/// One Chromium process with a single page
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    page_timeout: Duration,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open(&mut self, url: &str) -> Result<()> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(self.page_timeout, navigation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ScholarError::Browser(format!("Navigation failed: {}", e))),
            Err(_) => Err(ScholarError::Browser(format!(
                "Navigation timed out after {}s",
                self.page_timeout.as_secs()
            ))),
        }
    }

    async fn reveal_more(&mut self) -> Result<RevealOutcome> {
        let value: String = self
            .page
            .evaluate(REVEAL_SCRIPT)
            .await
            .map_err(|e| ScholarError::Browser(format!("Reveal script failed: {}", e)))?
            .into_value()
            .map_err(|e| ScholarError::Browser(format!("Reveal script result: {:?}", e)))?;

        RevealOutcome::from_script(&value)
    }

    async fn page_source(&mut self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| ScholarError::Browser(format!("Failed to read page source: {}", e)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
            ..
        } = *self;

        let _ = page.close().await;
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler_task.abort();
        debug!("Closed Chromium");

        closed
            .map(|_| ())
            .map_err(|e| ScholarError::Browser(format!("Failed to close browser: {}", e)))
    }
}
