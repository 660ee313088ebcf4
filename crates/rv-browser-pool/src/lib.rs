// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process-wide pool of headless browser sessions.
//!
//! A [`BrowserPool`] bounds how many WebDriver sessions are live at once.
//! `acquire`/`release` manage that bound; [`Browser::new_context`] and
//! [`Context::new_page`] are cheap operations the caller drives on its own
//! schedule (§5: contexts and pages are short-lived, owned by the caller).
#![deny(unsafe_code)]
#![warn(missing_docs)]

use fantoccini::{Client, ClientBuilder, Locator};
use rv_error::{ErrorCode, RvError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, warn};

/// Script re-applied to every new context to blunt the most common
/// bot-detection checks. Platforms change their heuristics over time; this
/// is the baseline shim, not a guarantee.
const ANTI_DETECTION_SHIM: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
"#;

/// Configuration for a [`BrowserPool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrently held browser sessions.
    pub size: usize,
    /// WebDriver endpoint (e.g. a chromedriver/geckodriver instance).
    pub webdriver_url: String,
}

/// One pooled headless browser session.
///
/// Lives from `acquire` until `release`; the underlying WebDriver session
/// itself is only torn down by [`BrowserPool::cleanup`] or by an explicit
/// context rebuild (§4.7 session recovery), never by `release`.
pub struct Browser {
    id: String,
    client: Client,
}

impl Browser {
    /// Pool-assigned identifier, stable for the session's lifetime.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Open a fresh isolated context: a brand new WebDriver session with its
    /// own cookie jar, so scans in one context never see another's login
    /// state or consent cookies.
    pub async fn new_context(&self, webdriver_url: &str) -> Result<Context, RvError> {
        let client = connect(webdriver_url).await?;
        apply_anti_detection(&client).await?;
        Ok(Context {
            client,
            pages_opened: 0,
        })
    }

    async fn close(self) {
        if let Err(e) = self.client.close().await {
            warn!(browser_id = %self.id, error = %e, "error closing browser session (ignored)");
        }
    }
}

/// An isolated browsing context: one WebDriver session, rotated
/// independently of the pool slot that spawned it.
pub struct Context {
    client: Client,
    pages_opened: u64,
}

impl Context {
    /// Navigate the current page to `url` with the given wait condition.
    ///
    /// Defaults to waiting for `DOMContentLoaded`-equivalent readiness
    /// (fantoccini's `goto` blocks until the initial navigation completes);
    /// callers must not wait for network idle, since many target sites hold
    /// long-lived connections open indefinitely.
    pub async fn goto(&mut self, url: &str) -> Result<(), RvError> {
        self.client.goto(url).await.map_err(|e| {
            RvError::new(ErrorCode::NetworkError, e.to_string()).with_context("url", url)
        })
    }

    /// Return the current page's rendered HTML source.
    pub async fn html(&mut self) -> Result<String, RvError> {
        self.client
            .source()
            .await
            .map_err(|e| RvError::new(ErrorCode::ExtractionFailed, e.to_string()))
    }

    /// Return the current page's final URL (after any redirects).
    pub async fn current_url(&mut self) -> Result<String, RvError> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(|e| RvError::new(ErrorCode::NetworkError, e.to_string()))
    }

    /// `true` if a CSS selector matches at least one element on the page.
    pub async fn exists(&mut self, selector: &str) -> Result<bool, RvError> {
        match self.client.find(Locator::Css(selector)).await {
            Ok(_) => Ok(true),
            Err(fantoccini::error::CmdError::NoSuchElement(_)) => Ok(false),
            Err(e) => Err(RvError::new(ErrorCode::ExtractionFailed, e.to_string())),
        }
    }

    /// Page rotation (§4.7): close the active window and open a fresh one
    /// within the *same* context, so cookies/session storage carry over but
    /// per-tab memory is released.
    pub async fn rotate_page(&mut self) -> Result<(), RvError> {
        if let Err(e) = self.client.close_window().await {
            debug!(error = %e, "closing window before rotation (best-effort)");
        }
        let handle = self
            .client
            .new_window(true)
            .await
            .map_err(|e| RvError::new(ErrorCode::BrowserError, e.to_string()))?;
        self.client
            .switch_to_window(handle.handle)
            .await
            .map_err(|e| RvError::new(ErrorCode::BrowserError, e.to_string()))?;
        apply_anti_detection(&self.client).await?;
        self.pages_opened += 1;
        Ok(())
    }

    /// Number of pages opened within this context so far (used by the scan
    /// coordinator to decide when page/context rotation is due).
    #[must_use]
    pub fn pages_opened(&self) -> u64 {
        self.pages_opened
    }

    /// Tear down this context's WebDriver session.
    pub async fn close(self) -> Result<(), RvError> {
        self.client
            .close()
            .await
            .map_err(|e| RvError::new(ErrorCode::BrowserError, e.to_string()))
    }
}

async fn connect(webdriver_url: &str) -> Result<Client, RvError> {
    ClientBuilder::native()
        .connect(webdriver_url)
        .await
        .map_err(|e| RvError::new(ErrorCode::BrowserError, format!("webdriver connect failed: {e}")))
}

async fn apply_anti_detection(client: &Client) -> Result<(), RvError> {
    client
        .execute(ANTI_DETECTION_SHIM, vec![])
        .await
        .map_err(|e| RvError::new(ErrorCode::BrowserError, e.to_string()))?;
    Ok(())
}

/// A process-wide pool of headless browser sessions.
///
/// `acquire` blocks (FIFO, via a counting semaphore) until a slot is free,
/// then lazily opens a new WebDriver session for that slot. `release`
/// returns the slot without closing the session — sessions live until
/// [`cleanup`](Self::cleanup).
pub struct BrowserPool {
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<Browser>>,
    next_id: Mutex<u64>,
}

impl BrowserPool {
    /// Create a pool bounded to `config.size` concurrent sessions.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        let size = config.size.max(1);
        Self {
            config,
            semaphore: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(VecDeque::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Acquire a browser, waiting FIFO for a free slot if the pool is at
    /// capacity.
    pub async fn acquire(&self) -> Result<Browser, RvError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("browser pool semaphore closed");
        // The permit is intentionally dropped: `release` puts the slot back
        // by adding a new permit, keeping accounting in one place.
        std::mem::forget(permit);

        if let Some(browser) = self.idle.lock().await.pop_front() {
            return Ok(browser);
        }

        let mut next_id = self.next_id.lock().await;
        let id = format!("browser-{}", *next_id);
        *next_id += 1;
        drop(next_id);

        let client = connect(&self.config.webdriver_url).await?;
        Ok(Browser { id, client })
    }

    /// Return a browser to the pool. The underlying session stays open.
    pub async fn release(&self, browser: Browser) {
        self.idle.lock().await.push_back(browser);
        self.semaphore.add_permits(1);
    }

    /// Close every session and drain the pool.
    pub async fn cleanup(&self) {
        let mut idle = self.idle.lock().await;
        while let Some(browser) = idle.pop_front() {
            browser.close().await;
        }
    }

    /// Number of idle (released, not yet closed) browser sessions.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }
}
