// SPDX-License-Identifier: MIT OR Apache-2.0
//! One-off scans outside a batch: the Extract-* nodes (§4.6) and the
//! monitor pipeline (§4.9) both need "acquire a browser, scan once, release"
//! without the rotation/rate-limit machinery [`crate::ScanCoordinator`]
//! drives over a whole product slice.

use rv_browser_pool::BrowserPool;
use rv_config::StrategyKind;
use rv_error::RvError;
use rv_scanner::{PlatformScanner, ScanOutcome};
use std::sync::Arc;
use tracing::warn;

/// Drives a single [`PlatformScanner::scan`] call through a freshly acquired
/// browser when the scanner needs one, releasing it afterward regardless of
/// outcome — the same `finally`-style cleanup as a batch, scoped to one URL.
pub struct SingleShotScanner {
    pool: Arc<BrowserPool>,
    webdriver_url: String,
}

impl SingleShotScanner {
    /// Build a single-shot scanner over a shared pool.
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>, webdriver_url: impl Into<String>) -> Self {
        Self {
            pool,
            webdriver_url: webdriver_url.into(),
        }
    }

    /// Scan `url` once. Acquires a browser and a fresh context only when
    /// `scanner.scan_method() == StrategyKind::Browser`; HTTP/GraphQL
    /// scanners never touch the pool.
    pub async fn scan(&self, scanner: &Arc<dyn PlatformScanner>, url: &str) -> Result<ScanOutcome, RvError> {
        if scanner.scan_method() != StrategyKind::Browser {
            return scanner.scan(url, None).await;
        }

        let browser = self.pool.acquire().await?;
        let mut context = browser.new_context(&self.webdriver_url).await?;

        let result = scanner.scan(url, Some(&mut context)).await;

        if let Err(e) = context.close().await {
            warn!(error = %e, "error closing context after single-shot scan (ignored)");
        }
        self.pool.release(browser).await;

        result
    }
}
