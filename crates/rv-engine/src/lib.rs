// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scan batch coordinator: rotation, session recovery, and inter-scan rate
//! limiting inside one Scan-node invocation (§4.7).
//!
//! A [`ScanCoordinator`] drives one [`BrowserPool`]-backed batch over a
//! slice of products, appending a [`ComparisonRecord`] per product to a
//! [`ResultWriter`] as it goes. Concurrency across batches is the caller's
//! responsibility ([`clamp_concurrency`] decides how many batches to run);
//! each batch here is strictly sequential over its own slice.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compare;
mod single_shot;

pub use compare::compare_fields;
pub use single_shot::SingleShotScanner;

use rv_browser_pool::{Browser, BrowserPool, Context};
use rv_config::{MemoryManagementConfig, PlatformConfig};
use rv_core::{ComparisonRecord, PlatformId, ProductSet, RecordStage};
use rv_error::RvError;
use rv_scanner::{PlatformScanner, ScanOutcome};
use rv_stream::ResultWriter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Clamp a job's requested concurrency per §4.7:
/// `effective = min(requested || config.default || 1, config.max || 10)`.
#[must_use]
pub fn clamp_concurrency(requested: Option<usize>, default: usize, max: usize) -> usize {
    let default = if default == 0 { 1 } else { default };
    let max = if max == 0 { 10 } else { max };
    requested.filter(|r| *r > 0).unwrap_or(default).min(max)
}

/// Split `products` into `batch_count` contiguous, roughly equal slices.
/// Ordering within each slice is preserved; batches may differ in length by
/// at most one element.
#[must_use]
pub fn split_into_batches(products: &[ProductSet], batch_count: usize) -> Vec<Vec<ProductSet>> {
    if batch_count == 0 || products.is_empty() {
        return Vec::new();
    }
    let batch_count = batch_count.min(products.len().max(1));
    let mut batches: Vec<Vec<ProductSet>> = vec![Vec::new(); batch_count];
    for (i, product) in products.iter().enumerate() {
        batches[i % batch_count].push(product.clone());
    }
    batches.retain(|b| !b.is_empty());
    batches
}

/// Outcome counters for one batch run, aggregated by the caller across
/// batches per §8 ("writer's `recordCount` after finalize equals the sum
/// over all batches").
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Products processed in this batch.
    pub processed: usize,
    /// Number of context rotations (including session-recovery rebuilds).
    pub context_rotations: u32,
    /// Number of page-only rotations.
    pub page_rotations: u32,
    /// Number of session recoveries triggered by consecutive failures.
    pub session_recoveries: u32,
}

/// Drives one batch of products through scan → inline compare → append.
pub struct ScanCoordinator {
    pool: Arc<BrowserPool>,
    scanner: Arc<dyn PlatformScanner>,
    writer: Arc<ResultWriter>,
    webdriver_url: String,
    price_tolerance_pct: f64,
}

impl ScanCoordinator {
    /// Build a coordinator over a shared pool, a resolved scanner, and the
    /// job's result writer.
    #[must_use]
    pub fn new(
        pool: Arc<BrowserPool>,
        scanner: Arc<dyn PlatformScanner>,
        writer: Arc<ResultWriter>,
        webdriver_url: impl Into<String>,
        price_tolerance_pct: f64,
    ) -> Self {
        Self {
            pool,
            scanner,
            writer,
            webdriver_url: webdriver_url.into(),
            price_tolerance_pct,
        }
    }

    /// Run one batch to completion, honoring rotation, session recovery,
    /// and rate limiting. Always releases its browser, even on error —
    /// the `finally`-style cleanup in §4.7 is expressed here as a guard
    /// that runs regardless of which branch returns.
    pub async fn run_batch(&self, products: &[ProductSet], config: &PlatformConfig, platform: &PlatformId, stage: RecordStage) -> Result<BatchReport, RvError> {
        let mut report = BatchReport::default();
        let browser = self.pool.acquire().await?;
        let mut context = browser.new_context(&self.webdriver_url).await?;

        let result = self.drive_loop(products, config, platform, stage, &browser, &mut context, &mut report).await;

        if let Err(e) = context.close().await {
            warn!(error = %e, "error closing context during batch cleanup (ignored)");
        }
        self.pool.release(browser).await;

        result.map(|()| report)
    }

    async fn drive_loop(
        &self,
        products: &[ProductSet],
        config: &PlatformConfig,
        platform: &PlatformId,
        stage: RecordStage,
        browser: &Browser,
        context: &mut Context,
        report: &mut BatchReport,
    ) -> Result<(), RvError> {
        let memory = &config.workflow.memory_management;
        let wait_time = Duration::from_millis(config.workflow.rate_limit.wait_time_ms);
        let max_consecutive_failures = config.workflow.max_consecutive_failures;

        let mut consecutive_failures: u32 = 0;
        let mut last_start: Option<Instant> = None;

        for (i, db_row) in products.iter().enumerate() {
            if i > 0 {
                self.rotate_if_due(browser, context, i as u64, memory, report).await?;
                if let Some(prev) = last_start {
                    let elapsed = prev.elapsed();
                    if elapsed < wait_time {
                        sleep(wait_time - elapsed).await;
                    }
                }
            }
            last_start = Some(Instant::now());

            let record = self.scan_one(db_row, platform, stage, context).await;
            let failed = matches!(record.status, rv_core::RecordStatus::Failed);
            self.writer.append(&record).await?;
            report.processed += 1;

            if failed {
                consecutive_failures += 1;
            } else {
                consecutive_failures = 0;
            }

            if consecutive_failures >= max_consecutive_failures {
                debug!(product_index = i, "consecutive failure threshold reached, recovering session");
                self.rebuild_context(browser, context).await?;
                report.context_rotations += 1;
                report.session_recoveries += 1;
                consecutive_failures = 0;
            }
        }

        Ok(())
    }

    async fn rotate_if_due(&self, browser: &Browser, context: &mut Context, i: u64, memory: &MemoryManagementConfig, report: &mut BatchReport) -> Result<(), RvError> {
        if memory.context_rotation_interval > 0 && i % memory.context_rotation_interval == 0 {
            self.rebuild_context(browser, context).await?;
            report.context_rotations += 1;
        } else if memory.page_rotation_interval > 0 && i % memory.page_rotation_interval == 0 {
            context.rotate_page().await?;
            report.page_rotations += 1;
        }
        Ok(())
    }

    /// Close the current context's WebDriver session and open a fresh one on
    /// the same browser, per §4.7: context rotation and session recovery
    /// both rebuild the context, not just the page.
    async fn rebuild_context(&self, browser: &Browser, context: &mut Context) -> Result<(), RvError> {
        let fresh = browser.new_context(&self.webdriver_url).await?;
        let stale = std::mem::replace(context, fresh);
        if let Err(e) = stale.close().await {
            warn!(error = %e, "error closing stale context during rebuild (ignored)");
        }
        Ok(())
    }

    async fn scan_one(&self, db_row: &ProductSet, platform: &PlatformId, stage: RecordStage, context: &mut Context) -> ComparisonRecord {
        let url = db_row.link_url.clone();
        let ctx_arg = if self.scanner.scan_method() == rv_config::StrategyKind::Browser {
            Some(context)
        } else {
            None
        };

        match self.scanner.scan(&url, ctx_arg).await {
            Ok(ScanOutcome { data: Some(data), .. }) => {
                let comparison = compare_fields(db_row, &data, self.price_tolerance_pct);
                let matched = comparison.all_match();
                ComparisonRecord {
                    product_set_id: db_row.product_set_id,
                    product_id: db_row.product_id.clone(),
                    url,
                    platform: platform.clone(),
                    db: db_row.clone(),
                    fetch: Some(data),
                    comparison,
                    matched,
                    status: rv_core::RecordStatus::Success,
                    error: None,
                    timestamp: chrono_now(),
                    stage,
                }
            }
            Ok(ScanOutcome { is_not_found: true, .. }) => {
                ComparisonRecord::not_found(db_row.clone(), url, platform.clone(), stage)
            }
            Ok(_) => ComparisonRecord::failed(db_row.clone(), url, platform.clone(), stage, "scanner returned neither data nor not_found"),
            Err(e) => ComparisonRecord::failed(db_row.clone(), url, platform.clone(), stage, e.message),
        }
    }
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_concurrency_uses_default_when_unrequested() {
        assert_eq!(clamp_concurrency(None, 2, 10), 2);
    }

    #[test]
    fn clamp_concurrency_caps_at_max() {
        assert_eq!(clamp_concurrency(Some(50), 2, 10), 10);
    }

    #[test]
    fn clamp_concurrency_falls_back_to_one_when_default_is_zero() {
        assert_eq!(clamp_concurrency(Some(0), 0, 10), 1);
    }

    #[test]
    fn split_into_batches_preserves_total_count() {
        let products: Vec<ProductSet> = (0..5)
            .map(|i| make_product(&i.to_string()))
            .collect();
        let batches = split_into_batches(&products, 2);
        let total: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(total, 5);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn split_into_batches_never_exceeds_product_count() {
        let products: Vec<ProductSet> = (0..2).map(|i| make_product(&i.to_string())).collect();
        let batches = split_into_batches(&products, 10);
        assert_eq!(batches.len(), 2);
    }

    fn make_product(id: &str) -> ProductSet {
        use rv_core::SaleStatus;
        ProductSet {
            product_set_id: uuid::Uuid::nil(),
            product_id: id.into(),
            brand_id: "b1".into(),
            platform: PlatformId::new("oliveyoung"),
            link_url: format!("https://example.com/goods/{id}"),
            product_name: "x".into(),
            thumbnail: String::new(),
            original_price: 1000,
            discounted_price: 1000,
            sale_status: SaleStatus::OnSale,
            auto_crawled: true,
        }
    }
}
