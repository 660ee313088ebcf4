// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scan node (§4.6, §4.7): batches `original_products` across the browser
//! pool, streaming a joined comparison record per product through the
//! writer Fetch opened.

use crate::require_writer;
use async_trait::async_trait;
use rv_browser_pool::{BrowserPool, PoolConfig};
use rv_core::{ProductSet, RecordStage};
use rv_engine::{clamp_concurrency, split_into_batches, BatchReport, ScanCoordinator};
use rv_error::{ErrorCode, RvError};
use rv_runtime::{NodeContext, NodeOutcome, ScanReport, TypedNode, ValidationOutcome};
use rv_scanner::{testing::DefensiveFallbackScanner, PlatformScanner, PlatformScannerRegistry};
use serde_json::{json, Value};
use std::sync::Arc;

/// Resolves a per-platform scanner, splits the batch by the platform's
/// configured concurrency, and runs each batch through a
/// [`ScanCoordinator`].
///
/// Builds its own [`BrowserPool`] per invocation, sized to the effective
/// concurrency for that invocation (§4.7: "the pool size must equal the
/// concurrency chosen for this node invocation") — a pool built once at
/// node-construction time would drift from whatever concurrency a later
/// job actually requests.
pub struct ScanNode {
    scanners: PlatformScannerRegistry,
    webdriver_url: String,
}

impl ScanNode {
    /// Build a Scan node over a scanner registry and a WebDriver endpoint.
    #[must_use]
    pub fn new(scanners: PlatformScannerRegistry, webdriver_url: impl Into<String>) -> Self {
        Self {
            scanners,
            webdriver_url: webdriver_url.into(),
        }
    }
}

#[async_trait]
impl TypedNode for ScanNode {
    fn type_name(&self) -> &str {
        "scan"
    }

    fn validate(&self, input: &Value) -> ValidationOutcome {
        match input.get("products").and_then(Value::as_array) {
            Some(_) => ValidationOutcome::ok(),
            None => ValidationOutcome::invalid(vec!["scan requires a \"products\" array from fetch".into()]),
        }
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let products: Vec<ProductSet> = serde_json::from_value(input["products"].clone())
            .map_err(|e| RvError::new(ErrorCode::Unknown, format!("malformed products input: {e}")))?;

        let writer = require_writer(&ctx.shared).await?;
        let scanner: Arc<dyn PlatformScanner> = self
            .scanners
            .get(ctx.platform.as_str())
            .unwrap_or_else(|| Arc::new(DefensiveFallbackScanner));

        let wf = &ctx.platform_config.workflow;
        let requested = ctx.params.get("concurrency").and_then(Value::as_u64).map(|v| v as usize);
        let concurrency = clamp_concurrency(requested, wf.concurrency.default, wf.concurrency.max);
        let tolerance = ctx.params.get("price_tolerance_pct").and_then(Value::as_f64).unwrap_or(0.0);

        let pool = Arc::new(BrowserPool::new(PoolConfig {
            size: concurrency,
            webdriver_url: self.webdriver_url.clone(),
        }));

        let batches = split_into_batches(&products, concurrency);
        let runs = batches.iter().map(|batch| {
            let coordinator = ScanCoordinator::new(Arc::clone(&pool), Arc::clone(&scanner), Arc::clone(&writer), self.webdriver_url.clone(), tolerance);
            let platform = ctx.platform.clone();
            let config = Arc::clone(&ctx.platform_config);
            async move { coordinator.run_batch(batch, &config, &platform, RecordStage::Scanned).await }
        });

        let mut report = BatchReport::default();
        for result in futures::future::join_all(runs).await {
            let batch_report = result?;
            report.processed += batch_report.processed;
            report.context_rotations += batch_report.context_rotations;
            report.page_rotations += batch_report.page_rotations;
            report.session_recoveries += batch_report.session_recoveries;
        }
        pool.cleanup().await;

        ctx.shared
            .set_scan_report(ScanReport {
                processed: report.processed as u64,
                context_rotations: u64::from(report.context_rotations),
                page_rotations: u64::from(report.page_rotations),
                session_recoveries: u64::from(report.session_recoveries),
            })
            .await;

        Ok(NodeOutcome::success(json!({
            "products": products,
            "scan_report": {
                "processed": report.processed,
                "context_rotations": report.context_rotations,
                "page_rotations": report.page_rotations,
                "session_recoveries": report.session_recoveries,
            },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_config::{ConcurrencyConfig, MemoryManagementConfig, PlatformConfig, RateLimitConfig, ScanConfig, Strategy, StrategyKind, UpdateExclusions, UrlPattern, WorkflowConfig};
    use rv_core::{PlatformId, SaleStatus};
    use rv_runtime::SharedState;
    use rv_scanner::testing::{ScriptedResponse, ScriptedScanner};
    use rv_stream::ResultWriter;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn platform_config() -> Arc<PlatformConfig> {
        Arc::new(PlatformConfig {
            platform: PlatformId::new("oliveyoung"),
            display_name: "Olive Young".into(),
            url_pattern: UrlPattern {
                domain: "oliveyoung.co.kr".into(),
                product_id_regex: r"/goods/(\w+)".into(),
                product_id_group: 1,
                detail_url_template: "https://www.oliveyoung.co.kr/goods/{id}".into(),
            },
            strategies: vec![Strategy { kind: StrategyKind::Http, options: Value::Null }],
            workflow: WorkflowConfig {
                rate_limit: RateLimitConfig { wait_time_ms: 0 },
                concurrency: ConcurrencyConfig { default: 1, max: 10 },
                memory_management: MemoryManagementConfig {
                    page_rotation_interval: 20,
                    context_rotation_interval: 50,
                    enable_gc_hints: false,
                },
                max_consecutive_failures: 2,
            },
            update_exclusions: UpdateExclusions::default(),
            scan_config: ScanConfig::default(),
        })
    }

    fn product(id: &str) -> ProductSet {
        ProductSet {
            product_set_id: Uuid::new_v4(),
            product_id: id.into(),
            brand_id: "b1".into(),
            platform: PlatformId::new("oliveyoung"),
            link_url: format!("https://example.com/goods/{id}"),
            product_name: "x".into(),
            thumbnail: String::new(),
            original_price: 1_000,
            discounted_price: 1_000,
            sale_status: SaleStatus::OnSale,
            auto_crawled: true,
        }
    }

    async fn ctx_with_writer(dir: &std::path::Path) -> NodeContext {
        let writer = Arc::new(ResultWriter::new(dir, "oliveyoung", "job-1"));
        let shared = Arc::new(SharedState::new());
        shared.set_result_writer(writer).await;
        NodeContext {
            job_id: "job-1".into(),
            workflow_id: "wf-1".into(),
            platform: PlatformId::new("oliveyoung"),
            platform_config: platform_config(),
            config: HashMap::new(),
            params: HashMap::new(),
            shared,
        }
    }

    #[tokio::test]
    async fn scans_every_product_and_appends_matching_records() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_writer(dir.path()).await;
        let products = vec![product("A"), product("B")];

        let scripted = ScriptedScanner::new().with_method(StrategyKind::Http);
        for p in &products {
            scripted.script(
                p.link_url.clone(),
                ScriptedResponse::Found(rv_core::ScannedData {
                    product_name: p.product_name.clone(),
                    thumbnail: p.thumbnail.clone(),
                    original_price: p.original_price,
                    discounted_price: p.discounted_price,
                    sale_status: p.sale_status,
                }),
            );
        }
        let scanners = PlatformScannerRegistry::new();
        scanners.register("oliveyoung", Arc::new(scripted));

        let node = ScanNode::new(scanners, "http://localhost:4444");

        let outcome = node.execute(json!({ "products": products }), &ctx).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data["scan_report"]["processed"], json!(2));

        let writer = ctx.shared.result_writer().await.unwrap();
        let summary = writer.summary().await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.matched, 2);

        let scan_report = ctx.shared.scan_report().await.unwrap();
        assert_eq!(scan_report.processed, 2);
    }

    #[tokio::test]
    async fn missing_products_input_fails_validation() {
        let node = ScanNode::new(PlatformScannerRegistry::new(), "http://localhost:4444");
        let outcome = node.validate(&json!({}));
        assert!(!outcome.valid);
    }

    #[tokio::test]
    async fn unregistered_platform_falls_back_defensively() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_writer(dir.path()).await;
        let products = vec![product("A")];

        let node = ScanNode::new(PlatformScannerRegistry::new(), "http://localhost:4444");

        let outcome = node.execute(json!({ "products": products }), &ctx).await.unwrap();
        assert!(outcome.success);
        let writer = ctx.shared.result_writer().await.unwrap();
        let summary = writer.summary().await;
        assert_eq!(summary.by_status.get("failed").copied().unwrap_or(0), 1);
    }
}
