// SPDX-License-Identifier: MIT OR Apache-2.0
//! Extract-by-URL, Extract-by-productSet, and Extract-multi-platform
//! (§4.6): ad-hoc single-product runs that skip Fetch and/or the separate
//! Compare aggregation step, driven by [`rv_engine::SingleShotScanner`]
//! rather than the batch [`rv_engine::ScanCoordinator`].

use async_trait::async_trait;
use chrono::Utc;
use rv_browser_pool::BrowserPool;
use rv_config::PlatformRegistry;
use rv_core::{ComparisonFields, ComparisonRecord, PlatformId, ProductSet, RecordStage, RecordStatus, SaleStatus};
use rv_engine::{compare_fields, SingleShotScanner};
use rv_error::{ErrorCode, RvError};
use rv_repository::ProductRepository;
use rv_runtime::{NodeContext, NodeOutcome, SaveResult, TypedNode, ValidationOutcome};
use rv_scanner::PlatformScannerRegistry;
use rv_stream::ResultWriter;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Stand-in catalog row for a URL with no database counterpart: every field
/// mirrors the scan so the comparison trivially matches. Ad-hoc extraction
/// has nothing to diff against; this keeps the JSONL line the same shape as
/// a normal scan record instead of inventing a new one.
fn placeholder_row(product_id: &str, platform: &PlatformId, url: &str, fetch: &rv_core::ScannedData) -> ProductSet {
    ProductSet {
        product_set_id: Uuid::new_v4(),
        product_id: product_id.to_string(),
        brand_id: String::new(),
        platform: platform.clone(),
        link_url: url.to_string(),
        product_name: fetch.product_name.clone(),
        thumbnail: fetch.thumbnail.clone(),
        original_price: fetch.original_price,
        discounted_price: fetch.discounted_price,
        sale_status: fetch.sale_status,
        auto_crawled: false,
    }
}

async fn write_and_save(writer: &ResultWriter, ctx: &NodeContext) -> Result<SaveResult, RvError> {
    let outcome = writer.finalize().await?;
    let result = SaveResult {
        file_path: outcome.file_path,
        summary: outcome.summary,
    };
    ctx.shared.set_save_result(result.clone()).await;
    Ok(result)
}

/// Scans exactly one URL, detecting its platform from the registered
/// [`PlatformRegistry`] rather than `ctx.platform`.
pub struct ExtractByUrlNode {
    pool: Arc<BrowserPool>,
    scanners: PlatformScannerRegistry,
    platforms: Arc<PlatformRegistry>,
    webdriver_url: String,
    output_dir: PathBuf,
}

impl ExtractByUrlNode {
    /// Build an Extract-by-URL node.
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>, scanners: PlatformScannerRegistry, platforms: Arc<PlatformRegistry>, webdriver_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            scanners,
            platforms,
            webdriver_url: webdriver_url.into(),
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl TypedNode for ExtractByUrlNode {
    fn type_name(&self) -> &str {
        "extract_by_url"
    }

    fn validate(&self, input: &Value) -> ValidationOutcome {
        match input.get("url").and_then(Value::as_str) {
            Some(_) => ValidationOutcome::ok(),
            None => ValidationOutcome::invalid(vec!["extract_by_url requires a \"url\" string".into()]),
        }
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let url = input["url"].as_str().unwrap_or_default().to_string();
        let platform = self.platforms.detect_platform(&url).ok_or_else(|| {
            RvError::new(ErrorCode::ConfigMissing, "no registered platform recognizes this URL").with_context("url", url.clone())
        })?;
        let product_id = self.platforms.extract_product_id(&url, &platform).unwrap_or_default();

        let scanner = self.scanners.get(platform.as_str()).ok_or_else(|| {
            RvError::new(ErrorCode::ConfigMissing, "platform has no registered scanner").with_context("platform", platform.as_str())
        })?;
        let single_shot = SingleShotScanner::new(Arc::clone(&self.pool), self.webdriver_url.clone());
        let record = scan_one_adhoc(&single_shot, &scanner, &url, &product_id, &platform).await;

        let writer = ResultWriter::new(self.output_dir.clone(), platform.as_str(), &ctx.job_id);
        writer.append(&record).await?;
        let save = write_and_save(&writer, ctx).await?;

        Ok(NodeOutcome::success(json!({
            "platform": platform.as_str(),
            "product_id": product_id,
            "record": record.to_line_value(),
            "file_path": save.file_path,
        })))
    }
}

/// Scans a single catalog row given its `product_set_id`, comparing against
/// the real database row (unlike [`ExtractByUrlNode`]) but skipping the
/// separate Compare aggregation node.
pub struct ExtractByProductSetNode {
    pool: Arc<BrowserPool>,
    scanners: PlatformScannerRegistry,
    products: Arc<dyn ProductRepository>,
    webdriver_url: String,
    output_dir: PathBuf,
}

impl ExtractByProductSetNode {
    /// Build an Extract-by-productSet node.
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>, scanners: PlatformScannerRegistry, products: Arc<dyn ProductRepository>, webdriver_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            scanners,
            products,
            webdriver_url: webdriver_url.into(),
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl TypedNode for ExtractByProductSetNode {
    fn type_name(&self) -> &str {
        "extract_by_product_set"
    }

    fn validate(&self, input: &Value) -> ValidationOutcome {
        match input.get("product_set_id").and_then(Value::as_str) {
            Some(_) => ValidationOutcome::ok(),
            None => ValidationOutcome::invalid(vec!["extract_by_product_set requires a \"product_set_id\" string".into()]),
        }
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let id_str = input["product_set_id"].as_str().unwrap_or_default();
        let id = Uuid::parse_str(id_str).map_err(|e| RvError::new(ErrorCode::Unknown, format!("invalid product_set_id: {e}")))?;

        let rows = self.products.find_by_ids(&[id]).await?;
        let db_row = rows.into_iter().next().ok_or_else(|| {
            RvError::new(ErrorCode::RepositoryError, "no such product_set_id").with_context("product_set_id", id_str.to_string())
        })?;

        let scanner = self.scanners.get(db_row.platform.as_str()).ok_or_else(|| {
            RvError::new(ErrorCode::ConfigMissing, "platform has no registered scanner").with_context("platform", db_row.platform.as_str())
        })?;
        let single_shot = SingleShotScanner::new(Arc::clone(&self.pool), self.webdriver_url.clone());

        let record = match single_shot.scan(&scanner, &db_row.link_url).await {
            Ok(outcome) if outcome.is_not_found => ComparisonRecord::not_found(db_row.clone(), db_row.link_url.clone(), db_row.platform.clone(), RecordStage::Scanned),
            Ok(outcome) => {
                let Some(data) = outcome.data else {
                    return Err(RvError::new(ErrorCode::ExtractionFailed, "scanner returned neither data nor not_found"));
                };
                let comparison = compare_fields(&db_row, &data, 0.0);
                let matched = comparison.all_match();
                ComparisonRecord {
                    product_set_id: db_row.product_set_id,
                    product_id: db_row.product_id.clone(),
                    url: db_row.link_url.clone(),
                    platform: db_row.platform.clone(),
                    db: db_row.clone(),
                    fetch: Some(data),
                    comparison,
                    matched,
                    status: RecordStatus::Success,
                    error: None,
                    timestamp: Utc::now(),
                    stage: RecordStage::Scanned,
                }
            }
            Err(e) => ComparisonRecord::failed(db_row.clone(), db_row.link_url.clone(), db_row.platform.clone(), RecordStage::Scanned, e.message),
        };

        let writer = ResultWriter::new(self.output_dir.clone(), db_row.platform.as_str(), &ctx.job_id);
        writer.append(&record).await?;
        let save = write_and_save(&writer, ctx).await?;

        Ok(NodeOutcome::success(json!({
            "product_set_id": db_row.product_set_id,
            "record": record.to_line_value(),
            "file_path": save.file_path,
        })))
    }
}

/// Scans one `product_id` across every registered platform that exposes a
/// detail-URL template for it, one record per platform.
pub struct ExtractMultiPlatformNode {
    pool: Arc<BrowserPool>,
    scanners: PlatformScannerRegistry,
    platforms: Arc<PlatformRegistry>,
    webdriver_url: String,
    output_dir: PathBuf,
}

impl ExtractMultiPlatformNode {
    /// Build an Extract-multi-platform node.
    #[must_use]
    pub fn new(pool: Arc<BrowserPool>, scanners: PlatformScannerRegistry, platforms: Arc<PlatformRegistry>, webdriver_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            scanners,
            platforms,
            webdriver_url: webdriver_url.into(),
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl TypedNode for ExtractMultiPlatformNode {
    fn type_name(&self) -> &str {
        "extract_multi_platform"
    }

    fn validate(&self, input: &Value) -> ValidationOutcome {
        match input.get("product_id").and_then(Value::as_str) {
            Some(_) => ValidationOutcome::ok(),
            None => ValidationOutcome::invalid(vec!["extract_multi_platform requires a \"product_id\" string".into()]),
        }
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let product_id = input["product_id"].as_str().unwrap_or_default().to_string();
        let single_shot = SingleShotScanner::new(Arc::clone(&self.pool), self.webdriver_url.clone());

        let mut results = Vec::new();
        for platform in self.platforms.platforms() {
            let Some(scanner) = self.scanners.get(platform.as_str()) else { continue };
            let Some(url) = self.platforms.build_detail_url(&product_id, &platform) else { continue };
            let record = scan_one_adhoc(&single_shot, &scanner, &url, &product_id, &platform).await;
            results.push((platform, record));
        }

        let writer = ResultWriter::new(self.output_dir.clone(), "multi_platform", &ctx.job_id);
        for (_, record) in &results {
            writer.append(record).await?;
        }
        let save = write_and_save(&writer, ctx).await?;

        Ok(NodeOutcome::success(json!({
            "product_id": product_id,
            "platforms_scanned": results.iter().map(|(p, _)| p.as_str().to_string()).collect::<Vec<_>>(),
            "file_path": save.file_path,
        })))
    }
}

async fn scan_one_adhoc(
    single_shot: &SingleShotScanner,
    scanner: &Arc<dyn rv_scanner::PlatformScanner>,
    url: &str,
    product_id: &str,
    platform: &PlatformId,
) -> ComparisonRecord {
    match single_shot.scan(scanner, url).await {
        Ok(outcome) if outcome.is_not_found => {
            let stand_in = placeholder_row(product_id, platform, url, &blank_scanned_data());
            ComparisonRecord::not_found(stand_in, url.to_string(), platform.clone(), RecordStage::Scanned)
        }
        Ok(outcome) => match outcome.data {
            Some(data) => {
                let db_row = placeholder_row(product_id, platform, url, &data);
                let comparison = ComparisonFields {
                    product_name: true,
                    thumbnail: true,
                    original_price: true,
                    discounted_price: true,
                    sale_status: true,
                };
                ComparisonRecord {
                    product_set_id: db_row.product_set_id,
                    product_id: product_id.to_string(),
                    url: url.to_string(),
                    platform: platform.clone(),
                    db: db_row,
                    fetch: Some(data),
                    comparison,
                    matched: true,
                    status: RecordStatus::Success,
                    error: None,
                    timestamp: Utc::now(),
                    stage: RecordStage::Scanned,
                }
            }
            None => {
                let stand_in = placeholder_row(product_id, platform, url, &blank_scanned_data());
                ComparisonRecord::failed(stand_in, url.to_string(), platform.clone(), RecordStage::Scanned, "scanner returned neither data nor not_found")
            }
        },
        Err(e) => {
            let stand_in = placeholder_row(product_id, platform, url, &blank_scanned_data());
            ComparisonRecord::failed(stand_in, url.to_string(), platform.clone(), RecordStage::Scanned, e.message)
        }
    }
}

fn blank_scanned_data() -> rv_core::ScannedData {
    rv_core::ScannedData {
        product_name: String::new(),
        thumbnail: String::new(),
        original_price: 0,
        discounted_price: 0,
        sale_status: SaleStatus::OffSale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_browser_pool::PoolConfig;
    use rv_config::{ConcurrencyConfig, MemoryManagementConfig, PlatformConfig, RateLimitConfig, ScanConfig, Strategy, StrategyKind, UpdateExclusions, UrlPattern, WorkflowConfig};
    use rv_runtime::SharedState;
    use rv_scanner::testing::{ScriptedResponse, ScriptedScanner};
    use std::collections::HashMap;

    fn config(domain: &str) -> PlatformConfig {
        PlatformConfig {
            platform: PlatformId::new("oliveyoung"),
            display_name: "Olive Young".into(),
            url_pattern: UrlPattern {
                domain: domain.into(),
                product_id_regex: r"/goods/(\w+)".into(),
                product_id_group: 1,
                detail_url_template: format!("https://{domain}/goods/{{id}}"),
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
        }
    }

    fn ctx() -> NodeContext {
        NodeContext {
            job_id: "job-1".into(),
            workflow_id: "wf-1".into(),
            platform: PlatformId::new("oliveyoung"),
            platform_config: Arc::new(config("oliveyoung.co.kr")),
            config: HashMap::new(),
            params: HashMap::new(),
            shared: Arc::new(SharedState::new()),
        }
    }

    #[tokio::test]
    async fn extract_by_url_detects_platform_and_writes_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Arc::new(BrowserPool::new(PoolConfig { size: 1, webdriver_url: "http://localhost:4444".into() }));
        let platforms = Arc::new(PlatformRegistry::new(vec![config("oliveyoung.co.kr")]).unwrap());

        let scanners = PlatformScannerRegistry::new();
        let url = "https://oliveyoung.co.kr/goods/A000123";
        let scripted = ScriptedScanner::new().with_method(StrategyKind::Http);
        scripted.script(
            url,
            ScriptedResponse::Found(rv_core::ScannedData {
                product_name: "토너".into(),
                thumbnail: String::new(),
                original_price: 10_000,
                discounted_price: 8_000,
                sale_status: SaleStatus::OnSale,
            }),
        );
        scanners.register("oliveyoung", Arc::new(scripted));

        let node = ExtractByUrlNode::new(pool, scanners, platforms, "http://localhost:4444", dir.path());
        let outcome = node.execute(json!({ "url": url }), &ctx()).await.unwrap();
        assert_eq!(outcome.data["platform"], json!("oliveyoung"));
        assert_eq!(outcome.data["product_id"], json!("A000123"));
    }
}
