// SPDX-License-Identifier: MIT OR Apache-2.0
//! Monitor nodes (§4.9): banner, pick-section, and collabo-banner variants
//! of the pipeline. Input is a curated list rather than a catalog fetch;
//! each entry is scanned once through [`rv_engine::SingleShotScanner`] and
//! surviving failures are posted as a chat alert. The monitor never writes
//! to the product database — it only reads through [`BannerRepository`]
//! and [`ProductRepository`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use rv_core::{ComparisonRecord, RecordStage, RecordStatus};
use rv_engine::SingleShotScanner;
use rv_error::RvError;
use rv_repository::{Banner, BannerRepository, ProductRepository};
use rv_runtime::{NodeContext, NodeOutcome, TypedNode, ValidationOutcome};
use rv_scanner::PlatformScannerRegistry;
use rv_stream::ResultWriter;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Which curated list a monitor run scans. Only the JSONL prefix and alert
/// title differ between variants — the scan/filter/alert machinery is
/// shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorKind {
    /// Active promotional banners.
    Banner,
    /// Pick-section featured items.
    PickSection,
    /// Collaboration (time-boxed) banners.
    Collabo,
}

impl MonitorKind {
    fn jsonl_prefix(self) -> &'static str {
        match self {
            Self::Banner => "monitor_banner",
            Self::PickSection => "monitor_pick_section",
            Self::Collabo => "monitor_collabo",
        }
    }

    fn alert_title(self) -> &'static str {
        match self {
            Self::Banner => "Banner Monitor Alert",
            Self::PickSection => "Pick-Section Monitor Alert",
            Self::Collabo => "Collabo Banner Monitor Alert",
        }
    }
}

/// Time-window and platform-exclusion rules applied after scanning.
/// A failure only becomes a chat alert if it survives this filter.
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    /// Platforms whose failures are suppressed entirely (e.g. a platform
    /// under a known, acknowledged outage).
    pub excluded_platforms: Vec<String>,
    /// Quiet hours (inclusive start, exclusive end, UTC) during which no
    /// alert is posted regardless of severity. `None` disables the window.
    pub quiet_hours: Option<(NaiveTime, NaiveTime)>,
}

impl AlertFilter {
    /// `true` iff a failure on `platform` at `now` should be suppressed.
    #[must_use]
    pub fn suppresses(&self, platform: &str, now: NaiveTime) -> bool {
        if self.excluded_platforms.iter().any(|p| p == platform) {
            return true;
        }
        match self.quiet_hours {
            Some((start, end)) if start <= end => now >= start && now < end,
            Some((start, end)) => now >= start || now < end,
            None => false,
        }
    }
}

const ALERT_TIMEOUT: Duration = Duration::from_secs(10);

/// Scans a curated list of [`Banner`] entries once each, streams the
/// results, and posts a best-effort chat alert for failures that survive
/// the [`AlertFilter`].
pub struct MonitorNode {
    kind: MonitorKind,
    banners: Arc<dyn BannerRepository>,
    products: Arc<dyn ProductRepository>,
    scanners: PlatformScannerRegistry,
    single_shot: SingleShotScanner,
    filter: AlertFilter,
    client: reqwest::Client,
    webhook_url: Option<String>,
    output_dir: PathBuf,
}

impl MonitorNode {
    /// Build a monitor node of the given `kind`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: MonitorKind,
        banners: Arc<dyn BannerRepository>,
        products: Arc<dyn ProductRepository>,
        scanners: PlatformScannerRegistry,
        single_shot: SingleShotScanner,
        filter: AlertFilter,
        webhook_url: Option<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            kind,
            banners,
            products,
            scanners,
            single_shot,
            filter,
            client: reqwest::Client::new(),
            webhook_url,
            output_dir: output_dir.into(),
        }
    }

    async fn scan_banner(&self, banner: &Banner) -> Option<ComparisonRecord> {
        let Some(product_set_id) = banner.product_set_id else {
            return None;
        };
        let rows = self.products.find_by_ids(&[product_set_id]).await.ok()?;
        let db_row = rows.into_iter().next()?;

        let scanner = self.scanners.get(db_row.platform.as_str())?;
        let record = match self.single_shot.scan(&scanner, &db_row.link_url).await {
            Ok(outcome) if outcome.is_not_found => ComparisonRecord::not_found(db_row.clone(), db_row.link_url.clone(), db_row.platform.clone(), RecordStage::Scanned),
            Ok(outcome) => match outcome.data {
                Some(data) => {
                    let comparison = rv_engine::compare_fields(&db_row, &data, 0.0);
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
                None => ComparisonRecord::failed(db_row.clone(), db_row.link_url.clone(), db_row.platform.clone(), RecordStage::Scanned, "scanner returned neither data nor not_found"),
            },
            Err(e) => ComparisonRecord::failed(db_row.clone(), db_row.link_url.clone(), db_row.platform.clone(), RecordStage::Scanned, e.message),
        };
        Some(record)
    }

    async fn post_alert(&self, message: &str) -> bool {
        let Some(url) = &self.webhook_url else { return false };
        let body = json!({ "text": message });
        match self.client.post(url).timeout(ALERT_TIMEOUT).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), kind = ?self.kind, "monitor alert webhook returned non-success (ignored)");
                false
            }
            Err(e) => {
                warn!(error = %e, kind = ?self.kind, "monitor alert webhook request failed (ignored)");
                false
            }
        }
    }
}

#[async_trait]
impl TypedNode for MonitorNode {
    fn type_name(&self) -> &str {
        match self.kind {
            MonitorKind::Banner => "monitor_banner",
            MonitorKind::PickSection => "monitor_pick_section",
            MonitorKind::Collabo => "monitor_collabo",
        }
    }

    fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    async fn execute(&self, _input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let banners = self.banners.active().await?;
        let writer = ResultWriter::new(self.output_dir.clone(), self.kind.jsonl_prefix(), &ctx.job_id);

        let mut failures = Vec::new();
        for banner in &banners {
            let Some(record) = self.scan_banner(banner).await else { continue };
            writer.append(&record).await?;
            if record.status != RecordStatus::Success {
                failures.push(record);
            }
        }
        let outcome = writer.finalize().await?;

        let now = Utc::now().time();
        let alertable: Vec<&ComparisonRecord> = failures.iter().filter(|r| !self.filter.suppresses(r.platform.as_str(), now)).collect();

        let mut alerted = false;
        if !alertable.is_empty() {
            let message = format!(
                "🚨 {} — {} of {} entries failed (after filter: {}) — {}",
                self.kind.alert_title(),
                failures.len(),
                banners.len(),
                alertable.len(),
                outcome.file_path.display(),
            );
            alerted = self.post_alert(&message).await;
        }

        Ok(NodeOutcome::success(json!({
            "scanned": banners.len(),
            "failures": failures.len(),
            "alerted": alerted,
            "file_path": outcome.file_path,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_browser_pool::{BrowserPool, PoolConfig};
    use rv_config::StrategyKind;
    use rv_core::{PlatformId, ProductSet, SaleStatus, ScannedData};
    use rv_repository::InMemoryCatalog;
    use rv_runtime::SharedState;
    use rv_scanner::testing::{ScriptedResponse, ScriptedScanner};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn ctx() -> NodeContext {
        NodeContext {
            job_id: "job-1".into(),
            workflow_id: "wf-1".into(),
            platform: PlatformId::new("oliveyoung"),
            platform_config: Arc::new(rv_config::PlatformConfig {
                platform: PlatformId::new("oliveyoung"),
                display_name: "Olive Young".into(),
                url_pattern: rv_config::UrlPattern {
                    domain: "oliveyoung.co.kr".into(),
                    product_id_regex: r"/goods/(\w+)".into(),
                    product_id_group: 1,
                    detail_url_template: "https://oliveyoung.co.kr/goods/{id}".into(),
                },
                strategies: vec![rv_config::Strategy { kind: StrategyKind::Http, options: Value::Null }],
                workflow: rv_config::WorkflowConfig {
                    rate_limit: rv_config::RateLimitConfig { wait_time_ms: 0 },
                    concurrency: rv_config::ConcurrencyConfig { default: 1, max: 10 },
                    memory_management: rv_config::MemoryManagementConfig {
                        page_rotation_interval: 20,
                        context_rotation_interval: 50,
                        enable_gc_hints: false,
                    },
                    max_consecutive_failures: 2,
                },
                update_exclusions: rv_config::UpdateExclusions::default(),
                scan_config: rv_config::ScanConfig::default(),
            }),
            config: HashMap::new(),
            params: HashMap::new(),
            shared: Arc::new(SharedState::new()),
        }
    }

    struct FixedBanners(Vec<Banner>);

    #[async_trait]
    impl BannerRepository for FixedBanners {
        async fn active(&self) -> Result<Vec<Banner>, RvError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn not_found_scan_is_recorded_as_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let product_set_id = Uuid::new_v4();
        let catalog = Arc::new(InMemoryCatalog::seeded(vec![ProductSet {
            product_set_id,
            product_id: "A1".into(),
            brand_id: "b1".into(),
            platform: PlatformId::new("oliveyoung"),
            link_url: "https://oliveyoung.co.kr/goods/A1".into(),
            product_name: "토너".into(),
            thumbnail: String::new(),
            original_price: 10_000,
            discounted_price: 8_000,
            sale_status: SaleStatus::OnSale,
            auto_crawled: false,
        }]));

        let scanners = PlatformScannerRegistry::new();
        let scripted = ScriptedScanner::new().with_method(StrategyKind::Http);
        scripted.script("https://oliveyoung.co.kr/goods/A1", ScriptedResponse::NotFound);
        scanners.register("oliveyoung", Arc::new(scripted));

        let pool = Arc::new(BrowserPool::new(PoolConfig { size: 1, webdriver_url: "http://localhost:4444".into() }));
        let single_shot = SingleShotScanner::new(pool, "http://localhost:4444");

        let banners = vec![Banner {
            id: Uuid::new_v4(),
            product_set_id: Some(product_set_id),
            start_date: Utc::now(),
            end_date: Utc::now(),
            is_active: true,
        }];

        let node = MonitorNode::new(
            MonitorKind::Banner,
            Arc::new(FixedBanners(banners)),
            catalog,
            scanners,
            single_shot,
            AlertFilter::default(),
            None,
            dir.path(),
        );

        let outcome = node.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(outcome.data["scanned"], json!(1));
        assert_eq!(outcome.data["failures"], json!(1));
        assert_eq!(outcome.data["alerted"], json!(false));
    }

    #[test]
    fn excluded_platform_is_suppressed() {
        let filter = AlertFilter {
            excluded_platforms: vec!["oliveyoung".into()],
            quiet_hours: None,
        };
        assert!(filter.suppresses("oliveyoung", NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!filter.suppresses("musinsa", NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }

    #[test]
    fn quiet_hours_window_suppresses_within_range() {
        let filter = AlertFilter {
            excluded_platforms: Vec::new(),
            quiet_hours: Some((NaiveTime::from_hms_opt(22, 0, 0).unwrap(), NaiveTime::from_hms_opt(6, 0, 0).unwrap())),
        };
        assert!(filter.suppresses("oliveyoung", NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(filter.suppresses("oliveyoung", NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
        assert!(!filter.suppresses("oliveyoung", NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
    }
}
