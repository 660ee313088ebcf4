// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fetch node (§4.6): seeds `original_products` and opens the writer.

use async_trait::async_trait;
use rv_core::{PlatformId, ProductSet, SaleStatus};
use rv_error::RvError;
use rv_repository::{ProductFilter, ProductRepository};
use rv_runtime::{NodeContext, NodeOutcome, TypedNode, ValidationOutcome};
use rv_stream::ResultWriter;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Ceiling applied when a job leaves `max_limit` unset.
const DEFAULT_MAX_LIMIT: usize = 1_000;

/// Reads the catalog slice a job validates and opens its result writer.
///
/// Shared-state writes: `original_products`, `result_writer` (§5: Fetch owns
/// both keys).
pub struct FetchNode {
    repo: Arc<dyn ProductRepository>,
    output_dir: PathBuf,
}

impl FetchNode {
    /// Build a Fetch node reading through `repo`, writing artifacts under
    /// `output_dir`.
    #[must_use]
    pub fn new(repo: Arc<dyn ProductRepository>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl TypedNode for FetchNode {
    fn type_name(&self) -> &str {
        "fetch"
    }

    fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    async fn execute(&self, _input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let filter = build_filter(&ctx.platform, &ctx.params);
        let products = self.repo.find(&filter).await?;

        ctx.shared.set_original_products(products.clone()).await;

        let writer = Arc::new(ResultWriter::new(self.output_dir.clone(), ctx.platform.as_str(), &ctx.job_id));
        ctx.shared.set_result_writer(Arc::clone(&writer)).await;

        Ok(NodeOutcome::success(json!({
            "products": products,
            "count": products.len(),
        })))
    }
}

fn build_filter(platform: &PlatformId, params: &std::collections::HashMap<String, Value>) -> ProductFilter {
    ProductFilter {
        platform: Some(platform.clone()),
        link_url_pattern: params.get("link_url_pattern").and_then(Value::as_str).map(String::from),
        sale_status: params
            .get("sale_status")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_value::<SaleStatus>(json!(s)).ok()),
        product_id: params.get("product_id").and_then(Value::as_str).map(String::from),
        exclude_auto_crawled: params.get("exclude_auto_crawled").and_then(Value::as_bool).unwrap_or(false),
        limit: params.get("limit").and_then(Value::as_u64).map(|v| v as usize),
        max_limit: params.get("max_limit").and_then(Value::as_u64).map(|v| v as usize).unwrap_or(DEFAULT_MAX_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_config::{ConcurrencyConfig, MemoryManagementConfig, PlatformConfig, RateLimitConfig, ScanConfig, Strategy, StrategyKind, UpdateExclusions, UrlPattern, WorkflowConfig};
    use rv_repository::InMemoryCatalog;
    use rv_runtime::SharedState;
    use std::collections::HashMap;
    use uuid::Uuid;

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
            strategies: vec![Strategy { kind: StrategyKind::Browser, options: Value::Null }],
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

    fn ctx() -> NodeContext {
        NodeContext {
            job_id: "job-1".into(),
            workflow_id: "wf-1".into(),
            platform: PlatformId::new("oliveyoung"),
            platform_config: platform_config(),
            config: HashMap::new(),
            params: HashMap::new(),
            shared: Arc::new(SharedState::new()),
        }
    }

    #[tokio::test]
    async fn execute_seeds_shared_state_and_opens_writer() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(InMemoryCatalog::seeded(vec![product("A"), product("B")]));
        let node = FetchNode::new(repo, dir.path());
        let ctx = ctx();

        let outcome = node.execute(Value::Null, &ctx).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data["count"], json!(2));
        assert!(ctx.shared.original_products().await.is_some());
        assert!(ctx.shared.result_writer().await.is_some());
    }

    #[tokio::test]
    async fn exclude_auto_crawled_filter_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let mut manual = product("A");
        manual.auto_crawled = false;
        let repo = Arc::new(InMemoryCatalog::seeded(vec![product("B"), manual]));
        let node = FetchNode::new(repo, dir.path());
        let mut ctx = ctx();
        ctx.params.insert("exclude_auto_crawled".into(), json!(true));

        let outcome = node.execute(Value::Null, &ctx).await.unwrap();
        assert_eq!(outcome.data["count"], json!(1));
    }
}
