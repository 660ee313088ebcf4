// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compare node (§4.6): aggregates the per-field comparisons Scan already
//! streamed into the JSONL. The join against `original_products` happened
//! inline in [`rv_engine::ScanCoordinator`]; this node's own job is the
//! roll-up Scan doesn't compute — match/mismatch/failure totals by status.

use crate::{jsonl::read_jsonl, require_writer};
use async_trait::async_trait;
use rv_core::RecordStatus;
use rv_error::RvError;
use rv_runtime::{NodeContext, NodeOutcome, TypedNode, ValidationOutcome};
use serde_json::{json, Value};

/// Re-reads the JSONL Scan appended and aggregates match/mismatch/failure
/// counts; writes nothing back to the artifact or the database.
pub struct CompareNode;

#[async_trait]
impl TypedNode for CompareNode {
    fn type_name(&self) -> &str {
        "compare"
    }

    fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let writer = require_writer(&ctx.shared).await?;
        writer.flush().await?;
        let records = read_jsonl(writer.path()).await?;

        let mut success = 0u64;
        let mut failed = 0u64;
        let mut not_found = 0u64;
        let mut matched = 0u64;
        let mut mismatched = 0u64;

        for record in &records {
            match record.status {
                RecordStatus::Success => success += 1,
                RecordStatus::Failed => failed += 1,
                RecordStatus::NotFound => not_found += 1,
            }
            if record.matched {
                matched += 1;
            } else {
                mismatched += 1;
            }
        }

        Ok(NodeOutcome::success(json!({
            "products": input["products"],
            "comparison_report": {
                "total": records.len(),
                "success": success,
                "failed": failed,
                "not_found": not_found,
                "match": matched,
                "mismatch": mismatched,
            },
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_config::{ConcurrencyConfig, MemoryManagementConfig, PlatformConfig, RateLimitConfig, ScanConfig, Strategy, StrategyKind, UpdateExclusions, UrlPattern, WorkflowConfig};
    use rv_core::{ComparisonRecord, PlatformId, ProductSet, RecordStage, SaleStatus};
    use rv_runtime::SharedState;
    use rv_stream::ResultWriter;
    use std::collections::HashMap;
    use std::sync::Arc;
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

    fn db_row() -> ProductSet {
        ProductSet {
            product_set_id: Uuid::nil(),
            product_id: "A".into(),
            brand_id: "b1".into(),
            platform: PlatformId::new("oliveyoung"),
            link_url: "https://example.com/goods/A".into(),
            product_name: "토너".into(),
            thumbnail: String::new(),
            original_price: 10_000,
            discounted_price: 8_000,
            sale_status: SaleStatus::OnSale,
            auto_crawled: true,
        }
    }

    async fn ctx_with_writer(dir: &std::path::Path) -> (NodeContext, Arc<ResultWriter>) {
        let writer = Arc::new(ResultWriter::new(dir, "oliveyoung", "job-1"));
        let shared = Arc::new(SharedState::new());
        shared.set_result_writer(Arc::clone(&writer)).await;
        let ctx = NodeContext {
            job_id: "job-1".into(),
            workflow_id: "wf-1".into(),
            platform: PlatformId::new("oliveyoung"),
            platform_config: platform_config(),
            config: HashMap::new(),
            params: HashMap::new(),
            shared,
        };
        (ctx, writer)
    }

    #[tokio::test]
    async fn aggregates_match_and_mismatch_counts() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, writer) = ctx_with_writer(dir.path()).await;

        let mut matched = ComparisonRecord::not_found(db_row(), "u".into(), PlatformId::new("oliveyoung"), RecordStage::Scanned);
        matched.status = RecordStatus::Success;
        matched.matched = true;
        writer.append(&matched).await.unwrap();

        let mut mismatched = matched.clone();
        mismatched.matched = false;
        writer.append(&mismatched).await.unwrap();

        let node = CompareNode;
        let outcome = node.execute(json!({"products": []}), &ctx).await.unwrap();
        assert_eq!(outcome.data["comparison_report"]["total"], json!(2));
        assert_eq!(outcome.data["comparison_report"]["match"], json!(1));
        assert_eq!(outcome.data["comparison_report"]["mismatch"], json!(1));
    }
}
