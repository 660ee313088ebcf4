// SPDX-License-Identifier: MIT OR Apache-2.0
//! Save node (§4.6): the already-streamed JSONL is the durable artifact —
//! Save's job is to close the writer (if still open) and publish the
//! summary other nodes and the caller read back.

use crate::require_writer;
use async_trait::async_trait;
use rv_error::RvError;
use rv_runtime::{NodeContext, NodeOutcome, SaveResult, TypedNode, ValidationOutcome};
use serde_json::{json, Value};

/// Finalizes the job's writer and publishes [`SaveResult`] in shared state.
///
/// Idempotent: [`rv_stream::ResultWriter::finalize`] returns the same
/// counters on a repeat call, so running Save twice on the same JSONL
/// produces an identical summary (§8).
pub struct SaveNode;

#[async_trait]
impl TypedNode for SaveNode {
    fn type_name(&self) -> &str {
        "save"
    }

    fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let writer = require_writer(&ctx.shared).await?;
        let outcome = writer.finalize().await?;

        let result = SaveResult {
            file_path: outcome.file_path.clone(),
            summary: outcome.summary.clone(),
        };
        ctx.shared.set_save_result(result).await;

        Ok(NodeOutcome::success(json!({
            "products": input["products"],
            "file_path": outcome.file_path,
            "record_count": outcome.record_count,
            "summary": outcome.summary,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_config::{ConcurrencyConfig, MemoryManagementConfig, PlatformConfig, RateLimitConfig, ScanConfig, Strategy, StrategyKind, UpdateExclusions, UrlPattern, WorkflowConfig};
    use rv_core::{ComparisonRecord, PlatformId, ProductSet, RecordStage, RecordStatus, SaleStatus};
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
    async fn finalizes_writer_and_publishes_save_result() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, writer) = ctx_with_writer(dir.path()).await;

        let mut rec = ComparisonRecord::not_found(db_row(), "u".into(), PlatformId::new("oliveyoung"), RecordStage::Scanned);
        rec.status = RecordStatus::Success;
        rec.matched = true;
        writer.append(&rec).await.unwrap();

        let node = SaveNode;
        let outcome = node.execute(json!({"products": []}), &ctx).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data["record_count"], json!(1));
        assert!(ctx.shared.save_result().await.is_some());
    }

    #[tokio::test]
    async fn repeat_save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, writer) = ctx_with_writer(dir.path()).await;
        writer.initialize().await.unwrap();

        let node = SaveNode;
        let first = node.execute(json!({"products": []}), &ctx).await.unwrap();
        let second = node.execute(json!({"products": []}), &ctx).await.unwrap();
        assert_eq!(first.data["record_count"], second.data["record_count"]);
    }
}
