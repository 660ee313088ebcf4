// SPDX-License-Identifier: MIT OR Apache-2.0
//! Update node (§4.6): writes back every record the JSONL marks
//! `status=success ∧ match=false`, honoring per-platform field exclusions,
//! then samples the batch to verify the write landed.

use crate::{jsonl::read_jsonl, require_writer};
use async_trait::async_trait;
use chrono::Utc;
use rv_core::ComparisonRecord;
use rv_error::RvError;
use rv_repository::{HistoryRepository, PriceHistoryRow, ProductRepository, ReviewHistoryRow, UpdatePayload, UpdateRepository};
use rv_runtime::{NodeContext, NodeOutcome, TypedNode, ValidationOutcome};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Rows sampled for post-write verification.
const VERIFY_SAMPLE_SIZE: usize = 5;

/// Reads the finalized JSONL, writes back mismatched rows excluding the
/// platform's `skip_fields`, and records per-row history. History failures
/// are logged and otherwise ignored — they must never fail the node (§4.6).
pub struct UpdateNode {
    products: Arc<dyn ProductRepository>,
    updates: Arc<dyn UpdateRepository>,
    history: Arc<dyn HistoryRepository>,
}

impl UpdateNode {
    /// Build an Update node over the three repository traits it writes
    /// through.
    #[must_use]
    pub fn new(products: Arc<dyn ProductRepository>, updates: Arc<dyn UpdateRepository>, history: Arc<dyn HistoryRepository>) -> Self {
        Self { products, updates, history }
    }
}

#[async_trait]
impl TypedNode for UpdateNode {
    fn type_name(&self) -> &str {
        "update"
    }

    fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let writer = require_writer(&ctx.shared).await?;
        writer.flush().await?;
        let records = read_jsonl(writer.path()).await?;
        let skip_fields = &ctx.platform_config.update_exclusions.skip_fields;

        let mismatched: Vec<&ComparisonRecord> = records
            .iter()
            .filter(|r| r.status == rv_core::RecordStatus::Success && !r.matched)
            .collect();

        let mut attempted = Vec::with_capacity(mismatched.len());
        for record in &mismatched {
            let payload = build_payload(record, skip_fields);
            attempted.push((record.product_set_id, payload));
        }

        let batch = self.updates.batch_update(&attempted).await;

        for record in &mismatched {
            self.record_history(record, skip_fields, batch.updated.contains(&record.product_set_id)).await;
        }

        if !batch.errors.is_empty() {
            warn!(count = batch.errors.len(), "update node had per-row failures (batch not aborted)");
        }

        let sample: Vec<Uuid> = batch.updated.iter().take(VERIFY_SAMPLE_SIZE).copied().collect();
        let verified = if sample.is_empty() { Vec::new() } else { self.products.find_by_ids(&sample).await? };

        Ok(NodeOutcome::success(json!({
            "products": input["products"],
            "update_report": {
                "attempted": attempted.len(),
                "updated": batch.updated.len(),
                "errors": batch.errors.len(),
                "verified_sample": verified.len(),
            },
        })))
    }
}

impl UpdateNode {
    async fn record_history(&self, record: &ComparisonRecord, skip_fields: &[String], updated: bool) {
        let Some(fetch) = &record.fetch else { return };

        let status = if updated { "updated" } else { "failed" };
        let review = ReviewHistoryRow {
            product_set_id: record.product_set_id,
            link_url: record.url.clone(),
            status: status.into(),
            comment: format!("fields differing: {}", differing_fields(record)),
            before: json!(record.db),
            after: json!(fetch),
            created_at: Utc::now(),
        };
        if let Err(e) = self.history.insert_review(review).await {
            warn!(error = %e, product_set_id = %record.product_set_id, "review history write failed (ignored)");
        }

        if updated && !skip_fields.iter().any(|f| f == "original_price" || f == "discounted_price") {
            let price_changed = !record.comparison.original_price || !record.comparison.discounted_price;
            if price_changed {
                let price = PriceHistoryRow {
                    product_set_id: record.product_set_id,
                    original_price: fetch.original_price,
                    discount_price: fetch.discounted_price,
                    base_dt: Utc::now().date_naive(),
                    recorded_at: Utc::now(),
                };
                if let Err(e) = self.history.upsert_price(price).await {
                    warn!(error = %e, product_set_id = %record.product_set_id, "price history write failed (ignored)");
                }
            }
        }
    }
}

fn differing_fields(record: &ComparisonRecord) -> String {
    let c = &record.comparison;
    let mut fields = Vec::new();
    if !c.product_name {
        fields.push("product_name");
    }
    if !c.thumbnail {
        fields.push("thumbnail");
    }
    if !c.original_price {
        fields.push("original_price");
    }
    if !c.discounted_price {
        fields.push("discounted_price");
    }
    if !c.sale_status {
        fields.push("sale_status");
    }
    fields.join(",")
}

fn build_payload(record: &ComparisonRecord, skip_fields: &[String]) -> UpdatePayload {
    let mut payload = UpdatePayload::default();
    let Some(fetch) = &record.fetch else { return payload };
    let skip = |field: &str| skip_fields.iter().any(|f| f == field);

    if !record.comparison.product_name && !skip("product_name") {
        payload.fields.insert("product_name".into(), json!(fetch.product_name));
    }
    if !record.comparison.thumbnail && !skip("thumbnail") {
        payload.fields.insert("thumbnail".into(), json!(fetch.thumbnail));
    }
    if !record.comparison.original_price && !skip("original_price") {
        payload.fields.insert("original_price".into(), json!(fetch.original_price));
    }
    if !record.comparison.discounted_price && !skip("discounted_price") {
        payload.fields.insert("discounted_price".into(), json!(fetch.discounted_price));
    }
    if !record.comparison.sale_status && !skip("sale_status") {
        payload.fields.insert("sale_status".into(), json!(fetch.sale_status));
    }
    payload
}
