// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed shared-state bag for one pipeline run (§9 design notes).
//!
//! The three canonical keys (`original_products`, `result_writer`,
//! `save_result`) get dedicated typed slots rather than living in the
//! generic overflow map, so nodes that read them get a compile-time
//! checked type instead of a runtime `Value` cast. Anything else a node
//! wants to hand to a later node goes through the overflow map.

use rv_core::ProductSet;
use rv_stream::{ResultWriter, Summary};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Summary published by the Save node (§4.6).
#[derive(Debug, Clone)]
pub struct SaveResult {
    /// Finalized JSONL artifact path.
    pub file_path: PathBuf,
    /// Per-status / match counters.
    pub summary: Summary,
}

/// Browser-pool activity published by the Scan node (§4.7), aggregated
/// across every batch the node ran.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Products processed across all batches.
    pub processed: u64,
    /// Full context (WebDriver session) rebuilds, rotation-triggered and
    /// recovery-triggered combined.
    pub context_rotations: u64,
    /// Page-only rotations within a still-live context.
    pub page_rotations: u64,
    /// Context rebuilds specifically triggered by consecutive scan failures.
    pub session_recoveries: u64,
}

/// Per-job state visible to every node after the one that writes it.
///
/// Single-writer per key: Fetch owns `original_products` and
/// `result_writer`; Scan owns `scan_report`; Save owns `save_result`.
/// Readers borrow clones of the `Arc`/value rather than holding the lock.
#[derive(Default)]
pub struct SharedState {
    original_products: RwLock<Option<Arc<Vec<ProductSet>>>>,
    result_writer: RwLock<Option<Arc<ResultWriter>>>,
    scan_report: RwLock<Option<ScanReport>>,
    save_result: RwLock<Option<SaveResult>>,
    overflow: RwLock<HashMap<String, Value>>,
}

impl SharedState {
    /// Build an empty shared-state bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch writes the product set it read from the database.
    pub async fn set_original_products(&self, products: Vec<ProductSet>) {
        *self.original_products.write().await = Some(Arc::new(products));
    }

    /// Scan/Compare read the products Fetch loaded.
    pub async fn original_products(&self) -> Option<Arc<Vec<ProductSet>>> {
        self.original_products.read().await.clone()
    }

    /// Fetch exposes the writer it opened so later nodes can append/finalize
    /// through the same handle.
    pub async fn set_result_writer(&self, writer: Arc<ResultWriter>) {
        *self.result_writer.write().await = Some(writer);
    }

    /// Scan/Save/Update read the writer Fetch opened.
    pub async fn result_writer(&self) -> Option<Arc<ResultWriter>> {
        self.result_writer.read().await.clone()
    }

    /// Scan publishes the batch-level browser-pool counters it accumulated.
    pub async fn set_scan_report(&self, report: ScanReport) {
        *self.scan_report.write().await = Some(report);
    }

    /// Worker metrics read the counters Scan published.
    pub async fn scan_report(&self) -> Option<ScanReport> {
        self.scan_report.read().await.clone()
    }

    /// Save publishes its computed summary.
    pub async fn set_save_result(&self, result: SaveResult) {
        *self.save_result.write().await = Some(result);
    }

    /// Notify reads the summary Save published.
    pub async fn save_result(&self) -> Option<SaveResult> {
        self.save_result.read().await.clone()
    }

    /// Generic overflow slot for node-specific data that doesn't warrant a
    /// dedicated typed field.
    pub async fn set_overflow(&self, key: impl Into<String>, value: Value) {
        self.overflow.write().await.insert(key.into(), value);
    }

    /// Read an overflow value previously set under `key`.
    pub async fn overflow(&self, key: &str) -> Option<Value> {
        self.overflow.read().await.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_core::{PlatformId, SaleStatus};
    use uuid::Uuid;

    fn sample_product() -> ProductSet {
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

    #[tokio::test]
    async fn original_products_round_trips() {
        let state = SharedState::new();
        assert!(state.original_products().await.is_none());
        state.set_original_products(vec![sample_product()]).await;
        let products = state.original_products().await.unwrap();
        assert_eq!(products.len(), 1);
    }

    #[tokio::test]
    async fn scan_report_round_trips() {
        let state = SharedState::new();
        assert!(state.scan_report().await.is_none());
        state
            .set_scan_report(ScanReport {
                processed: 4,
                context_rotations: 2,
                page_rotations: 5,
                session_recoveries: 1,
            })
            .await;
        let report = state.scan_report().await.unwrap();
        assert_eq!(report.context_rotations, 2);
        assert_eq!(report.session_recoveries, 1);
    }

    #[tokio::test]
    async fn overflow_keys_are_independent() {
        let state = SharedState::new();
        state.set_overflow("a", Value::from(1)).await;
        state.set_overflow("b", Value::from(2)).await;
        assert_eq!(state.overflow("a").await, Some(Value::from(1)));
        assert_eq!(state.overflow("b").await, Some(Value::from(2)));
        assert_eq!(state.overflow("c").await, None);
    }
}
