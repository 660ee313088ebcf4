// SPDX-License-Identifier: MIT OR Apache-2.0
//! Storage interfaces the validation engine depends on but does not own.
//!
//! The relational product database and its repositories live outside this
//! crate's scope — here we define the trait boundary the Fetch and Update
//! nodes call through, plus in-memory implementations used by tests and
//! local runs.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rv_core::{PlatformId, ProductSet, SaleStatus};
use rv_error::RvError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Filter applied by the Fetch node when pulling a catalog slice.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Platform to fetch for.
    pub platform: Option<PlatformId>,
    /// SQL `ILIKE`-style pattern matched against `link_url`.
    pub link_url_pattern: Option<String>,
    /// Restrict to one sale status.
    pub sale_status: Option<SaleStatus>,
    /// Restrict to one product id.
    pub product_id: Option<String>,
    /// Drop rows where `auto_crawled == true`.
    pub exclude_auto_crawled: bool,
    /// Page size requested per call; `None` means "stream all via
    /// pagination up to `max_limit`".
    pub limit: Option<usize>,
    /// Hard ceiling regardless of `limit`.
    pub max_limit: usize,
}

/// A sparse set of field updates for one catalog row, already filtered
/// through the platform's `skip_fields` exclusion list.
#[derive(Debug, Clone, Default)]
pub struct UpdatePayload {
    /// Field name → new JSON value.
    pub fields: BTreeMap<String, Value>,
}

/// One attempted update's outcome, aggregated by [`UpdateRepository::batch_update`].
#[derive(Debug, Clone)]
pub struct BatchUpdateOutcome {
    /// Rows successfully written.
    pub updated: Vec<Uuid>,
    /// Per-row failures; does not abort the batch.
    pub errors: Vec<(Uuid, String)>,
}

/// Read access to the product catalog.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Fetch products matching `filter`.
    async fn find(&self, filter: &ProductFilter) -> Result<Vec<ProductSet>, RvError>;

    /// Re-read a set of rows by id — used by the Update node to verify a
    /// sample of writes after the batch commits.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ProductSet>, RvError>;
}

/// Write access to the product catalog, scoped to validation updates.
#[async_trait]
pub trait UpdateRepository: Send + Sync {
    /// Apply a batch of sparse updates. Never fails wholesale: per-row
    /// failures are reported in [`BatchUpdateOutcome::errors`] and do not
    /// stop the remaining rows from being attempted.
    async fn batch_update(&self, updates: &[(Uuid, UpdatePayload)]) -> BatchUpdateOutcome;
}

/// One append-only review-history row, written for every attempted update
/// regardless of whether fields actually changed.
#[derive(Debug, Clone)]
pub struct ReviewHistoryRow {
    /// Row being reviewed.
    pub product_set_id: Uuid,
    /// Detail URL at review time.
    pub link_url: String,
    /// `"updated"` or `"unchanged"` or an error string.
    pub status: String,
    /// Free-text comment (e.g. which fields changed).
    pub comment: String,
    /// Snapshot of the row before the update.
    pub before: Value,
    /// Snapshot of the row after the update.
    pub after: Value,
    /// Wall-clock time the row was written.
    pub created_at: DateTime<Utc>,
}

/// One UPSERTed price-history row: one canonical price per
/// `(product_set_id, date)`.
#[derive(Debug, Clone)]
pub struct PriceHistoryRow {
    /// Row the price belongs to.
    pub product_set_id: Uuid,
    /// New list price.
    pub original_price: i64,
    /// New sale price.
    pub discount_price: i64,
    /// Calendar date the price is recorded against.
    pub base_dt: NaiveDate,
    /// Wall-clock time the row was written.
    pub recorded_at: DateTime<Utc>,
}

/// Append-only audit trail for update attempts.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Insert a review-history row. Always called for every attempted
    /// update; failures here must never fail the Update node.
    async fn insert_review(&self, row: ReviewHistoryRow) -> Result<(), RvError>;

    /// UPSERT a price-history row by `(product_set_id, base_dt)`.
    async fn upsert_price(&self, row: PriceHistoryRow) -> Result<(), RvError>;
}

/// Promotional banner rows consulted by the monitor nodes (§4.9). Never
/// written to by the validation engine.
#[derive(Debug, Clone)]
pub struct Banner {
    /// Banner id.
    pub id: Uuid,
    /// Linked catalog row, if any.
    pub product_set_id: Option<Uuid>,
    /// Window start.
    pub start_date: DateTime<Utc>,
    /// Window end.
    pub end_date: DateTime<Utc>,
    /// Whether the banner is currently flagged active.
    pub is_active: bool,
}

/// Read access to banners/pick-sections/collabo listings for monitor jobs.
#[async_trait]
pub trait BannerRepository: Send + Sync {
    /// All banners currently flagged active.
    async fn active(&self) -> Result<Vec<Banner>, RvError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations for tests and local runs.
// ---------------------------------------------------------------------------

/// A `Mutex`-guarded in-memory catalog, implementing both repository read
/// and write traits. Intended for tests, not production use.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    rows: Mutex<BTreeMap<Uuid, ProductSet>>,
}

impl InMemoryCatalog {
    /// Seed the catalog with a fixed set of rows.
    #[must_use]
    pub fn seeded(rows: Vec<ProductSet>) -> Self {
        let map = rows.into_iter().map(|r| (r.product_set_id, r)).collect();
        Self { rows: Mutex::new(map) }
    }
}

#[async_trait]
impl ProductRepository for InMemoryCatalog {
    async fn find(&self, filter: &ProductFilter) -> Result<Vec<ProductSet>, RvError> {
        let rows = self.rows.lock().expect("catalog lock poisoned");
        let mut out: Vec<ProductSet> = rows
            .values()
            .filter(|p| filter.platform.as_ref().map_or(true, |pl| &p.platform == pl))
            .filter(|p| {
                filter
                    .link_url_pattern
                    .as_ref()
                    .map_or(true, |pat| p.link_url.contains(pat.trim_matches('%')))
            })
            .filter(|p| filter.sale_status.as_ref().map_or(true, |s| p.sale_status == *s))
            .filter(|p| filter.product_id.as_ref().map_or(true, |id| &p.product_id == id))
            .filter(|p| !(filter.exclude_auto_crawled && p.auto_crawled))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.product_set_id.cmp(&b.product_set_id));
        let cap = filter.limit.unwrap_or(filter.max_limit).min(filter.max_limit.max(1));
        out.truncate(cap);
        Ok(out)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<ProductSet>, RvError> {
        let rows = self.rows.lock().expect("catalog lock poisoned");
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }
}

#[async_trait]
impl UpdateRepository for InMemoryCatalog {
    async fn batch_update(&self, updates: &[(Uuid, UpdatePayload)]) -> BatchUpdateOutcome {
        let mut rows = self.rows.lock().expect("catalog lock poisoned");
        let mut outcome = BatchUpdateOutcome {
            updated: Vec::new(),
            errors: Vec::new(),
        };
        for (id, payload) in updates {
            match rows.get_mut(id) {
                Some(row) => {
                    apply_payload(row, payload);
                    outcome.updated.push(*id);
                }
                None => outcome.errors.push((*id, "no such product_set_id".into())),
            }
        }
        outcome
    }
}

fn apply_payload(row: &mut ProductSet, payload: &UpdatePayload) {
    if let Some(v) = payload.fields.get("product_name").and_then(Value::as_str) {
        row.product_name = v.to_string();
    }
    if let Some(v) = payload.fields.get("thumbnail").and_then(Value::as_str) {
        row.thumbnail = v.to_string();
    }
    if let Some(v) = payload.fields.get("original_price").and_then(Value::as_i64) {
        row.original_price = v;
    }
    if let Some(v) = payload.fields.get("discounted_price").and_then(Value::as_i64) {
        row.discounted_price = v;
    }
    if let Some(v) = payload.fields.get("sale_status").and_then(|v| serde_json::from_value(v.clone()).ok()) {
        row.sale_status = v;
    }
}

/// In-memory history sink recording every write for assertion in tests.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    reviews: Mutex<Vec<ReviewHistoryRow>>,
    prices: Mutex<BTreeMap<(Uuid, NaiveDate), PriceHistoryRow>>,
}

impl InMemoryHistory {
    /// Snapshot of all review rows written so far.
    #[must_use]
    pub fn reviews(&self) -> Vec<ReviewHistoryRow> {
        self.reviews.lock().expect("history lock poisoned").clone()
    }

    /// Snapshot of all price rows written so far.
    #[must_use]
    pub fn prices(&self) -> Vec<PriceHistoryRow> {
        self.prices.lock().expect("history lock poisoned").values().cloned().collect()
    }
}

#[async_trait]
impl HistoryRepository for InMemoryHistory {
    async fn insert_review(&self, row: ReviewHistoryRow) -> Result<(), RvError> {
        self.reviews.lock().expect("history lock poisoned").push(row);
        Ok(())
    }

    async fn upsert_price(&self, row: PriceHistoryRow) -> Result<(), RvError> {
        self.prices
            .lock()
            .expect("history lock poisoned")
            .insert((row.product_set_id, row.base_dt), row);
        Ok(())
    }
}

impl Clone for ReviewHistoryRow {
    fn clone(&self) -> Self {
        Self {
            product_set_id: self.product_set_id,
            link_url: self.link_url.clone(),
            status: self.status.clone(),
            comment: self.comment.clone(),
            before: self.before.clone(),
            after: self.after.clone(),
            created_at: self.created_at,
        }
    }
}

impl Clone for PriceHistoryRow {
    fn clone(&self) -> Self {
        Self {
            product_set_id: self.product_set_id,
            original_price: self.original_price,
            discount_price: self.discount_price,
            base_dt: self.base_dt,
            recorded_at: self.recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: Uuid, price: i64) -> ProductSet {
        ProductSet {
            product_set_id: id,
            product_id: "A".into(),
            brand_id: "b1".into(),
            platform: PlatformId::new("oliveyoung"),
            link_url: "https://example.com/goods/A".into(),
            product_name: "토너".into(),
            thumbnail: String::new(),
            original_price: price,
            discounted_price: price,
            sale_status: SaleStatus::OnSale,
            auto_crawled: true,
        }
    }

    #[tokio::test]
    async fn batch_update_reports_missing_rows_without_aborting() {
        let id = Uuid::new_v4();
        let catalog = InMemoryCatalog::seeded(vec![row(id, 1000)]);
        let missing = Uuid::new_v4();
        let mut payload = UpdatePayload::default();
        payload.fields.insert("discounted_price".into(), Value::from(900));
        let outcome = catalog
            .batch_update(&[(id, payload.clone()), (missing, payload)])
            .await;
        assert_eq!(outcome.updated, vec![id]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].0, missing);
    }

    #[tokio::test]
    async fn find_respects_exclude_auto_crawled() {
        let id = Uuid::new_v4();
        let catalog = InMemoryCatalog::seeded(vec![row(id, 1000)]);
        let filter = ProductFilter {
            exclude_auto_crawled: true,
            max_limit: 100,
            ..Default::default()
        };
        let found = catalog.find(&filter).await.unwrap();
        assert!(found.is_empty());
    }
}
