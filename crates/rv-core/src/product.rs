// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::PlatformId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical sale-status values every platform scanner must map onto.
///
/// Scanner mapping tables are platform-specific (each site has its own
/// soldout/discontinued tokens) but must be surjective onto this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Currently purchasable.
    OnSale,
    /// Out of stock.
    SoldOut,
    /// Listing withdrawn by the seller (distinct from not-found: the row
    /// still exists in the catalog).
    OffSale,
    /// Orderable ahead of a future release.
    PreOrder,
    /// Orderable despite current unavailability.
    Backorder,
}

/// One catalog record as stored in the product database.
///
/// Read-only to the engine: the only path that mutates it is the Update
/// node (§4.6), and only through [`rv_repository::UpdateRepository`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSet {
    /// Primary key of the catalog row.
    pub product_set_id: Uuid,
    /// Platform-native product identifier.
    pub product_id: String,
    /// Owning brand id.
    pub brand_id: String,
    /// Originating platform.
    pub platform: PlatformId,
    /// Canonical detail-page URL.
    pub link_url: String,
    /// Product display name.
    pub product_name: String,
    /// Absolute thumbnail URL, or empty string when unknown.
    pub thumbnail: String,
    /// List price, non-negative integer in minor currency unit.
    pub original_price: i64,
    /// Current sale price, non-negative integer in minor currency unit.
    pub discounted_price: i64,
    /// Current sale status as last recorded in the database.
    pub sale_status: SaleStatus,
    /// Whether this row originated from an automated crawl rather than a
    /// manual catalog entry.
    pub auto_crawled: bool,
}
