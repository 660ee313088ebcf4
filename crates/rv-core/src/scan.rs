// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::SaleStatus;
use serde::{Deserialize, Serialize};

/// Freshly scraped attributes for one product, as produced by a
/// [`rv_scanner`](../rv_scanner/index.html) implementation.
///
/// Normalization guarantees (enforced by every scanner, not re-checked
/// here): prices are non-negative; `discounted_price <= original_price`
/// when both are known; a single-price listing sets both fields equal;
/// thumbnails are absolute URLs or the empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedData {
    /// Product display name as currently shown on the platform.
    pub product_name: String,
    /// Absolute thumbnail URL, or empty string.
    pub thumbnail: String,
    /// List price in minor currency unit.
    pub original_price: i64,
    /// Sale price in minor currency unit.
    pub discounted_price: i64,
    /// Current sale status, mapped onto the canonical set.
    pub sale_status: SaleStatus,
}

impl ScannedData {
    /// Returns `true` when the price fields satisfy the scanner-layer
    /// normalization invariant.
    #[must_use]
    pub fn prices_well_formed(&self) -> bool {
        self.original_price >= 0
            && self.discounted_price >= 0
            && self.discounted_price <= self.original_price
    }

    /// Discount rate as a fraction in `[0.0, 1.0]`, or `0.0` when the
    /// original price is zero (avoids division by zero on free items).
    #[must_use]
    pub fn discount_rate(&self) -> f64 {
        if self.original_price <= 0 {
            return 0.0;
        }
        let drop = (self.original_price - self.discounted_price).max(0) as f64;
        drop / self.original_price as f64
    }
}
