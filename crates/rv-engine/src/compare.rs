// SPDX-License-Identifier: MIT OR Apache-2.0
//! Field-level comparison between a database row and freshly scanned data
//! (§4.6 Compare, reused inline by the Scan batch loop per §4.6 Scan).

use rv_core::{ComparisonFields, ProductSet, ScannedData};

/// Compares `fetch` against `db` field by field.
///
/// Text fields use trimmed string equality. Price fields use integer
/// equality, softened by `price_tolerance_pct` (percent of the DB value,
/// `0.0` meaning exact match) when positive. Exclusion lists do not affect
/// comparison — per §8 scenario 6, an excluded field still reports its true
/// mismatch in the JSONL; the exclusion only keeps the Update node from
/// writing it back.
#[must_use]
pub fn compare_fields(db: &ProductSet, fetch: &ScannedData, price_tolerance_pct: f64) -> ComparisonFields {
    ComparisonFields {
        product_name: db.product_name.trim() == fetch.product_name.trim(),
        thumbnail: db.thumbnail.trim() == fetch.thumbnail.trim(),
        original_price: prices_match(db.original_price, fetch.original_price, price_tolerance_pct),
        discounted_price: prices_match(db.discounted_price, fetch.discounted_price, price_tolerance_pct),
        sale_status: db.sale_status == fetch.sale_status,
    }
}

fn prices_match(db_price: i64, fetched_price: i64, tolerance_pct: f64) -> bool {
    if db_price == fetched_price {
        return true;
    }
    if tolerance_pct <= 0.0 {
        return false;
    }
    let allowed = (db_price.abs() as f64) * (tolerance_pct / 100.0);
    ((db_price - fetched_price).abs() as f64) <= allowed
}
