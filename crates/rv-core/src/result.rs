// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::{PlatformId, ProductSet, ScannedData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Outcome of a single product's pass through Scan/Validate/Compare.
///
/// Invariant: `status != Success => match == false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// The product was scanned and fields could be compared.
    Success,
    /// The scan itself errored out (network, extraction, browser).
    Failed,
    /// The platform confirmed the product no longer exists.
    NotFound,
}

/// Which node produced a [`ComparisonRecord`] — determines the JSONL
/// timestamp key used when the record is serialized to a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStage {
    /// Emitted by the Scan node — `extracted_at`.
    Scanned,
    /// Emitted by the Validate node — `validated_at`.
    Validated,
    /// Emitted by the Compare node — `compared_at`.
    Compared,
}

impl RecordStage {
    fn timestamp_key(self) -> &'static str {
        match self {
            Self::Scanned => "extracted_at",
            Self::Validated => "validated_at",
            Self::Compared => "compared_at",
        }
    }
}

/// Per-field boolean comparison between the database row and the freshly
/// scanned data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonFields {
    /// `true` iff `db.product_name == fetch.product_name` (trimmed).
    pub product_name: bool,
    /// `true` iff thumbnails match, subject to platform exclusions.
    pub thumbnail: bool,
    /// `true` iff original prices match, subject to tolerance.
    pub original_price: bool,
    /// `true` iff discounted prices match, subject to tolerance.
    pub discounted_price: bool,
    /// `true` iff sale statuses match.
    pub sale_status: bool,
}

impl ComparisonFields {
    /// `true` iff every compared field matched.
    #[must_use]
    pub fn all_match(&self) -> bool {
        self.product_name
            && self.thumbnail
            && self.original_price
            && self.discounted_price
            && self.sale_status
    }
}

/// One line of the JSONL validation artifact (§3, §6).
///
/// The same shape is reused for `SingleScanResult`, `SingleValidationResult`,
/// and `SingleComparisonResult` — they differ only in which node wrote them
/// and which `stage` timestamp key is serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRecord {
    /// Catalog row id.
    pub product_set_id: Uuid,
    /// Platform-native product id.
    pub product_id: String,
    /// Detail-page URL that was scanned.
    pub url: String,
    /// Originating platform.
    pub platform: PlatformId,
    /// Database snapshot at fetch time.
    pub db: ProductSet,
    /// Freshly scraped data, or `None` when `status != Success`.
    pub fetch: Option<ScannedData>,
    /// Per-field comparison result.
    pub comparison: ComparisonFields,
    /// `true` iff every compared field matched (and `status == Success`).
    #[serde(rename = "match")]
    pub matched: bool,
    /// Outcome of this product's scan.
    pub status: RecordStatus,
    /// Error message when `status != Success`.
    pub error: Option<String>,
    /// When this node finished processing the product.
    pub timestamp: DateTime<Utc>,
    /// Which node produced this record.
    pub stage: RecordStage,
}

impl ComparisonRecord {
    /// Build a `not_found` record: no comparison is meaningful.
    #[must_use]
    pub fn not_found(db: ProductSet, url: String, platform: PlatformId, stage: RecordStage) -> Self {
        Self {
            product_set_id: db.product_set_id,
            product_id: db.product_id.clone(),
            url,
            platform,
            db,
            fetch: None,
            comparison: ComparisonFields::default(),
            matched: false,
            status: RecordStatus::NotFound,
            error: None,
            timestamp: Utc::now(),
            stage,
        }
    }

    /// Build a `failed` record from a scan-layer error.
    #[must_use]
    pub fn failed(db: ProductSet, url: String, platform: PlatformId, stage: RecordStage, error: impl Into<String>) -> Self {
        Self {
            product_set_id: db.product_set_id,
            product_id: db.product_id.clone(),
            url,
            platform,
            db,
            fetch: None,
            comparison: ComparisonFields::default(),
            matched: false,
            status: RecordStatus::Failed,
            error: Some(error.into()),
            timestamp: Utc::now(),
            stage,
        }
    }

    /// Serialize into the dense line-oriented JSON object the writer emits,
    /// keying the timestamp field by `stage` rather than hard-coding one name.
    #[must_use]
    pub fn to_line_value(&self) -> Value {
        let mut value = json!({
            "product_set_id": self.product_set_id,
            "product_id": self.product_id,
            "url": self.url,
            "platform": self.platform,
            "db": self.db,
            "fetch": self.fetch,
            "comparison": self.comparison,
            "match": self.matched,
            "status": self.status,
            "error": self.error,
        });
        if let Value::Object(ref mut map) = value {
            map.insert(self.stage.timestamp_key().to_string(), json!(self.timestamp));
        }
        value
    }
}
