// SPDX-License-Identifier: MIT OR Apache-2.0
//! Uniform scan interface over browser-driven and API-driven extraction.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod strategies;
pub mod testing;

use async_trait::async_trait;
use rv_browser_pool::Context;
use rv_config::StrategyKind;
use rv_core::ScannedData;
use rv_error::RvError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Outcome of one [`PlatformScanner::scan`] call.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// Normalized product attributes, or `None` when not found.
    pub data: Option<ScannedData>,
    /// `true` when the platform clearly reported the product missing —
    /// never an error, never counted toward consecutive failures.
    pub is_not_found: bool,
    /// Which strategy actually served this scan.
    pub source: StrategyKind,
}

impl ScanOutcome {
    /// Build a successful outcome carrying scanned data.
    #[must_use]
    pub fn found(data: ScannedData, source: StrategyKind) -> Self {
        Self {
            data: Some(data),
            is_not_found: false,
            source,
        }
    }

    /// Build a not-found outcome.
    #[must_use]
    pub fn not_found(source: StrategyKind) -> Self {
        Self {
            data: None,
            is_not_found: true,
            source,
        }
    }
}

/// A platform-specific scanner: one uniform `scan` call over whichever
/// back-end (browser, HTTP, GraphQL) that platform's strategy list prefers.
///
/// Scanners never own browsers or pages — a live [`Context`] is borrowed for
/// the duration of one `scan` call when [`scan_method`](Self::scan_method)
/// is [`StrategyKind::Browser`]; it is ignored otherwise.
#[async_trait]
pub trait PlatformScanner: Send + Sync {
    /// Which back-end this scanner uses.
    fn scan_method(&self) -> StrategyKind;

    /// Scan one detail-page URL, returning normalized data or a not-found
    /// signal. Transport/extraction failures are returned as `Err`, never
    /// folded into `ScanOutcome` — §7 classifies them at the node boundary.
    async fn scan(&self, url: &str, context: Option<&mut Context>) -> Result<ScanOutcome, RvError>;
}

/// Recognizes the platform-agnostic signs that a product page reports its
/// product missing, per §4.3: 404 status, known Korean "deleted" tokens, a
/// `_source=not_found` query marker, or a redirect away from the expected
/// detail-page shape.
#[must_use]
pub fn looks_not_found(status: Option<u16>, body: &str, final_url: &str, requested_url: &str) -> bool {
    if status == Some(404) {
        return true;
    }
    if body.contains("삭제된 상품") || body.contains("상품 정보 없음") {
        return true;
    }
    if requested_url.contains("_source=not_found") || final_url.contains("_source=not_found") {
        return true;
    }
    let requested_path = requested_url.split('?').next().unwrap_or(requested_url);
    let final_path = final_url.split('?').next().unwrap_or(final_url);
    if !final_path.is_empty() && final_path != requested_path && !final_path.contains("/goods/") && !final_path.contains("/product") {
        return true;
    }
    false
}

/// Registry resolving a platform id to its [`PlatformScanner`].
///
/// When a platform has no registered scanner, callers should fall back to
/// [`testing::DefensiveFallbackScanner`] rather than treat the job as
/// unscannable — per §4.3, scanners never panic on an unrecognized
/// platform.
#[derive(Default, Clone)]
pub struct PlatformScannerRegistry {
    scanners: Arc<RwLock<HashMap<String, Arc<dyn PlatformScanner>>>>,
}

impl PlatformScannerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scanner under a platform name, replacing any previous one.
    pub fn register(&self, platform: impl Into<String>, scanner: Arc<dyn PlatformScanner>) {
        self.scanners.write().expect("registry lock poisoned").insert(platform.into(), scanner);
    }

    /// Look up the scanner for a platform, if registered.
    #[must_use]
    pub fn get(&self, platform: &str) -> Option<Arc<dyn PlatformScanner>> {
        self.scanners.read().expect("registry lock poisoned").get(platform).cloned()
    }

    /// All platforms with a registered scanner.
    #[must_use]
    pub fn platforms(&self) -> Vec<String> {
        self.scanners.read().expect("registry lock poisoned").keys().cloned().collect()
    }
}
