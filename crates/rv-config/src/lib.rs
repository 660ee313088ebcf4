// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed per-platform settings and the registry that resolves them.
//!
//! Loading `PlatformConfig` from YAML on disk is out of scope for this
//! crate — that lives in the outer service. What lives here is the typed
//! shape itself and the pure operations the engine needs: lookup, URL
//! detection, product-id extraction, and detail-URL templating.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use regex::Regex;
use rv_core::PlatformId;
use rv_error::{ErrorCode, RvError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Which extraction back-end a [`Strategy`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Headless-browser-driven DOM extraction.
    Browser,
    /// Plain HTTP + JSON response parsing.
    Http,
    /// GraphQL request with an embedded query.
    GraphQl,
}

/// One candidate scan strategy. The scanner registry picks the first whose
/// `kind` the platform's scanner implementation supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    /// Back-end kind.
    pub kind: StrategyKind,
    /// Strategy-specific options (GraphQL query text, headers, etc).
    pub options: Value,
}

/// URL shape for one platform: how to recognize, parse, and rebuild detail
/// URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPattern {
    /// Domain suffix used by [`PlatformRegistry::detect_platform`].
    pub domain: String,
    /// Regex matched against a detail URL to extract the product id.
    pub product_id_regex: String,
    /// Capture group index within `product_id_regex` holding the id.
    pub product_id_group: usize,
    /// Template with a `{id}` placeholder used to rebuild a detail URL.
    pub detail_url_template: String,
}

/// Minimum spacing enforced between dequeued job *starts* on one platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum wait, in milliseconds, between job starts.
    pub wait_time_ms: u64,
}

/// Bounds on how many parallel scan batches a Scan node may run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Concurrency used when the job doesn't request one explicitly.
    pub default: usize,
    /// Hard ceiling regardless of what the job requests.
    pub max: usize,
}

/// Knobs bounding long-run memory growth inside the scan loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MemoryManagementConfig {
    /// Recreate the page every N products.
    pub page_rotation_interval: u64,
    /// Recreate the page + context every N products (subsumes page rotation
    /// when both land on the same iteration).
    pub context_rotation_interval: u64,
    /// Whether to request a GC hint at each context rotation.
    pub enable_gc_hints: bool,
}

/// Consecutive scan failures, on one batch, before a forced context rebuild.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 2;

/// Aggregates the three workflow-tuning knobs for one platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Inter-job rate limit.
    pub rate_limit: RateLimitConfig,
    /// Batch concurrency bounds.
    pub concurrency: ConcurrencyConfig,
    /// Page/context rotation policy.
    pub memory_management: MemoryManagementConfig,
    /// Consecutive scan failures before session recovery kicks in.
    pub max_consecutive_failures: u32,
}

/// Fields the Update node must never overwrite for a given platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateExclusions {
    /// Field names excluded from the update payload.
    pub skip_fields: Vec<String>,
    /// Human-readable reason (surfaced in history rows).
    pub reason: String,
}

/// Non-workflow scan knobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Skip capturing a screenshot artifact during browser scans.
    pub skip_screenshot: bool,
}

/// Full typed configuration for one platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Opaque platform name.
    pub platform: PlatformId,
    /// Human-readable display name.
    pub display_name: String,
    /// URL recognition/parsing rules.
    pub url_pattern: UrlPattern,
    /// Ordered list of candidate scan strategies; first matching type wins.
    pub strategies: Vec<Strategy>,
    /// Workflow tuning knobs.
    pub workflow: WorkflowConfig,
    /// Fields the Update node must never overwrite.
    pub update_exclusions: UpdateExclusions,
    /// Scan-specific toggles.
    pub scan_config: ScanConfig,
}

impl PlatformConfig {
    /// First strategy in the ordered list — the scanner registry's default
    /// pick absent any override.
    #[must_use]
    pub fn primary_strategy(&self) -> Option<&Strategy> {
        self.strategies.first()
    }
}

/// Registry of loaded [`PlatformConfig`]s, keyed by platform id.
///
/// Invariant: every registered platform has exactly one config; an
/// exclusion set may be empty but the field itself is never missing.
#[derive(Debug, Default)]
pub struct PlatformRegistry {
    configs: HashMap<PlatformId, PlatformConfig>,
    compiled: HashMap<PlatformId, Regex>,
}

impl PlatformRegistry {
    /// Build a registry from a set of already-parsed configs.
    ///
    /// Fails fast (returns `Err`) if any `url_pattern.product_id_regex`
    /// does not compile — regexes must compile at load time, not lazily on
    /// first use.
    pub fn new(configs: Vec<PlatformConfig>) -> Result<Self, RvError> {
        let mut registry = Self::default();
        for config in configs {
            let regex = Regex::new(&config.url_pattern.product_id_regex).map_err(|e| {
                RvError::new(ErrorCode::ConfigMissing, format!("invalid product id regex: {e}"))
                    .with_context("platform", config.platform.as_str())
            })?;
            registry.compiled.insert(config.platform.clone(), regex);
            registry.configs.insert(config.platform.clone(), config);
        }
        Ok(registry)
    }

    /// Look up a platform's config.
    pub fn load(&self, platform: &PlatformId) -> Result<&PlatformConfig, RvError> {
        self.configs.get(platform).ok_or_else(|| {
            RvError::new(ErrorCode::ConfigMissing, "platform is not registered")
                .with_context("platform", platform.as_str())
        })
    }

    /// Detect which platform a URL belongs to by longest-matching domain.
    ///
    /// Domains are compared as suffixes of the URL's host; when more than
    /// one config's domain matches, the longest (most specific) one wins.
    #[must_use]
    pub fn detect_platform(&self, url: &str) -> Option<PlatformId> {
        let host = url
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or(url);

        self.configs
            .values()
            .filter(|cfg| host.ends_with(cfg.url_pattern.domain.as_str()))
            .max_by_key(|cfg| cfg.url_pattern.domain.len())
            .map(|cfg| cfg.platform.clone())
    }

    /// Extract the product id from a detail URL for a known platform.
    ///
    /// Strips the query string before matching.
    #[must_use]
    pub fn extract_product_id(&self, url: &str, platform: &PlatformId) -> Option<String> {
        let stripped = url.split('?').next().unwrap_or(url);
        let regex = self.compiled.get(platform)?;
        let config = self.configs.get(platform)?;
        regex
            .captures(stripped)?
            .get(config.url_pattern.product_id_group)
            .map(|m| m.as_str().to_string())
    }

    /// Rebuild a detail URL from a product id via the platform's template.
    #[must_use]
    pub fn build_detail_url(&self, product_id: &str, platform: &PlatformId) -> Option<String> {
        let config = self.configs.get(platform)?;
        Some(config.url_pattern.detail_url_template.replace("{id}", product_id))
    }

    /// Fetch the update exclusion set for a platform. Returns an empty set
    /// (never an error) when the platform has none configured.
    #[must_use]
    pub fn update_exclusions(&self, platform: &PlatformId) -> UpdateExclusions {
        self.configs
            .get(platform)
            .map(|c| c.update_exclusions.clone())
            .unwrap_or_default()
    }

    /// All registered platform ids.
    #[must_use]
    pub fn platforms(&self) -> Vec<PlatformId> {
        self.configs.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PlatformConfig {
        PlatformConfig {
            platform: PlatformId::new("oliveyoung"),
            display_name: "Olive Young".into(),
            url_pattern: UrlPattern {
                domain: "oliveyoung.co.kr".into(),
                product_id_regex: r"/goods/(\w+)".into(),
                product_id_group: 1,
                detail_url_template: "https://www.oliveyoung.co.kr/goods/{id}".into(),
            },
            strategies: vec![Strategy {
                kind: StrategyKind::Browser,
                options: Value::Null,
            }],
            workflow: WorkflowConfig {
                rate_limit: RateLimitConfig { wait_time_ms: 500 },
                concurrency: ConcurrencyConfig { default: 2, max: 10 },
                memory_management: MemoryManagementConfig {
                    page_rotation_interval: 20,
                    context_rotation_interval: 50,
                    enable_gc_hints: true,
                },
                max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            },
            update_exclusions: UpdateExclusions {
                skip_fields: vec!["thumbnail".into()],
                reason: "thumbnails are CDN-rotated and noisy".into(),
            },
            scan_config: ScanConfig { skip_screenshot: false },
        }
    }

    #[test]
    fn detect_platform_matches_domain_suffix() {
        let registry = PlatformRegistry::new(vec![sample()]).unwrap();
        let found = registry.detect_platform("https://www.oliveyoung.co.kr/goods/A000123");
        assert_eq!(found, Some(PlatformId::new("oliveyoung")));
    }

    #[test]
    fn extract_product_id_strips_query_string() {
        let registry = PlatformRegistry::new(vec![sample()]).unwrap();
        let id = registry.extract_product_id(
            "https://www.oliveyoung.co.kr/goods/A000123?from=search",
            &PlatformId::new("oliveyoung"),
        );
        assert_eq!(id.as_deref(), Some("A000123"));
    }

    #[test]
    fn build_detail_url_round_trips_product_id() {
        let registry = PlatformRegistry::new(vec![sample()]).unwrap();
        let url = registry.build_detail_url("A000123", &PlatformId::new("oliveyoung"));
        assert_eq!(url.as_deref(), Some("https://www.oliveyoung.co.kr/goods/A000123"));
    }

    #[test]
    fn load_unknown_platform_is_config_missing() {
        let registry = PlatformRegistry::new(vec![sample()]).unwrap();
        let err = registry.load(&PlatformId::new("unknown")).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissing);
    }

    #[test]
    fn exclusions_for_unregistered_platform_are_empty_not_missing() {
        let registry = PlatformRegistry::new(vec![sample()]).unwrap();
        let exclusions = registry.update_exclusions(&PlatformId::new("unknown"));
        assert!(exclusions.skip_fields.is_empty());
    }

    #[test]
    fn invalid_regex_fails_at_load_time() {
        let mut cfg = sample();
        cfg.url_pattern.product_id_regex = "(unterminated".into();
        let err = PlatformRegistry::new(vec![cfg]).unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigMissing);
    }
}
