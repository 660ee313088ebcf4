// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy for the product validation engine.
//!
//! Every error raised inside the pipeline carries an [`ErrorCode`] (a stable,
//! machine-readable tag), a human-readable message, and arbitrary key-value
//! context. Scanners additionally classify transient vs. terminal failures
//! through [`ErrorCode::is_retryable`] so the scan coordinator knows when to
//! trigger session recovery.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Broad family an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Node input contract violation.
    Validation,
    /// Platform configuration problems.
    Config,
    /// Scanner/browser extraction failures.
    Scan,
    /// Queue and scheduling failures.
    Queue,
    /// Repository (database) failures.
    Repository,
    /// Notification transport failures.
    Notify,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Config => "config",
            Self::Scan => "scan",
            Self::Queue => "queue",
            Self::Repository => "repository",
            Self::Notify => "notify",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that must not
/// change across patch releases — downstream alerting matches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Node input violated its contract; the JSONL is untouched.
    ValidationError,
    /// Platform is not registered in the config registry.
    ConfigMissing,
    /// The product could not be found at the scanned URL.
    ProductNotFound,
    /// The site responded with a bot-challenge page.
    CloudflareBlocked,
    /// Navigation or request failed at the transport layer.
    NetworkError,
    /// The DOM/JSON extractor found the page but not the expected fields.
    ExtractionFailed,
    /// The browser/page/context crashed or disconnected.
    BrowserError,
    /// A repository call failed partially or wholly.
    RepositoryError,
    /// Queue dequeue lost a compare-and-delete race.
    QueueContention,
    /// The outbound notification transport failed.
    NotifyTransportFailed,
    /// Unclassified error, recovered via substring fallback.
    Unknown,
}

impl ErrorCode {
    /// Category this code belongs to.
    #[must_use]
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::ValidationError => ErrorCategory::Validation,
            Self::ConfigMissing => ErrorCategory::Config,
            Self::ProductNotFound
            | Self::CloudflareBlocked
            | Self::NetworkError
            | Self::ExtractionFailed
            | Self::BrowserError => ErrorCategory::Scan,
            Self::RepositoryError => ErrorCategory::Repository,
            Self::QueueContention => ErrorCategory::Queue,
            Self::NotifyTransportFailed => ErrorCategory::Notify,
            Self::Unknown => ErrorCategory::Internal,
        }
    }

    /// Whether this failure should count toward a batch's consecutive-failure
    /// counter and, past the threshold, trigger session recovery.
    ///
    /// `ProductNotFound` is excluded: the platform clearly said so, it is not
    /// a sign of a broken session.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::CloudflareBlocked | Self::NetworkError | Self::BrowserError
        )
    }

    /// Classify a free-text error message using substring fallback.
    ///
    /// Used only when a lower layer could not return a typed error directly
    /// (e.g. a panic message crossing an FFI-like boundary).
    #[must_use]
    pub fn classify_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("not found") || lower.contains("삭제된 상품") || lower.contains("상품 정보 없음") {
            Self::ProductNotFound
        } else if lower.contains("cloudflare") || lower.contains("challenge") {
            Self::CloudflareBlocked
        } else if lower.contains("net::") || lower.contains("timeout") || lower.contains("connection") {
            Self::NetworkError
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A single structured error carrying a stable code, message, and context.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RvError {
    /// Stable machine-readable code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary key-value context (platform, url, product_id, ...).
    pub context: BTreeMap<String, String>,
}

impl RvError {
    /// Construct a new error with no context.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a context key-value pair (builder-style).
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_excludes_not_found() {
        assert!(!ErrorCode::ProductNotFound.is_retryable());
        assert!(ErrorCode::CloudflareBlocked.is_retryable());
        assert!(ErrorCode::NetworkError.is_retryable());
        assert!(ErrorCode::BrowserError.is_retryable());
    }

    #[test]
    fn classify_message_prefers_not_found() {
        assert_eq!(
            ErrorCode::classify_message("상품 정보 없음: redirected"),
            ErrorCode::ProductNotFound
        );
        assert_eq!(
            ErrorCode::classify_message("net::ERR_CONNECTION_RESET"),
            ErrorCode::NetworkError
        );
        assert_eq!(
            ErrorCode::classify_message("Cloudflare challenge detected"),
            ErrorCode::CloudflareBlocked
        );
        assert_eq!(ErrorCode::classify_message("weird glitch"), ErrorCode::Unknown);
    }

    #[test]
    fn error_context_builder() {
        let err = RvError::new(ErrorCode::ProductNotFound, "gone")
            .with_context("platform", "oliveyoung")
            .with_context("product_id", "A");
        assert_eq!(err.context.get("platform").map(String::as_str), Some("oliveyoung"));
    }
}
