// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scripted and defensive scanners used by node/engine tests.
//!
//! These never touch a network or a browser; they let the rest of the
//! pipeline be exercised deterministically, the way
//! `abp-backend-mock::MockBackend` lets the runtime crate be tested without
//! a live agent backend.

use crate::{PlatformScanner, ScanOutcome};
use async_trait::async_trait;
use rv_browser_pool::Context;
use rv_config::StrategyKind;
use rv_core::ScannedData;
use rv_error::{ErrorCode, RvError};
use std::collections::HashMap;
use std::sync::Mutex;

/// One scripted response, keyed by the URL a test calls `scan` with.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Respond as if the product was found.
    Found(ScannedData),
    /// Respond as if the platform reported the product missing.
    NotFound,
    /// Respond with an error.
    Error(RvError),
}

/// A scanner whose responses are pre-recorded per URL, for deterministic
/// node and engine tests. Calling `scan` with an unscripted URL panics —
/// tests should script every URL they exercise.
#[derive(Default)]
pub struct ScriptedScanner {
    method: Option<StrategyKind>,
    responses: Mutex<HashMap<String, ScriptedResponse>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedScanner {
    /// Build an empty scripted scanner reporting as a browser-backed one.
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: Some(StrategyKind::Browser),
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Override the [`StrategyKind`] this scanner reports.
    #[must_use]
    pub fn with_method(mut self, method: StrategyKind) -> Self {
        self.method = Some(method);
        self
    }

    /// Script the response for one URL.
    pub fn script(&self, url: impl Into<String>, response: ScriptedResponse) {
        self.responses.lock().expect("scripted scanner lock poisoned").insert(url.into(), response);
    }

    /// URLs scanned so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("scripted scanner lock poisoned").clone()
    }
}

#[async_trait]
impl PlatformScanner for ScriptedScanner {
    fn scan_method(&self) -> StrategyKind {
        self.method.unwrap_or(StrategyKind::Browser)
    }

    async fn scan(&self, url: &str, _context: Option<&mut Context>) -> Result<ScanOutcome, RvError> {
        self.calls.lock().expect("scripted scanner lock poisoned").push(url.to_string());
        let response = self
            .responses
            .lock()
            .expect("scripted scanner lock poisoned")
            .get(url)
            .cloned()
            .unwrap_or_else(|| {
                ScriptedResponse::Error(
                    RvError::new(ErrorCode::Unknown, "no scripted response for url").with_context("url", url),
                )
            });

        match response {
            ScriptedResponse::Found(data) => Ok(ScanOutcome::found(data, self.scan_method())),
            ScriptedResponse::NotFound => Ok(ScanOutcome::not_found(self.scan_method())),
            ScriptedResponse::Error(e) => Err(e),
        }
    }
}

/// Fallback used when a platform has no registered scanner. Always fails
/// with [`ErrorCode::ConfigMissing`] rather than panicking, so an
/// unconfigured platform degrades to an ordinary failed job instead of
/// crashing the worker.
pub struct DefensiveFallbackScanner;

#[async_trait]
impl PlatformScanner for DefensiveFallbackScanner {
    fn scan_method(&self) -> StrategyKind {
        StrategyKind::Http
    }

    async fn scan(&self, url: &str, _context: Option<&mut Context>) -> Result<ScanOutcome, RvError> {
        Err(RvError::new(ErrorCode::ConfigMissing, "no scanner registered for this platform")
            .with_context("url", url))
    }
}
