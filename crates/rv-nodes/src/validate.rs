// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validate node (§4.6): a second, independent sanity pass over the records
//! Scan already streamed, re-checking the normalization invariants every
//! scanner is supposed to uphold ([`rv_core::ScannedData::prices_well_formed`]).

use crate::{jsonl::read_jsonl, require_writer};
use async_trait::async_trait;
use rv_core::{RecordStatus, ScannedData};
use rv_error::RvError;
use rv_runtime::{NodeContext, NodeError, NodeOutcome, TypedNode, ValidationOutcome};
use serde_json::{json, Value};

/// Per-record sanity issues, split into `warnings` (informational) and
/// `failures` (hard violations, or warnings escalated by strict mode).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationFindings {
    /// Non-blocking issues.
    pub warnings: Vec<&'static str>,
    /// Blocking issues.
    pub failures: Vec<&'static str>,
}

/// Check one scanned record's field-level sanity (§4.6): required fields
/// present, prices non-negative, `discounted_price <= original_price`,
/// thumbnail URL shape, "on_sale with zero price" and ">90% discount"
/// warnings.
#[must_use]
pub fn validate_scanned(data: &ScannedData) -> ValidationFindings {
    let mut findings = ValidationFindings::default();

    if data.product_name.trim().is_empty() {
        findings.failures.push("product_name is empty");
    }
    if data.original_price < 0 || data.discounted_price < 0 {
        findings.failures.push("price fields must be non-negative");
    }
    if data.discounted_price > data.original_price {
        findings.failures.push("discounted_price exceeds original_price");
    }
    if !data.thumbnail.is_empty() && !data.thumbnail.starts_with("http") {
        findings.warnings.push("thumbnail is not an absolute URL");
    }
    if matches!(data.sale_status, rv_core::SaleStatus::OnSale) && data.original_price == 0 {
        findings.warnings.push("on_sale listing has a zero price");
    }
    if data.discount_rate() > 0.9 {
        findings.warnings.push("discount rate exceeds 90%");
    }

    findings
}

/// Re-validates every successful record Scan wrote, escalating warnings to
/// failures under strict mode (`ctx.params["strict"] == true`). Never
/// touches the JSONL — this is a read-only audit over what Scan already
/// appended.
pub struct ValidateNode;

#[async_trait]
impl TypedNode for ValidateNode {
    fn type_name(&self) -> &str {
        "validate"
    }

    fn validate(&self, _input: &Value) -> ValidationOutcome {
        ValidationOutcome::ok()
    }

    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
        let writer = require_writer(&ctx.shared).await?;
        writer.flush().await?;
        let records = read_jsonl(writer.path()).await?;

        let strict = ctx.params.get("strict").and_then(Value::as_bool).unwrap_or(false);

        let mut warnings = 0u64;
        let mut failures = 0u64;
        for record in records.iter().filter(|r| r.status == RecordStatus::Success) {
            let Some(fetch) = &record.fetch else { continue };
            let findings = validate_scanned(fetch);
            warnings += findings.warnings.len() as u64;
            failures += findings.failures.len() as u64;
            if strict {
                failures += findings.warnings.len() as u64;
            }
        }

        if strict && failures > 0 {
            return Ok(NodeOutcome::failure(NodeError::new(
                "VALIDATION_ERROR",
                format!("{failures} scanned record(s) failed strict validation"),
            )));
        }

        Ok(NodeOutcome::success(json!({
            "products": input["products"],
            "validation": { "warnings": warnings, "failures": failures },
        })))
    }
}
