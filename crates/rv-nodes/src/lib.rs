// SPDX-License-Identifier: MIT OR Apache-2.0
//! Concrete [`rv_runtime::TypedNode`] implementations for one validation
//! workflow (§4.6): Fetch, Scan, Validate, Compare, Save, Update, Notify,
//! plus the Extract-* ad-hoc variants.
//!
//! Each node owns the external resources it needs (repositories, the
//! browser pool, a scanner registry, an HTTP client) as constructor fields
//! — [`rv_runtime::NodeContext`] carries only job-scoped data, not process
//! wide singletons, matching the split `rv_engine::ScanCoordinator` already
//! draws between pool/scanner (constructor) and product slice (call-site).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compare;
mod extract;
mod fetch;
mod jsonl;
mod notify;
mod save;
mod scan;
mod update;
mod validate;

pub use compare::CompareNode;
pub use extract::{ExtractByProductSetNode, ExtractByUrlNode, ExtractMultiPlatformNode};
pub use fetch::FetchNode;
pub use notify::NotifyNode;
pub use save::SaveNode;
pub use scan::ScanNode;
pub use update::UpdateNode;
pub use validate::{validate_scanned, ValidationFindings, ValidateNode};

use rv_error::{ErrorCode, RvError};
use rv_runtime::SharedState;
use rv_stream::ResultWriter;
use std::sync::Arc;

/// Fetch the job's result writer from shared state, failing with
/// `ConfigMissing` when the node ran before Fetch (or an Extract variant
/// that opens its own writer) populated it.
async fn require_writer(shared: &SharedState) -> Result<Arc<ResultWriter>, RvError> {
    shared
        .result_writer()
        .await
        .ok_or_else(|| RvError::new(ErrorCode::ConfigMissing, "node requires a result writer; run fetch first"))
}
