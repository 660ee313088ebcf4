// SPDX-License-Identifier: MIT OR Apache-2.0
//! Domain model shared across the product validation pipeline.
//!
//! This crate is deliberately free of I/O: it holds the types that flow
//! between the queue, the scanners, the streaming writer, and the typed
//! node pipeline, so that every crate downstream agrees on one vocabulary.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod job;
mod platform;
mod product;
mod result;
mod scan;

pub use job::{Job, JobId, JobStatus};
pub use platform::PlatformId;
pub use product::{ProductSet, SaleStatus};
pub use result::{ComparisonFields, ComparisonRecord, RecordStage, RecordStatus};
pub use scan::ScannedData;
