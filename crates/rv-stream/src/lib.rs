// SPDX-License-Identifier: MIT OR Apache-2.0
//! Append-only JSONL result writer (§4.4).
//!
//! One [`ResultWriter`] owns exactly one job's artifact file from
//! [`initialize`](ResultWriter::initialize) to
//! [`finalize`](ResultWriter::finalize). `append` is safe under concurrent
//! callers within one job — batches in the Scan node write through the same
//! writer handle without further coordination.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::Utc;
use rv_core::{ComparisonRecord, RecordStatus};
use rv_error::{ErrorCode, RvError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Per-job record counters, updated as records are appended and returned
/// verbatim (not recomputed) by [`ResultWriter::finalize`].
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Summary {
    /// Total records appended.
    pub total: u64,
    /// Count by [`RecordStatus`].
    pub by_status: BTreeMap<String, u64>,
    /// Records with `status == success` and `match == true`.
    pub matched: u64,
    /// Records with `status == success` and `match == false` — a genuine
    /// field-level compare mismatch, not a `failed`/`not_found` record
    /// (those are always `match == false` but aren't mismatches).
    pub mismatched: u64,
}

impl Summary {
    fn record(&mut self, rec: &ComparisonRecord) {
        self.total += 1;
        let key = match rec.status {
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
            RecordStatus::NotFound => "not_found",
        };
        *self.by_status.entry(key.to_string()).or_insert(0) += 1;
        if rec.status == RecordStatus::Success {
            if rec.matched {
                self.matched += 1;
            } else {
                self.mismatched += 1;
            }
        }
    }
}

/// Outcome of [`ResultWriter::finalize`].
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// Absolute path of the JSONL artifact.
    pub file_path: PathBuf,
    /// Number of records appended over the writer's lifetime.
    pub record_count: u64,
    /// Per-status / match summary.
    pub summary: Summary,
}

enum WriterState {
    Open { file: BufWriter<File> },
    Closed,
}

/// Append-only writer for one job's JSONL artifact.
///
/// Path shape: `<outputDir>/<YYYY-MM-DD>/<platform>/<jobId>.jsonl`. The file
/// is opened lazily on the first call that needs it; an empty writer that is
/// never appended to leaves no file behind once [`cleanup`](Self::cleanup)
/// runs.
pub struct ResultWriter {
    output_dir: PathBuf,
    platform: String,
    job_id: String,
    path: PathBuf,
    state: Mutex<WriterState>,
    summary: Mutex<Summary>,
}

impl ResultWriter {
    /// Build a writer for `job_id` on `platform`, rooted at `output_dir`.
    /// Does not touch the filesystem until [`initialize`](Self::initialize)
    /// or the first [`append`](Self::append).
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>, platform: impl Into<String>, job_id: impl Into<String>) -> Self {
        let output_dir = output_dir.into();
        let platform = platform.into();
        let job_id = job_id.into();
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let path = output_dir.join(date).join(&platform).join(format!("{job_id}.jsonl"));
        Self {
            output_dir,
            platform,
            job_id,
            path,
            state: Mutex::new(WriterState::Closed),
            summary: Mutex::new(Summary::default()),
        }
    }

    /// Final artifact path, valid whether or not the file has been created
    /// yet.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the date/platform/job directory tree and open the file for
    /// append. Idempotent: calling twice is a no-op on the second call.
    pub async fn initialize(&self) -> Result<(), RvError> {
        let mut state = self.state.lock().await;
        if matches!(*state, WriterState::Open { .. }) {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create result directory", &self.path, e))?;
        }
        let file = File::options()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error("open result file", &self.path, e))?;
        *state = WriterState::Open { file: BufWriter::new(file) };
        Ok(())
    }

    /// Append one record as a dense JSON line. Opens the file lazily if
    /// [`initialize`](Self::initialize) was not called first. Safe under
    /// concurrent callers: the internal mutex serializes writes so batches
    /// never interleave partial lines.
    pub async fn append(&self, record: &ComparisonRecord) -> Result<(), RvError> {
        self.initialize().await?;
        let mut line = serde_json::to_vec(&record.to_line_value())
            .map_err(|e| RvError::new(ErrorCode::Unknown, format!("record serialization failed: {e}")))?;
        line.push(b'\n');

        let mut state = self.state.lock().await;
        let WriterState::Open { file } = &mut *state else {
            return Err(RvError::new(ErrorCode::Unknown, "result writer is closed").with_context("path", self.path.display().to_string()));
        };
        file.write_all(&line).await.map_err(|e| io_error("append result line", &self.path, e))?;

        drop(state);
        self.summary.lock().await.record(record);
        Ok(())
    }

    /// Flush, close the file, and return the authoritative record count and
    /// summary. Calling `finalize` more than once returns the same counters
    /// without reopening the file.
    pub async fn finalize(&self) -> Result<FinalizeOutcome, RvError> {
        let mut state = self.state.lock().await;
        if let WriterState::Open { file } = &mut *state {
            file.flush().await.map_err(|e| io_error("flush result file", &self.path, e))?;
            file.get_mut().sync_all().await.map_err(|e| io_error("sync result file", &self.path, e))?;
        }
        *state = WriterState::Closed;
        drop(state);

        let summary = self.summary.lock().await.clone();
        Ok(FinalizeOutcome {
            file_path: self.path.clone(),
            record_count: summary.total,
            summary,
        })
    }

    /// Best-effort removal of a zero-record file. Never returns an error:
    /// a crashed job's leftover empty file is cosmetic, not a correctness
    /// problem.
    pub async fn cleanup(&self) {
        let total = self.summary.lock().await.total;
        if total > 0 {
            return;
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed empty result file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove empty result file (ignored)"),
        }
    }

    /// Platform this writer's file is rooted under.
    #[must_use]
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Job id this writer's file is named after.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Output directory root this writer was built with.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Snapshot of the running per-status/match counters, independent of
    /// whether the file has been finalized yet. Validate/Compare read this
    /// for aggregate counts without re-parsing the artifact.
    pub async fn summary(&self) -> Summary {
        self.summary.lock().await.clone()
    }

    /// Flush buffered bytes to disk without closing the writer. Lets a
    /// same-job reader (Validate, Compare) open [`path`](Self::path) and see
    /// every record appended so far; unlike [`finalize`](Self::finalize) the
    /// writer stays open for further appends.
    pub async fn flush(&self) -> Result<(), RvError> {
        let mut state = self.state.lock().await;
        if let WriterState::Open { file } = &mut *state {
            file.flush().await.map_err(|e| io_error("flush result file", &self.path, e))?;
        }
        Ok(())
    }
}

fn io_error(action: &str, path: &Path, source: std::io::Error) -> RvError {
    RvError::new(ErrorCode::Unknown, format!("{action}: {source}")).with_context("path", path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_core::{PlatformId, ProductSet, RecordStage, SaleStatus};
    use uuid::Uuid;

    fn sample_record(matched: bool) -> ComparisonRecord {
        let db = ProductSet {
            product_set_id: Uuid::nil(),
            product_id: "A".into(),
            brand_id: "b1".into(),
            platform: PlatformId::new("oliveyoung"),
            link_url: "https://example.com/goods/A".into(),
            product_name: "토너".into(),
            thumbnail: String::new(),
            original_price: 10_000,
            discounted_price: 8_000,
            sale_status: SaleStatus::OnSale,
            auto_crawled: true,
        };
        let mut rec = ComparisonRecord::not_found(db, "https://example.com/goods/A".into(), PlatformId::new("oliveyoung"), RecordStage::Scanned);
        rec.status = RecordStatus::Success;
        rec.matched = matched;
        rec
    }

    #[tokio::test]
    async fn append_then_finalize_reports_authoritative_count() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "oliveyoung", "job-1");
        writer.append(&sample_record(true)).await.unwrap();
        writer.append(&sample_record(false)).await.unwrap();
        let outcome = writer.finalize().await.unwrap();
        assert_eq!(outcome.record_count, 2);
        assert_eq!(outcome.summary.matched, 1);
        assert_eq!(outcome.summary.mismatched, 1);
        assert!(outcome.file_path.exists());
    }

    #[tokio::test]
    async fn finalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "oliveyoung", "job-1");
        writer.append(&sample_record(true)).await.unwrap();
        let first = writer.finalize().await.unwrap();
        let second = writer.finalize().await.unwrap();
        assert_eq!(first.record_count, second.record_count);
    }

    #[tokio::test]
    async fn cleanup_removes_file_only_when_zero_records() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "oliveyoung", "job-empty");
        writer.initialize().await.unwrap();
        assert!(writer.path().exists());
        writer.cleanup().await;
        assert!(!writer.path().exists());
    }

    #[tokio::test]
    async fn cleanup_keeps_file_with_records() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "oliveyoung", "job-nonempty");
        writer.append(&sample_record(true)).await.unwrap();
        writer.cleanup().await;
        assert!(writer.path().exists());
    }

    #[tokio::test]
    async fn summary_reflects_appends_before_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "oliveyoung", "job-1");
        writer.append(&sample_record(true)).await.unwrap();
        writer.flush().await.unwrap();
        let summary = writer.summary().await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.matched, 1);
    }

    #[tokio::test]
    async fn path_nests_by_date_platform_and_job_id() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path(), "ably", "job-xyz");
        let path = writer.path();
        assert!(path.to_string_lossy().contains("ably"));
        assert!(path.ends_with("job-xyz.jsonl"));
    }
}
