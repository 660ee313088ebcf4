// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-platform priority job queue (§4.8, §6 KV store contract).
//!
//! Models the two KV namespaces the original system keeps separate: a
//! priority-ordered queue set per platform (`workflow:queue:platform:<p>`)
//! and a job payload store (`workflow:job:<id>`) that survives dequeue so a
//! worker can keep rewriting status via [`JobQueue::update`]. The KV client
//! itself is out of scope; [`InMemoryJobQueue`] is the concrete, testable
//! stand-in a single process needs, the way [`rv_repository`]'s in-memory
//! catalog stands in for the row-store.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rv_core::{Job, JobId, PlatformId};
use rv_error::{ErrorCode, RvError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Operations the validation engine needs from the platform job queue.
///
/// All operations are atomic with respect to one another on a given
/// platform — §5 models this as pipelined KV commands; here it is a single
/// mutex guarding each namespace.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add `job` to its platform's priority set and store its payload.
    async fn enqueue(&self, job: Job) -> Result<(), RvError>;

    /// Remove and return the highest-priority job for `platform`.
    ///
    /// Ties are broken by insertion order (oldest first). Returns `Ok(None)`
    /// when the platform's queue is empty — never an error, since an empty
    /// queue is an ordinary scheduling state.
    async fn dequeue(&self, platform: &PlatformId) -> Result<Option<Job>, RvError>;

    /// Rewrite a job's payload (status transitions, etc). Does not touch
    /// queue ordering — updating a job already dequeued is the common case.
    async fn update(&self, job: Job) -> Result<(), RvError>;

    /// Drain both the priority set and the payload store for `platform`.
    async fn clear(&self, platform: &PlatformId) -> Result<(), RvError>;

    /// Current depth of `platform`'s priority set.
    async fn queue_depth(&self, platform: &PlatformId) -> Result<usize, RvError>;

    /// Wall-clock time of the last job *start* dequeued for `platform`.
    async fn rate_limit_tracker(&self, platform: &PlatformId) -> Result<Option<DateTime<Utc>>, RvError>;

    /// Record `at` as the last dequeued job's start time for `platform`.
    async fn set_rate_limit_tracker(&self, platform: &PlatformId, at: DateTime<Utc>) -> Result<(), RvError>;
}

struct QueueEntry {
    job_id: JobId,
    priority: i32,
    seq: u64,
}

/// Single-process, in-memory [`JobQueue`].
#[derive(Default)]
pub struct InMemoryJobQueue {
    queue_sets: Mutex<HashMap<PlatformId, Vec<QueueEntry>>>,
    payloads: Mutex<HashMap<JobId, Job>>,
    trackers: Mutex<HashMap<PlatformId, DateTime<Utc>>>,
    seq: AtomicU64,
}

impl InMemoryJobQueue {
    /// Build an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<(), RvError> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let entry = QueueEntry {
            job_id: job.job_id,
            priority: job.priority,
            seq,
        };
        self.queue_sets.lock().await.entry(job.platform.clone()).or_default().push(entry);
        self.payloads.lock().await.insert(job.job_id, job);
        Ok(())
    }

    async fn dequeue(&self, platform: &PlatformId) -> Result<Option<Job>, RvError> {
        let mut sets = self.queue_sets.lock().await;
        let Some(entries) = sets.get_mut(platform) else {
            return Ok(None);
        };
        if entries.is_empty() {
            return Ok(None);
        }
        // Highest priority first; among ties, lowest seq (oldest) wins.
        let idx = entries
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| (e.priority, std::cmp::Reverse(e.seq)))
            .map(|(i, _)| i)
            .expect("checked non-empty above");
        let entry = entries.remove(idx);
        drop(sets);

        let payload = self.payloads.lock().await.get(&entry.job_id).cloned();
        Ok(payload)
    }

    async fn update(&self, job: Job) -> Result<(), RvError> {
        self.payloads.lock().await.insert(job.job_id, job);
        Ok(())
    }

    async fn clear(&self, platform: &PlatformId) -> Result<(), RvError> {
        let removed: Vec<JobId> = self
            .queue_sets
            .lock()
            .await
            .remove(platform)
            .map(|entries| entries.into_iter().map(|e| e.job_id).collect())
            .unwrap_or_default();
        let mut payloads = self.payloads.lock().await;
        for id in removed {
            payloads.remove(&id);
        }
        payloads.retain(|_, job| &job.platform != platform);
        Ok(())
    }

    async fn queue_depth(&self, platform: &PlatformId) -> Result<usize, RvError> {
        Ok(self.queue_sets.lock().await.get(platform).map_or(0, Vec::len))
    }

    async fn rate_limit_tracker(&self, platform: &PlatformId) -> Result<Option<DateTime<Utc>>, RvError> {
        Ok(self.trackers.lock().await.get(platform).copied())
    }

    async fn set_rate_limit_tracker(&self, platform: &PlatformId, at: DateTime<Utc>) -> Result<(), RvError> {
        self.trackers.lock().await.insert(platform.clone(), at);
        Ok(())
    }
}

/// Compute how long the caller must still wait before starting the next
/// dequeued job on a platform, per §5: "minimum spacing of `wait_time_ms`
/// between job starts". Returns `None` when no wait is required.
#[must_use]
pub fn remaining_rate_limit_wait(last_start: Option<DateTime<Utc>>, now: DateTime<Utc>, wait_time_ms: u64) -> Option<std::time::Duration> {
    let last_start = last_start?;
    let elapsed = (now - last_start).num_milliseconds().max(0) as u64;
    if elapsed >= wait_time_ms {
        return None;
    }
    Some(std::time::Duration::from_millis(wait_time_ms - elapsed))
}

/// Unrecoverable condition for a job that cannot be dequeued at all
/// (platform has no config, queue disappeared mid-operation, etc).
#[must_use]
pub fn queue_missing_error(platform: &PlatformId) -> RvError {
    RvError::new(ErrorCode::QueueContention, "platform queue is unavailable").with_context("platform", platform.as_str())
}
