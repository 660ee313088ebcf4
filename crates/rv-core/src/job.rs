// SPDX-License-Identifier: MIT OR Apache-2.0
use crate::PlatformId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one queued [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting in the platform queue.
    Pending,
    /// Dequeued and currently executing a workflow.
    Running,
    /// Workflow ran to completion.
    Completed,
    /// A node aborted the pipeline.
    Failed,
    /// Cancelled before or during execution.
    Cancelled,
}

impl JobStatus {
    /// TTL, in seconds, the KV record should carry while in this status.
    ///
    /// PENDING ~1h, RUNNING ~2h, terminal states ~24h — bounds the lifetime
    /// of abandoned payloads left behind by a crashed worker.
    #[must_use]
    pub fn ttl_seconds(self) -> u64 {
        match self {
            Self::Pending => 3_600,
            Self::Running => 7_200,
            Self::Completed | Self::Failed | Self::Cancelled => 86_400,
        }
    }
}

/// One unit of work dequeued and executed by a platform worker loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub job_id: JobId,
    /// Identifies which node graph (workflow) to run for this job.
    pub workflow_id: String,
    /// Target platform.
    pub platform: PlatformId,
    /// Scheduling priority; higher values are dequeued first.
    pub priority: i32,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Free-form per-job parameters (filters, product id, etc).
    pub params: Value,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Build a new job in `Pending` status, stamped with the current time.
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, platform: PlatformId, priority: i32, params: Value) -> Self {
        Self {
            job_id: JobId::new(),
            workflow_id: workflow_id.into(),
            platform,
            priority,
            status: JobStatus::Pending,
            params,
            created_at: Utc::now(),
        }
    }
}
