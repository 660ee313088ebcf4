// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-platform worker loop (§4.8): dequeues jobs for one platform, honors
//! the inter-job rate limit, and drives each job through its workflow
//! [`rv_runtime::Pipeline`].
//!
//! One [`PlatformWorker`] owns exactly one platform's queue traffic. Running
//! several platforms concurrently (§8 scenario 5, "two-platform concurrent
//! workers") is the caller's job: spawn one worker loop per platform, each
//! on its own task.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::Utc;
use rv_config::PlatformConfig;
use rv_core::{Job, JobStatus, PlatformId};
use rv_error::RvError;
use rv_queue::{remaining_rate_limit_wait, JobQueue};
use rv_runtime::{NodeContext, Pipeline, SharedState};
use rv_telemetry::{JobMetrics, MetricsCollector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// How long to sleep between empty-queue polls before checking again.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Resolves a job's `workflow_id` to the [`Pipeline`] that runs it.
///
/// A thin adapter so a worker can run several distinct node graphs
/// (the main validation workflow, the Extract-* ad-hoc ones) without the
/// loop itself knowing their shape.
pub trait WorkflowRegistry: Send + Sync {
    /// Look up the pipeline for `workflow_id`, if registered.
    fn resolve(&self, workflow_id: &str) -> Option<Arc<Pipeline>>;
}

/// A [`WorkflowRegistry`] backed by a fixed map, built once at startup.
#[derive(Default)]
pub struct StaticWorkflowRegistry {
    workflows: HashMap<String, Arc<Pipeline>>,
}

impl StaticWorkflowRegistry {
    /// Build an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pipeline under `workflow_id` (builder pattern).
    #[must_use]
    pub fn with_workflow(mut self, workflow_id: impl Into<String>, pipeline: Pipeline) -> Self {
        self.workflows.insert(workflow_id.into(), Arc::new(pipeline));
        self
    }
}

impl WorkflowRegistry for StaticWorkflowRegistry {
    fn resolve(&self, workflow_id: &str) -> Option<Arc<Pipeline>> {
        self.workflows.get(workflow_id).cloned()
    }
}

/// Drives one platform's job queue to completion, one job at a time.
///
/// Shutdown is cooperative: [`stop`](Self::stop) flips a flag the loop only
/// checks between jobs — a job already running is always finished, never
/// preempted (§4.8).
pub struct PlatformWorker {
    platform: PlatformId,
    platform_config: Arc<PlatformConfig>,
    queue: Arc<dyn JobQueue>,
    workflows: Arc<dyn WorkflowRegistry>,
    metrics: MetricsCollector,
    running: Arc<AtomicBool>,
}

impl PlatformWorker {
    /// Build a worker for one platform.
    #[must_use]
    pub fn new(platform: PlatformId, platform_config: Arc<PlatformConfig>, queue: Arc<dyn JobQueue>, workflows: Arc<dyn WorkflowRegistry>, metrics: MetricsCollector) -> Self {
        Self {
            platform,
            platform_config,
            queue,
            workflows,
            metrics,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A clonable handle that can signal [`stop`](Self::stop) from another
    /// task without holding the worker itself.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Ask the loop to exit once its current job (if any) finishes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Run until [`stop`](Self::stop) is called, dequeuing and executing
    /// jobs for this worker's platform.
    pub async fn run(&self) {
        info!(platform = %self.platform, "worker loop started");
        while self.running.load(Ordering::SeqCst) {
            match self.queue.dequeue(&self.platform).await {
                Ok(Some(job)) => {
                    self.wait_for_rate_limit().await;
                    self.queue.set_rate_limit_tracker(&self.platform, Utc::now()).await.ok();
                    self.run_job(job).await;
                }
                Ok(None) => sleep(POLL_INTERVAL).await,
                Err(e) => {
                    error!(platform = %self.platform, error = %e, "dequeue failed, backing off");
                    sleep(POLL_INTERVAL).await;
                }
            }
        }
        info!(platform = %self.platform, "worker loop stopped");
    }

    async fn wait_for_rate_limit(&self) {
        let wait_time_ms = self.platform_config.workflow.rate_limit.wait_time_ms;
        if wait_time_ms == 0 {
            return;
        }
        let last_start = self.queue.rate_limit_tracker(&self.platform).await.unwrap_or(None);
        if let Some(wait) = remaining_rate_limit_wait(last_start, Utc::now(), wait_time_ms) {
            sleep(wait).await;
        }
    }

    async fn run_job(&self, mut job: Job) {
        let started = std::time::Instant::now();
        job.status = JobStatus::Running;
        if let Err(e) = self.queue.update(job.clone()).await {
            warn!(job_id = %job.job_id, error = %e, "failed to mark job running (continuing anyway)");
        }

        let Some(pipeline) = self.workflows.resolve(&job.workflow_id) else {
            error!(job_id = %job.job_id, workflow_id = %job.workflow_id, "no pipeline registered for workflow_id");
            job.status = JobStatus::Failed;
            self.queue.update(job).await.ok();
            return;
        };

        let ctx = self.build_context(&job);
        let outcome = pipeline.execute(job.params.clone(), &ctx).await;

        job.status = if outcome.success { JobStatus::Completed } else { JobStatus::Failed };
        if let Err(e) = self.queue.update(job.clone()).await {
            warn!(job_id = %job.job_id, error = %e, "failed to record final job status");
        }

        self.record_metrics(&job, started.elapsed(), &ctx).await;
        debug!(job_id = %job.job_id, success = outcome.success, "job finished");
    }

    fn build_context(&self, job: &Job) -> NodeContext {
        let params = job.params.as_object().cloned().unwrap_or_default().into_iter().collect();
        NodeContext {
            job_id: job.job_id.to_string(),
            workflow_id: job.workflow_id.clone(),
            platform: self.platform.clone(),
            platform_config: Arc::clone(&self.platform_config),
            config: HashMap::new(),
            params,
            shared: Arc::new(SharedState::new()),
        }
    }

    async fn record_metrics(&self, job: &Job, elapsed: Duration, ctx: &NodeContext) {
        let summary = ctx.shared.save_result().await.map(|r| r.summary);
        let scan_report = ctx.shared.scan_report().await;
        let metrics = JobMetrics {
            platform: self.platform.as_str().to_string(),
            duration_ms: elapsed.as_millis() as u64,
            scanned: summary.as_ref().map_or(0, |s| s.total),
            matched: summary.as_ref().map_or(0, |s| s.matched),
            mismatched: summary.as_ref().map_or(0, |s| s.mismatched),
            failed: summary.as_ref().and_then(|s| s.by_status.get("failed").copied()).unwrap_or(0),
            not_found: summary.as_ref().and_then(|s| s.by_status.get("not_found").copied()).unwrap_or(0),
            context_rotations: scan_report.map_or(0, |r| r.context_rotations),
        };
        self.metrics.record(metrics);
        let _ = job;
    }
}

/// Fails fast over the common queue-contention case (§7: `QueueContention`
/// — a dequeue lost a compare-and-delete race). Worker loops treat it as
/// retryable and simply poll again rather than propagating it.
#[must_use]
pub fn is_retryable_queue_error(err: &RvError) -> bool {
    err.code == rv_error::ErrorCode::QueueContention
}
