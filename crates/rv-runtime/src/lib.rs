// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed node pipeline contract and sequential executor (§4.5).
//!
//! A workflow is a statically declared, ordered list of [`TypedNode`]s.
//! There is no fan-out between nodes — parallelism lives inside a node
//! (the Scan node's batches, see `rv-engine`). [`Pipeline::execute`] runs
//! nodes strictly in order and aborts the whole pipeline on the first
//! node-level failure, rolling back already-executed nodes best-effort.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod shared_state;

pub use shared_state::{SaveResult, ScanReport, SharedState};

use async_trait::async_trait;
use rv_config::PlatformConfig;
use rv_core::PlatformId;
use rv_error::RvError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Outcome of [`TypedNode::validate`]: pure, no I/O.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    /// `true` iff `errors` is empty.
    pub valid: bool,
    /// Human-readable validation failures.
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    /// Build a passing outcome.
    #[must_use]
    pub fn ok() -> Self {
        Self { valid: true, errors: Vec::new() }
    }

    /// Build a failing outcome from one or more messages.
    #[must_use]
    pub fn invalid(errors: Vec<String>) -> Self {
        Self { valid: false, errors }
    }
}

/// Structured error returned by a failed node, carrying a stable code the
/// way [`rv_error::ErrorCode`] does, but scoped to node-execution failures
/// that may include field-level detail.
#[derive(Debug, Clone)]
pub struct NodeError {
    /// Stable, machine-readable code (e.g. `VALIDATION_ERROR`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional per-field validation errors.
    pub field_errors: Vec<String>,
}

impl NodeError {
    /// Build a node error with no field-level detail.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field_errors: Vec::new(),
        }
    }

    /// Build a node error from an [`RvError`], preserving its stable code.
    #[must_use]
    pub fn from_rv_error(err: &RvError) -> Self {
        Self::new(err.code.to_string(), err.message.clone())
    }
}

/// Result of one node's [`TypedNode::execute`] call.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    /// `true` iff the node completed without error.
    pub success: bool,
    /// Node-specific payload, threaded to the next node as its `input`.
    pub data: Value,
    /// Present iff `success == false`.
    pub error: Option<NodeError>,
}

impl NodeOutcome {
    /// Build a success outcome carrying `data`.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self { success: true, data, error: None }
    }

    /// Build a failure outcome.
    #[must_use]
    pub fn failure(error: NodeError) -> Self {
        Self { success: false, data: Value::Null, error: Some(error) }
    }
}

/// Per-job execution context threaded through every node in a workflow.
pub struct NodeContext {
    /// Identifier of the job being executed.
    pub job_id: String,
    /// Identifier of the workflow (node sequence) being run.
    pub workflow_id: String,
    /// Platform this job targets.
    pub platform: PlatformId,
    /// Loaded configuration for `platform`.
    pub platform_config: Arc<PlatformConfig>,
    /// Per-node configuration overrides, keyed by node type.
    pub config: HashMap<String, Value>,
    /// Per-job parameters passed at enqueue time.
    pub params: HashMap<String, Value>,
    /// State shared across nodes for the lifetime of this pipeline run.
    pub shared: Arc<SharedState>,
}

impl NodeContext {
    /// Per-node config override for `node_type`, if any.
    #[must_use]
    pub fn node_config(&self, node_type: &str) -> Option<&Value> {
        self.config.get(node_type)
    }
}

/// A single step in a workflow's dataflow graph.
///
/// `type_name` must be globally unique among the nodes registered for one
/// workflow. `execute` is the only fallible, I/O-performing method;
/// `validate` must stay pure so callers can pre-flight a job without side
/// effects.
#[async_trait]
pub trait TypedNode: Send + Sync {
    /// Globally unique node type name.
    fn type_name(&self) -> &str;

    /// Pure structural check of `input`, performed before `execute`.
    fn validate(&self, input: &Value) -> ValidationOutcome;

    /// Run this node's work, returning the outcome threaded to the next
    /// node. Errors returned here (as opposed to a `NodeOutcome::failure`)
    /// are reserved for conditions the node cannot classify itself.
    async fn execute(&self, input: Value, ctx: &NodeContext) -> Result<NodeOutcome, RvError>;

    /// Best-effort cleanup of this node's side effects, invoked when a
    /// later node in the same pipeline run fails. Must never panic; a
    /// rollback failure is logged and otherwise ignored.
    async fn rollback(&self, _ctx: &NodeContext) {}
}

/// Outcome of running a whole [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// `true` iff every node succeeded.
    pub success: bool,
    /// The last node's output data (or the failing node's, when `!success`).
    pub data: Value,
    /// Type name of the node that failed, if any.
    pub failed_node: Option<String>,
    /// The failure, if any.
    pub error: Option<NodeError>,
}

/// An ordered, statically declared chain of [`TypedNode`]s.
///
/// ```
/// use rv_runtime::Pipeline;
///
/// let pipeline = Pipeline::new();
/// assert!(pipeline.is_empty());
/// ```
#[derive(Default)]
pub struct Pipeline {
    nodes: Vec<Arc<dyn TypedNode>>,
}

impl Pipeline {
    /// Create an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Append a node (builder pattern).
    #[must_use]
    pub fn node(mut self, node: Arc<dyn TypedNode>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Number of nodes in the pipeline.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// `true` iff the pipeline has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node type names in execution order.
    #[must_use]
    pub fn node_types(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.type_name().to_string()).collect()
    }

    /// Execute every node in order against `ctx`, threading each node's
    /// output data as the next node's input. On the first failure, rolls
    /// back every already-executed node in reverse order (best-effort) and
    /// returns a failed outcome; the job is marked `FAILED` by the caller.
    pub async fn execute(&self, initial_input: Value, ctx: &NodeContext) -> PipelineOutcome {
        let mut data = initial_input;
        let mut executed = Vec::new();

        for node in &self.nodes {
            let type_name = node.type_name();
            let validation = node.validate(&data);
            if !validation.valid {
                error!(job_id = %ctx.job_id, node = %type_name, errors = ?validation.errors, "node input validation failed");
                self.rollback(&executed, ctx).await;
                return PipelineOutcome {
                    success: false,
                    data,
                    failed_node: Some(type_name.to_string()),
                    error: Some(NodeError {
                        code: "VALIDATION_ERROR".into(),
                        message: "node input violated its contract".into(),
                        field_errors: validation.errors,
                    }),
                };
            }

            debug!(job_id = %ctx.job_id, node = %type_name, "executing node");
            match node.execute(data.clone(), ctx).await {
                Ok(outcome) if outcome.success => {
                    executed.push(Arc::clone(node));
                    data = outcome.data;
                }
                Ok(outcome) => {
                    error!(job_id = %ctx.job_id, node = %type_name, error = ?outcome.error, "node reported failure");
                    self.rollback(&executed, ctx).await;
                    return PipelineOutcome {
                        success: false,
                        data: outcome.data,
                        failed_node: Some(type_name.to_string()),
                        error: outcome.error,
                    };
                }
                Err(e) => {
                    error!(job_id = %ctx.job_id, node = %type_name, error = %e, "node execution errored");
                    self.rollback(&executed, ctx).await;
                    return PipelineOutcome {
                        success: false,
                        data: Value::Null,
                        failed_node: Some(type_name.to_string()),
                        error: Some(NodeError::from_rv_error(&e)),
                    };
                }
            }
        }

        PipelineOutcome {
            success: true,
            data,
            failed_node: None,
            error: None,
        }
    }

    async fn rollback(&self, executed: &[Arc<dyn TypedNode>], ctx: &NodeContext) {
        for node in executed.iter().rev() {
            debug!(job_id = %ctx.job_id, node = %node.type_name(), "rolling back node");
            node.rollback(ctx).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_config::{ConcurrencyConfig, MemoryManagementConfig, RateLimitConfig, ScanConfig, Strategy, StrategyKind, UpdateExclusions, UrlPattern, WorkflowConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_platform_config() -> Arc<PlatformConfig> {
        Arc::new(PlatformConfig {
            platform: PlatformId::new("oliveyoung"),
            display_name: "Olive Young".into(),
            url_pattern: UrlPattern {
                domain: "oliveyoung.co.kr".into(),
                product_id_regex: r"/goods/(\w+)".into(),
                product_id_group: 1,
                detail_url_template: "https://www.oliveyoung.co.kr/goods/{id}".into(),
            },
            strategies: vec![Strategy { kind: StrategyKind::Browser, options: Value::Null }],
            workflow: WorkflowConfig {
                rate_limit: RateLimitConfig { wait_time_ms: 0 },
                concurrency: ConcurrencyConfig { default: 1, max: 10 },
                memory_management: MemoryManagementConfig {
                    page_rotation_interval: 20,
                    context_rotation_interval: 50,
                    enable_gc_hints: false,
                },
                max_consecutive_failures: 2,
            },
            update_exclusions: UpdateExclusions::default(),
            scan_config: ScanConfig::default(),
        })
    }

    fn test_ctx() -> NodeContext {
        NodeContext {
            job_id: "job-1".into(),
            workflow_id: "wf-1".into(),
            platform: PlatformId::new("oliveyoung"),
            platform_config: test_platform_config(),
            config: HashMap::new(),
            params: HashMap::new(),
            shared: Arc::new(SharedState::new()),
        }
    }

    struct PassThrough(&'static str);

    #[async_trait]
    impl TypedNode for PassThrough {
        fn type_name(&self) -> &str {
            self.0
        }
        fn validate(&self, _input: &Value) -> ValidationOutcome {
            ValidationOutcome::ok()
        }
        async fn execute(&self, input: Value, _ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
            Ok(NodeOutcome::success(input))
        }
    }

    struct FailingNode;

    #[async_trait]
    impl TypedNode for FailingNode {
        fn type_name(&self) -> &str {
            "failing"
        }
        fn validate(&self, _input: &Value) -> ValidationOutcome {
            ValidationOutcome::ok()
        }
        async fn execute(&self, _input: Value, _ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
            Ok(NodeOutcome::failure(NodeError::new("SCAN_PRODUCT_ERROR", "boom")))
        }
    }

    struct RollbackCounting(Arc<AtomicUsize>);

    #[async_trait]
    impl TypedNode for RollbackCounting {
        fn type_name(&self) -> &str {
            "rollback_counting"
        }
        fn validate(&self, _input: &Value) -> ValidationOutcome {
            ValidationOutcome::ok()
        }
        async fn execute(&self, input: Value, _ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
            Ok(NodeOutcome::success(input))
        }
        async fn rollback(&self, _ctx: &NodeContext) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn pipeline_threads_output_to_next_node() {
        let pipeline = Pipeline::new().node(Arc::new(PassThrough("a"))).node(Arc::new(PassThrough("b")));
        let ctx = test_ctx();
        let outcome = pipeline.execute(serde_json::json!({"x": 1}), &ctx).await;
        assert!(outcome.success);
        assert_eq!(outcome.data, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn failing_node_aborts_pipeline_and_rolls_back_predecessors() {
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::new()
            .node(Arc::new(RollbackCounting(rollbacks.clone())))
            .node(Arc::new(FailingNode));
        let ctx = test_ctx();
        let outcome = pipeline.execute(Value::Null, &ctx).await;
        assert!(!outcome.success);
        assert_eq!(outcome.failed_node.as_deref(), Some("failing"));
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_input_fails_fast_without_executing() {
        struct Picky;
        #[async_trait]
        impl TypedNode for Picky {
            fn type_name(&self) -> &str {
                "picky"
            }
            fn validate(&self, input: &Value) -> ValidationOutcome {
                if input.is_null() {
                    ValidationOutcome::invalid(vec!["input must not be null".into()])
                } else {
                    ValidationOutcome::ok()
                }
            }
            async fn execute(&self, input: Value, _ctx: &NodeContext) -> Result<NodeOutcome, RvError> {
                Ok(NodeOutcome::success(input))
            }
        }
        let pipeline = Pipeline::new().node(Arc::new(Picky));
        let ctx = test_ctx();
        let outcome = pipeline.execute(Value::Null, &ctx).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().code, "VALIDATION_ERROR");
    }
}
