// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Thin command-line entrypoint: run one validation job end-to-end against
//! an in-memory catalog and a scripted scanner, or inspect a queue's depth.
//! The real KV store, database, and webhook transport are out of scope
//! (§1) — this binary exists for local smoke-testing and demos, not as a
//! production entrypoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rv_config::{ConcurrencyConfig, MemoryManagementConfig, PlatformConfig, RateLimitConfig, ScanConfig, Strategy, StrategyKind, UpdateExclusions, UrlPattern, WorkflowConfig};
use rv_core::{Job, PlatformId, ProductSet, SaleStatus, ScannedData};
use rv_nodes::{CompareNode, FetchNode, NotifyNode, SaveNode, ScanNode, ValidateNode};
use rv_queue::{InMemoryJobQueue, JobQueue};
use rv_repository::InMemoryCatalog;
use rv_runtime::{NodeContext, Pipeline, SharedState};
use rv_scanner::{
    testing::{ScriptedResponse, ScriptedScanner},
    PlatformScannerRegistry,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEMO_PLATFORM: &str = "oliveyoung";

#[derive(Parser, Debug)]
#[command(name = "rv", version, about = "Product validation pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one validation job against a seeded in-memory catalog, using a
    /// scripted scanner so the full pipeline runs without network access.
    Run {
        /// Directory the JSONL artifact is written under.
        #[arg(long, default_value = "./results")]
        output_dir: PathBuf,

        /// Webhook URL to post the Notify summary to, if any.
        #[arg(long)]
        webhook_url: Option<String>,
    },

    /// Enqueue a job and report the resulting queue depth, without running it.
    QueueStatus {
        /// Priority to enqueue the demo job at.
        #[arg(long, default_value_t = 1)]
        priority: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(filter)).init();

    match cli.command {
        Commands::Run { output_dir, webhook_url } => run_demo_job(output_dir, webhook_url).await,
        Commands::QueueStatus { priority } => queue_status(priority).await,
    }
}

fn demo_platform_config() -> Arc<PlatformConfig> {
    Arc::new(PlatformConfig {
        platform: PlatformId::new(DEMO_PLATFORM),
        display_name: "Olive Young".into(),
        url_pattern: UrlPattern {
            domain: "oliveyoung.co.kr".into(),
            product_id_regex: r"/goods/(\w+)".into(),
            product_id_group: 1,
            detail_url_template: "https://www.oliveyoung.co.kr/goods/{id}".into(),
        },
        strategies: vec![Strategy { kind: StrategyKind::Http, options: serde_json::Value::Null }],
        workflow: WorkflowConfig {
            rate_limit: RateLimitConfig { wait_time_ms: 0 },
            concurrency: ConcurrencyConfig { default: 1, max: 4 },
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

fn demo_products() -> Vec<ProductSet> {
    vec![ProductSet {
        product_set_id: Uuid::new_v4(),
        product_id: "A000123".into(),
        brand_id: "brand-1".into(),
        platform: PlatformId::new(DEMO_PLATFORM),
        link_url: "https://www.oliveyoung.co.kr/goods/A000123".into(),
        product_name: "Calming Toner".into(),
        thumbnail: "https://img.oliveyoung.co.kr/A000123.jpg".into(),
        original_price: 18_000,
        discounted_price: 15_000,
        sale_status: SaleStatus::OnSale,
        auto_crawled: true,
    }]
}

async fn run_demo_job(output_dir: PathBuf, webhook_url: Option<String>) -> Result<()> {
    let products = demo_products();
    let catalog = Arc::new(InMemoryCatalog::seeded(products.clone()));

    let scanners = PlatformScannerRegistry::new();
    let scripted = ScriptedScanner::new().with_method(StrategyKind::Http);
    for p in &products {
        scripted.script(
            p.link_url.clone(),
            ScriptedResponse::Found(ScannedData {
                product_name: p.product_name.clone(),
                thumbnail: p.thumbnail.clone(),
                original_price: p.original_price,
                discounted_price: p.discounted_price,
                sale_status: p.sale_status,
            }),
        );
    }
    scanners.register(DEMO_PLATFORM, Arc::new(scripted));

    let pipeline = Pipeline::new()
        .node(Arc::new(FetchNode::new(catalog, output_dir.clone())))
        .node(Arc::new(ScanNode::new(scanners, "http://localhost:4444")))
        .node(Arc::new(ValidateNode))
        .node(Arc::new(CompareNode))
        .node(Arc::new(SaveNode))
        .node(Arc::new(NotifyNode::new(webhook_url, false)));

    let ctx = NodeContext {
        job_id: Uuid::new_v4().to_string(),
        workflow_id: "demo".into(),
        platform: PlatformId::new(DEMO_PLATFORM),
        platform_config: demo_platform_config(),
        config: HashMap::new(),
        params: HashMap::new(),
        shared: Arc::new(SharedState::new()),
    };

    let outcome = pipeline.execute(serde_json::json!({}), &ctx).await;
    println!("{}", serde_json::to_string_pretty(&outcome.data).context("serializing pipeline outcome")?);

    if !outcome.success {
        anyhow::bail!("pipeline failed at node {:?}: {:?}", outcome.failed_node, outcome.error);
    }
    Ok(())
}

async fn queue_status(priority: i32) -> Result<()> {
    let queue = InMemoryJobQueue::new();
    let platform = PlatformId::new(DEMO_PLATFORM);
    queue.enqueue(Job::new("demo", platform.clone(), priority, serde_json::json!({}))).await?;
    let depth = queue.queue_depth(&platform).await?;
    println!("queue depth for {DEMO_PLATFORM}: {depth}");
    Ok(())
}
