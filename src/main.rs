use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use drover::clock::{Clock, SystemClock};
use drover::config::NodeConfig;
use drover::job::{JobResult, JobSchedule, NodeInfo, ScheduledJob};
use drover::node::Node;
use drover::shutdown::wait_for_shutdown;
use drover::store::memory::{
    MemoryJobStore, MemoryNodeRegistry, MemoryScheduleSource, RecordingCloudManager,
};
use drover::store::JobStore;

#[derive(Parser, Debug)]
#[command(name = "drover")]
#[command(about = "A lightweight cluster job scheduler")]
struct Args {
    /// Group label for the simulated cluster
    #[arg(long, default_value = "default")]
    group: String,

    /// Number of simulated nodes
    #[arg(long, default_value = "3")]
    nodes: usize,

    /// Weight capacity per node
    #[arg(long, default_value = "100")]
    max_weight_per_node: u32,

    /// Utilisation percentage above which the cluster scales up
    #[arg(long, default_value = "80")]
    scale_up_threshold: u32,

    /// Utilisation percentage below which the cluster scales down
    #[arg(long, default_value = "40")]
    scale_down_threshold: u32,

    /// Seconds a simulated worker takes to finish a job
    #[arg(long, default_value = "5")]
    job_duration_secs: u64,
}

/// A small built-in schedule so the demo has something to chew on.
fn sample_schedule() -> Vec<ScheduledJob> {
    let entry = |job_id: &str, cron: &str, weight: u32, priority: i32| ScheduledJob {
        job_id: job_id.to_string(),
        lock: format!("{job_id}-lock"),
        job_type: "demo".to_string(),
        weight,
        data: HashMap::new(),
        schedule: JobSchedule {
            cron: cron.to_string(),
            max_job_age: Duration::from_secs(30),
        },
        max_attempts: 3,
        priority,
        min_version: None,
    };

    vec![
        entry("heartbeat-report", "*/15 * * * * *", 10, 1),
        entry("inventory-sync", "*/30 * * * * *", 40, 5),
        entry("usage-rollup", "0 * * * * *", 70, 10),
    ]
}

/// Stand-in for the per-node workers: finishes running jobs after a
/// fixed duration so the queue keeps moving.
async fn simulate_workers(
    job_store: Arc<MemoryJobStore>,
    clock: Arc<dyn Clock>,
    job_duration: chrono::Duration,
    shutdown: CancellationToken,
) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tick.tick() => {
                let now = clock.now();
                let running = match job_store.get_running_jobs().await {
                    Ok(running) => running,
                    Err(e) => {
                        tracing::warn!(error = %e, "Worker simulation could not read running jobs");
                        continue;
                    }
                };
                for job in running {
                    if now - job.start_time < job_duration {
                        continue;
                    }
                    match job_store
                        .move_running_to_finished(&job, JobResult::Success, None, now)
                        .await
                    {
                        Ok(finished) => tracing::info!(
                            job_id = %finished.job.job_id,
                            node_id = %finished.assigned_node_id,
                            "Job finished"
                        ),
                        Err(e) => tracing::warn!(error = %e, "Failed to finish job"),
                    }
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let registry = Arc::new(MemoryNodeRegistry::new());
    let job_store = Arc::new(MemoryJobStore::new());
    let schedule_source = Arc::new(MemoryScheduleSource::new(sample_schedule()));
    let cloud = Arc::new(RecordingCloudManager::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Stagger the join times so node-1 is the clear elder.
    let now = clock.now();
    for i in 1..=args.nodes {
        registry
            .register(NodeInfo {
                node_id: format!("node-{i}"),
                group: args.group.clone(),
                join_time: now - chrono::Duration::minutes((args.nodes - i + 1) as i64),
                active: true,
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await;
    }

    tracing::info!(
        group = %args.group,
        nodes = args.nodes,
        max_weight_per_node = args.max_weight_per_node,
        "Starting demo cluster"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown(shutdown.clone()));

    let mut runners = Vec::new();
    for i in 1..=args.nodes {
        let mut config = NodeConfig::new(format!("node-{i}"), args.group.clone());
        config.leader.max_weight_per_node = args.max_weight_per_node;
        config.scale.scale_up_threshold = args.scale_up_threshold;
        config.scale.scale_down_threshold = args.scale_down_threshold;
        config.scale.max_nodes = args.nodes.max(config.scale.max_nodes);

        let node = Node::new(
            config,
            registry.clone(),
            job_store.clone(),
            schedule_source.clone(),
            cloud.clone(),
            clock.clone(),
        )?;
        let token = shutdown.clone();
        runners.push(tokio::spawn(async move { node.run(token).await }));
    }

    let worker_sim = tokio::spawn(simulate_workers(
        job_store.clone(),
        clock.clone(),
        chrono::Duration::seconds(args.job_duration_secs as i64),
        shutdown.clone(),
    ));

    shutdown.cancelled().await;
    for runner in runners {
        let _ = runner.await;
    }
    let _ = worker_sim.await;

    tracing::info!("Demo cluster stopped");
    Ok(())
}
