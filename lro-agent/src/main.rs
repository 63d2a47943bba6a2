//! lro-agent: Disk agent driving long-running backend operations.
//!
//! This daemon:
//! - Creates, resizes or deletes the disks given on the command line
//! - Suspends operations that outlive a pass and records their resume tokens
//! - Resumes recorded operations on the next pass or the next start
//! - Reports a DisksReady condition after every pass

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use lro_engine::{EngineConfig, FileStore};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod agent;
mod clients;
mod reconciler;

use agent::{DiskAgent, Mode, RunOutcome};
use clients::SimClient;
use reconciler::DiskSpec;

/// Disk given as NAME=SIZE_GB.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DiskArg {
    name: String,
    size_gb: u64,
}

impl FromStr for DiskArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, size) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=SIZE_GB, got '{}'", s))?;
        if name.is_empty() {
            return Err("disk name must not be empty".to_string());
        }
        let size_gb = size
            .parse()
            .map_err(|_| format!("invalid size '{}' for disk {}", size, name))?;
        Ok(Self {
            name: name.to_string(),
            size_gb,
        })
    }
}

/// lro Disk Agent
#[derive(Parser, Debug)]
#[command(name = "lro-agent", version, about)]
struct Args {
    /// File holding resume records of in-flight operations
    #[arg(long, env = "LRO_STATE_FILE", default_value = "/var/lib/lro-agent/operations.json")]
    state_file: PathBuf,

    /// File backing the simulated disk backend
    #[arg(long, env = "LRO_BACKEND_FILE", default_value = "/var/lib/lro-agent/backend.json")]
    backend_file: PathBuf,

    /// Disk to manage, as NAME=SIZE_GB (repeatable)
    #[arg(long = "disk", required = true)]
    disks: Vec<DiskArg>,

    /// Resource group (defaults to hostname)
    #[arg(long)]
    resource_group: Option<String>,

    /// Service name used to key resume records
    #[arg(long, default_value = "disks")]
    service: String,

    /// Time the backend takes to finish an operation, in seconds
    #[arg(long, default_value = "30")]
    operation_secs: u64,

    /// Deadline of a single pass, in seconds
    #[arg(long, default_value = "10")]
    pass_timeout_secs: u64,

    /// Delay before the next pass while operations are running (0 = 15)
    #[arg(long, env = "LRO_REQUEUE_SECS", default_value = "0")]
    requeue_secs: u64,

    /// Delay after a 429 without Retry-After (0 = 60)
    #[arg(long, env = "LRO_RATE_LIMIT_REQUEUE_SECS", default_value = "0")]
    rate_limit_requeue_secs: u64,

    /// Upper bound for one service pass (0 = 12)
    #[arg(long, env = "LRO_SERVICE_TIMEOUT_SECS", default_value = "0")]
    service_timeout_secs: u64,

    /// Stop after this many passes, leaving operations in flight
    #[arg(long)]
    max_passes: Option<u32>,

    /// Delete the disks instead of creating them
    #[arg(long)]
    delete: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lro_agent=info,lro_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let resource_group = args.resource_group.unwrap_or_else(|| {
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "default".to_string())
    });
    let mode = if args.delete { Mode::Delete } else { Mode::Apply };

    info!("Starting lro-agent for resource group {}", resource_group);
    info!("State file: {}", args.state_file.display());
    info!("Backend file: {}", args.backend_file.display());

    let specs = args
        .disks
        .iter()
        .map(|d| DiskSpec::new(d.name.clone(), resource_group.clone(), d.size_gb))
        .collect();
    let config = EngineConfig {
        requeue_secs: args.requeue_secs,
        rate_limit_requeue_secs: args.rate_limit_requeue_secs,
        service_timeout_secs: args.service_timeout_secs,
    };

    let client = SimClient::new(&args.backend_file, Duration::from_secs(args.operation_secs));
    let store = FileStore::new(&args.state_file);
    let mut agent = DiskAgent::new(
        client.clone(),
        store,
        config,
        &args.service,
        specs,
        mode,
        Duration::from_secs(args.pass_timeout_secs),
    );
    if let Some(max) = args.max_passes {
        agent = agent.with_max_passes(max);
    }

    let outcome = agent
        .run()
        .await
        .with_context(|| format!("{:?} of disks in {} failed", mode, resource_group))?;

    let conditions = serde_json::to_string(agent.conditions())?;
    info!("Final conditions: {}", conditions);

    match outcome {
        RunOutcome::Converged => info!("All disks converged"),
        RunOutcome::Suspended => {
            let pending = client
                .pending_operations()
                .await
                .context("failed to read backend state")?;
            info!(
                "Exiting with {} backend operation(s) in flight; state kept in {}",
                pending,
                args.state_file.display()
            );
        }
    }

    Ok(())
}
