//! warpfilter: run WarpGrid host filters from the command line.
//!
//! # Usage
//!
//! ```text
//! warpfilter filters
//! warpfilter check --config filters.toml --scenario scenario.json [--concurrent]
//! ```

mod scenario;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use warpgrid_filter::{
    AttestationCache, Clock, FilterConfig, FilterDeps, FilterRegistry, ManualClock,
    StaticAttestation, SystemClock,
};
use warpgrid_state::{HostDirectory, StateStore};

use crate::scenario::{EligibleHost, Scenario};

#[derive(Parser)]
#[command(name = "warpfilter", about = "WarpGrid host filter runner")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the registered filter names.
    Filters,

    /// Filter the hosts of a scenario and print the eligible ones.
    Check {
        /// Filter configuration (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scenario file (JSON).
        #[arg(long)]
        scenario: PathBuf,

        /// Evaluate hosts concurrently.
        #[arg(long)]
        concurrent: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Filters => {
            for name in FilterRegistry::with_builtin_filters().names() {
                println!("{name}");
            }
            Ok(())
        }
        Command::Check {
            config,
            scenario,
            concurrent,
        } => run_check(config, scenario, concurrent).await,
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,warpgrid=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_check(
    config_path: Option<PathBuf>,
    scenario_path: PathBuf,
    concurrent: bool,
) -> anyhow::Result<()> {
    let config = match &config_path {
        Some(path) => FilterConfig::from_file(path)?,
        None => FilterConfig::default(),
    };
    let config = Arc::new(config);
    info!(filters = ?config.enabled_filters, "configuration loaded");

    let scenario = Scenario::from_file(&scenario_path)?;
    let store = StateStore::open_in_memory()?;
    scenario.seed(&store).context("failed to seed state store")?;
    let directory: Arc<dyn HostDirectory> = Arc::new(store);

    let clock: Arc<dyn Clock> = match scenario.now {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let attestation = AttestationCache::new(
        Arc::new(StaticAttestation::new(scenario.attestation.clone())),
        directory.clone(),
        clock.clone(),
        config.attestation_auth_timeout(),
    );

    let deps = FilterDeps {
        config,
        directory,
        clock,
        attestation: Some(Arc::new(attestation)),
    };
    let pipeline = FilterRegistry::with_builtin_filters()
        .build_pipeline(&deps)?;

    let candidates = scenario.hosts.len();
    let eligible = if concurrent {
        pipeline
            .filter_hosts_concurrent(scenario.hosts, &scenario.request)
            .await?
    } else {
        pipeline.filter_hosts(scenario.hosts, &scenario.request)?
    };
    info!(
        candidates,
        eligible = eligible.len(),
        concurrent,
        "filtering complete"
    );

    let report: Vec<EligibleHost<'_>> = eligible.iter().map(EligibleHost::from).collect();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
