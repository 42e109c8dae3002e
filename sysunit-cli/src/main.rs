//! # sysunit-master
//!
//! Runs one SysUnit dispatch round: advertise on the slave group, collect
//! the slaves that answer, then hand out the configured test nodes
//! round-robin.
//!
//! Only the in-process bus is available, so the slaves are started inside
//! this process as well.
//!
//! ## Example
//!
//! ```bash
//! # Three local slaves on SYSUNIT.SLAVES, default script and nodes
//! sysunit-master
//!
//! # Custom slave group and settings, JSON report
//! sysunit-master LAB.SLAVES --config sysunit.toml --local-slaves 2 --json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysunit_core::SystemTestCase;
use sysunit_node::{
    BusSender, CaseLauncher, Config, DispatchReport, InMemoryBus, MasterNode, SlaveNode,
};
use tracing_subscriber::EnvFilter;

/// Master entry point for SysUnit distributed system tests.
#[derive(Parser, Debug)]
#[command(name = "sysunit-master")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Slave group topic (overrides the config file)
    slave_group: Option<String>,

    /// Path to a TOML config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Number of slaves to start on the in-process bus
    #[arg(long, default_value = "3")]
    local_slaves: usize,

    /// How long to let slaves run their nodes before exiting, in milliseconds
    #[arg(long, default_value = "500")]
    linger_ms: u64,

    /// Print the dispatch report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let bus = Arc::new(InMemoryBus::new());
    let slave_group = bus.destination(&config.master.slave_group);

    let mut slaves = Vec::with_capacity(cli.local_slaves);
    for _ in 0..cli.local_slaves {
        let launcher = CaseLauncher::from_config(&config.slave)
            .register(config.master.script.clone(), demo_case);
        let mut slave = SlaveNode::new(Arc::clone(&bus), slave_group.clone(), Arc::new(launcher));
        slave
            .listen()
            .await
            .context("Failed to start local slave")?;
        slaves.push(slave);
    }

    let mut master = MasterNode::from_config(Arc::clone(&bus), &config.master);
    let report = master
        .start(&config.master.script, &config.master.nodes)
        .await
        .context("Dispatch round failed")?;

    print_report(&report, cli.json)?;

    tokio::time::sleep(Duration::from_millis(cli.linger_ms)).await;
    Ok(())
}

/// Load the config file if given, then apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(group) = &cli.slave_group {
        config.master.slave_group = group.clone();
    }
    Ok(config)
}

/// A single TBean that reports the node it was started for.
fn demo_case(node_name: &str) -> SystemTestCase {
    let mut case = SystemTestCase::new(format!("demo/{node_name}"));
    let node = node_name.to_string();
    if let Err(e) = case.add_thread(node_name, move || {
        tracing::info!("Test node {} running", node);
        Ok(())
    }) {
        tracing::warn!("Could not build demo case for {}: {}", node_name, e);
    }
    case
}

fn print_report(report: &DispatchReport, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).context("Failed to encode report")?;
        println!("{}", text);
        return Ok(());
    }

    println!(
        "Dispatched {} node(s) of {} over {} member(s)",
        report.assignments.len(),
        report.script,
        report.member_count
    );
    for assignment in &report.assignments {
        println!(
            "  {:<12} -> member {} ({})",
            assignment.node_name, assignment.member_index, assignment.member_id
        );
    }
    Ok(())
}
