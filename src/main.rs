mod console;
mod cost;
mod daemon;
mod state;
mod topology;
mod transport;
mod wire;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use daemon::RouterDaemon;

#[derive(Debug, Parser)]
#[command(name = "dvrouted")]
#[command(about = "Distance-vector routing daemon with an operator console")]
struct Args {
    /// Topology file (spec.md §6): server table + this node's link entries.
    #[arg(short = 't', long = "topology")]
    topology: PathBuf,

    /// Routing update interval in seconds; also governs the 3x neighbor
    /// timeout (spec.md §4.1, §5).
    #[arg(short = 'i', long = "interval")]
    interval: f64,

    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let loaded = topology::load(&args.topology)?;
    let daemon = RouterDaemon::new(loaded.registry, loaded.initial_neighbors, args.interval)?;
    daemon.run_forever()
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
