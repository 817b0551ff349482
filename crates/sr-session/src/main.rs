//! SR-Music session runner.
//!
//! Links four fixed radio stations to an SRS server and fans their audio out
//! once every station client is authenticated.
//!
//! ## Modes
//! - `check`: validate the config and print the station roster.
//! - `simulate`: run the session state machine against in-process collaborators.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sr_session::{cli, runtime};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,sr_session=info")
        }))
        .init();

    let options = runtime::resolve_options(args.config.as_deref(), args.server)?;
    tracing::info!(
        server = %options.server,
        queue_capacity = options.queue_capacity,
        "session options resolved"
    );

    match args.cmd {
        cli::Command::Check => runtime::run_check(&options),
        cli::Command::Simulate { frame_ms, frames } => {
            runtime::run_simulate(options, frame_ms, frames, true)
        }
    }
}
