//! CLI entry point for the transmux daemon.
//!
//! Parses command line arguments, loads and validates the profile, and
//! runs the daemon. Transcode failures are logged and never terminate the
//! process; only startup failures exit non-zero.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

use transmux::{Daemon, DaemonConfig};
use transmux_profile::Profile;

/// transmux - profile-driven media transcoding daemon
#[derive(Parser, Debug)]
#[command(name = "transmux")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input directory to scan and watch
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for transcoded files
    #[arg(short, long)]
    output: PathBuf,

    /// Path to the profile file (YAML or JSON)
    #[arg(short, long)]
    profile: PathBuf,

    /// Keep watching the input directory after the initial scan
    #[arg(short, long)]
    watch: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "debug")]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.debug {
        "transmux=debug,transmux_profile=debug"
    } else {
        "transmux=info,transmux_profile=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let profile = match Profile::load(&args.profile) {
        Ok(mut profile) => {
            profile.apply_cli_paths(Some(args.input), Some(args.output));
            profile
        }
        Err(e) => {
            error!("failed to load profile '{}': {}", args.profile.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let config = DaemonConfig {
        watch: args.watch,
        ..DaemonConfig::default()
    };

    let daemon = match Daemon::new(profile, config) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!("failed to initialize daemon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match daemon.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("daemon error: {}", e);
            ExitCode::FAILURE
        }
    }
}
