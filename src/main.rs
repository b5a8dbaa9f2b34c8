//! bm-lastheard CLI - Watch the BrandMeister last heard feed from a terminal.

use anyhow::Result;
use bm_lastheard::{
    client::{BM_LASTHEARD_URL, LastHeardClient},
    config::Config,
    filter::FilterConfig,
    lookup::RadioIdDatabase,
    session::{SessionController, ShutdownReason},
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// bm-lastheard - Real-time monitor for the BrandMeister DMR last heard feed
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Only show callsigns matching this regex (searched, case-sensitive)
    #[arg(short, long)]
    callsign: Option<String>,

    /// Only show this destination talkgroup
    #[arg(short, long)]
    talkgroup: Option<u32>,

    /// Only show this BrandMeister master server id
    #[arg(short, long)]
    peer: Option<u32>,

    /// Show the operator's first name
    #[arg(short, long)]
    name: bool,

    /// Log matched lines to a file
    #[arg(short, long)]
    log: bool,

    /// Stop after this many minutes
    #[arg(short, long, allow_negative_numbers = true)]
    runtime: Option<f64>,

    /// Directory for log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Skip the RadioID user database (no names or locations)
    #[arg(long)]
    no_lookup: bool,

    /// Socket.IO WebSocket endpoint
    #[arg(long, env = "BM_LASTHEARD_URL")]
    url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging; stdout is reserved for matched events
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(reason) => {
            info!("Session ended ({:?})", reason);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ShutdownReason> {
    let mut config = Config::load()?;
    apply_overrides(&mut config, &args);

    let filter = build_filter(&args)?;

    info!("bm-lastheard starting...");
    info!("Server: {}", config.url);
    if filter.is_filtering() {
        info!("Filters: {}", filter.describe());
    }

    let lookup = if config.lookup.enabled {
        match RadioIdDatabase::load(&config.lookup.settings()).await {
            Ok(db) => db,
            Err(e) => {
                warn!("RadioID database unavailable, names disabled: {}", e);
                RadioIdDatabase::default()
            }
        }
    } else {
        RadioIdDatabase::default()
    };

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let client = LastHeardClient::new(config.client_config());
    let session = SessionController::new(
        filter,
        config.session_settings(),
        lookup,
        std::io::stdout(),
    );

    Ok(session.run(&client, shutdown_rx).await?)
}

/// Apply command line flags on top of the config file.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(ref url) = args.url {
        config.url = url.clone();
    }
    if let Some(ref dir) = args.log_dir {
        config.log_dir = dir.clone();
    }
    if args.no_lookup {
        config.lookup.enabled = false;
    }
}

/// Build the session filter from the command line.
fn build_filter(args: &Args) -> Result<FilterConfig> {
    let mut filter = FilterConfig::default()
        .with_names(args.name)
        .with_logging(args.log);

    if let Some(ref pattern) = args.callsign {
        filter = filter.with_callsign_pattern(pattern)?;
    }
    if let Some(talkgroup) = args.talkgroup {
        filter = filter.with_talkgroup(talkgroup);
    }
    if let Some(peer) = args.peer {
        filter = filter.with_peer_id(peer);
    }
    if let Some(minutes) = args.runtime {
        filter = filter.with_runtime_minutes(minutes)?;
    }

    Ok(filter)
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
