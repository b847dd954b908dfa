// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fireguard

//! Fireguard - indoor fire-suppression controller
//!
//! Runs a session against the configured serial port (or a simulated node in
//! demo mode), serves the status API and takes operator commands on stdin.

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use fireguard::{console, link, Config, Session, NAME, VERSION};

/// Fireguard - indoor fire-suppression controller
#[derive(Parser, Debug)]
#[command(name = "fireguard")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Sensor link decoding, automatic valve control and status feed")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Demo mode with a simulated sensor node and camera
    #[arg(long)]
    demo: bool,

    /// Serial port of the sensor node
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Status API bind address
    #[arg(long)]
    api_bind: Option<SocketAddr>,

    /// Disable the status API
    #[arg(long)]
    no_api: bool,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Do not read commands from stdin
    #[arg(long)]
    no_console: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_ports {
        let ports = link::available_ports();
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}  {}", port.name, port.kind);
        }
        return Ok(());
    }

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{} ({})", NAME, VERSION, fireguard::enabled_features().join(", "));

    // Override with command line args
    if args.demo {
        config.demo_mode = true;
    }
    if let Some(port) = args.port {
        config.link.port = Some(port);
    }
    if let Some(baud) = args.baud {
        config.link.baud_rate = baud;
    }
    if let Some(bind) = args.api_bind {
        config.api.bind = bind;
    }
    if args.no_api {
        config.api.enabled = false;
    }
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("fireguard.db");
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("Demo mode: {}", config.demo_mode);

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run(config, !args.no_console));
    // A pending stdin read would otherwise hold the runtime open
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(config: Config, console: bool) -> Result<()> {
    let session = Session::start(config).await?;

    info!("Press Ctrl+C to shut down");
    let result = if console {
        tokio::select! {
            r = console::run_console(session.clone()) => r,
            r = tokio::signal::ctrl_c() => r.map_err(Into::into),
        }
    } else {
        tokio::signal::ctrl_c().await.map_err(Into::into)
    };

    if let Err(e) = &result {
        warn!("Stopping after error: {:#}", e);
    }
    session.shutdown().await;
    info!("{} shutdown complete", NAME);

    result
}
