//! posecube daemon - Main entry point
//!
//! Hosts the broker interface component and serves its web page.

mod animation;
mod api;
mod broker;
mod component;
mod config;
mod hotspot;
mod server;
mod state;
mod ws;

use anyhow::Result;
use clap::Parser;
use posecube_core::UiEvent;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "posecube")]
#[command(about = "Drive a CSS cube from pose messages on an MQTT topic")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "posecube.toml")]
    config: PathBuf,

    /// Bind address for web server
    #[arg(short, long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Broker URL; connects on startup
    #[arg(long)]
    broker: Option<String>,

    /// Topic to subscribe to; connects on startup
    #[arg(long)]
    topic: Option<String>,

    /// Write a default configuration file to --config and exit
    #[arg(long)]
    write_default_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("posecube v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Command line overrides
    if let Some(bind) = args.bind {
        config.daemon.bind = bind;
    }
    if let Some(broker) = args.broker {
        config.broker.url = broker;
        config.broker.auto_connect = true;
    }
    if let Some(topic) = args.topic {
        config.broker.topic = topic;
        config.broker.auto_connect = true;
    }

    info!(
        bind = %config.daemon.bind,
        broker = %config.broker.url,
        topic = %config.broker.topic,
        tick_ms = config.animation.interval_ms,
        "Configuration loaded"
    );

    // Create application state
    let (state, component_task) = state::AppState::new(config.clone())?;

    if config.broker.auto_connect {
        state.component.dispatch(UiEvent::Connect).await?;
    }

    server::run(
        state.clone(),
        &config.daemon.bind,
        config.daemon.tls.as_ref(),
        shutdown_signal(),
    )
    .await?;

    // Server is down: release the broker connection and the timer
    if let Err(e) = state.component.unmount().await {
        warn!(error = %e, "Component already stopped");
    }
    component_task.await?;
    info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
