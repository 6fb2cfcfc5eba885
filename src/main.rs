//! httpmonitor - HTTP endpoint monitoring
//!
//! Checks each target on its own schedule and breaks every request down into
//! DNS, TCP, TLS, server processing and content transfer time.

mod cli;

use clap::Parser;
use cli::Args;
use httpmonitor::config::MonitorConfig;
use httpmonitor::monitor::{summary_line, DesktopNotifier, MonitorRegistry};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("httpmonitor=info".parse()?))
        .init();

    let args = Args::parse();

    // Load configuration
    let cfg = match args.url_target() {
        Some(target) => MonitorConfig {
            history_size: args.history_size,
            ..MonitorConfig::single(target)
        },
        None => {
            let path = args.config_path();
            tracing::info!("Loading targets from {}", path.display());
            MonitorConfig::load(&path)?
        }
    };
    let cfg = cfg.finalize(&args.defaults())?;

    let registry = MonitorRegistry::start(cfg.targets, cfg.history_size, Arc::new(DesktopNotifier))?;

    let mut report = tokio::time::interval(args.report_interval);
    report.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately, before any check has finished.
    report.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => {
                for client in registry.clients() {
                    tracing::info!("{}", summary_line(client));
                }
            }
        }
    }

    registry.shutdown();
    Ok(())
}
