//! Main entry point for the Matchboard dashboard service
//!
//! Initializes configuration and logging, starts the dashboard server and
//! demo producers, and shuts everything down gracefully on SIGINT/SIGTERM.

use anyhow::Result;
use clap::Parser;
use matchboard::config::{validate_config, AppConfig};
use matchboard::service::{AppState, HealthCheck, HealthStatus};
use matchboard::utils::current_timestamp;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Matchboard - live matchmaking demo dashboard
#[derive(Parser)]
#[command(
    name = "matchboard",
    version,
    about = "Live dashboard that streams aggregated demo state to websocket clients",
    long_about = "Matchboard merges independently updated demo state into one JSON document \
                 and streams the latest version of it to every connected websocket client. \
                 Slow clients skip straight to the newest document instead of queueing."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Health check mode
    #[arg(long, help = "Perform health check and exit")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Sweep interval override
    #[arg(
        long,
        value_name = "MS",
        help = "Override how often disconnected subscribers are swept"
    )]
    sweep_interval_ms: Option<u64>,

    /// Disable the demo producers
    #[arg(long, help = "Do not start the built-in uptime and clients producers")]
    no_demo: bool,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Build the service without serving and report its health
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = AppState::new(config.clone()).await?;
    let health = HealthCheck::check(
        &config.service.name,
        current_timestamp(),
        &app_state.metrics(),
        !app_state.is_running(),
    );

    println!("Health Check: {}", health.status);
    println!("  Service: {} v{}", health.service, health.version);
    println!("  Active Subscribers: {}", health.stats.active_subscribers);
    println!("  Snapshots Published: {}", health.stats.snapshots_published);
    println!("  Uptime: {}", health.stats.uptime_info);

    if health.status == HealthStatus::Healthy {
        std::process::exit(0);
    } else {
        std::process::exit(1);
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Matchboard Dashboard Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Dashboard: http://{}:{}",
        config.service.host, config.service.http_port
    );
    info!("   Sweep interval: {}ms", config.broadcast.sweep_interval_ms);
    info!(
        "   Demo producers: uptime={}, clients={} ({} players)",
        config.demo.enable_uptime, config.demo.enable_clients, config.demo.fake_clients
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from file/environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    if let Some(sweep_interval_ms) = args.sweep_interval_ms {
        config.broadcast.sweep_interval_ms = sweep_interval_ms;
    }

    if args.no_demo {
        config.demo.enable_uptime = false;
        config.demo.enable_clients = false;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Matchboard is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Matchboard stopped");
    Ok(())
}
