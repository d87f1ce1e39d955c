use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use render_relay::config::{AppConfig, ConfigOverrides};
use render_relay::rtc::{PassthroughEncoder, WebRtcSessionFactory};
use render_relay::signaling::run_client;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// render-relay command line arguments
#[derive(Parser, Debug)]
#[command(name = "render-relay")]
#[command(version, about = "WebRTC signaling client streaming rendered sessions", long_about = None)]
struct CliArgs {
    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Signaling server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Signaling server port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Signaling WebSocket path (overrides config file)
    #[arg(long, value_name = "PATH")]
    path: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting render-relay v{}", env!("CARGO_PKG_VERSION"));

    let overrides = ConfigOverrides {
        host: args.host,
        port: args.port,
        path: args.path,
    };
    let config = AppConfig::resolve(args.config.as_deref(), &overrides)?;
    tracing::info!(
        "Signaling server {}, rendering {}x{}@{}",
        config.signaling.url(),
        config.render.width,
        config.render.height,
        config.render.fps
    );

    tracing::warn!(
        "No video encoder configured: raw frames are sent on an H.264 track and will not decode"
    );
    let factory = Arc::new(WebRtcSessionFactory::new(
        config.webrtc.clone(),
        config.render.clone(),
        Arc::new(PassthroughEncoder),
    )?);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!("Failed to listen for CTRL+C: {}", e),
        }
        shutdown.cancel();
    });

    run_client(config.signaling, factory, cancel).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    // Dependency crates run one level quieter than ours
    let filter = match effective_level {
        LogLevel::Error => "render_relay=error,webrtc=error,tungstenite=error",
        LogLevel::Warn => "render_relay=warn,webrtc=error,tungstenite=error",
        LogLevel::Info => "render_relay=info,webrtc=warn,tungstenite=warn",
        LogLevel::Verbose => "render_relay=debug,webrtc=warn,tungstenite=warn",
        LogLevel::Debug => "render_relay=debug,webrtc=info,tungstenite=info",
        LogLevel::Trace => "render_relay=trace,webrtc=debug,tungstenite=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}
