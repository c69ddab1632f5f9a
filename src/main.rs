use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use transcription_relay::{create_router, AppState, Config, DeepgramFactory, SessionRegistry};

#[derive(Parser)]
#[command(name = "transcription-relay")]
#[command(about = "Relay live audio to a streaming transcription service over WebSocket")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/transcription-relay")]
    config: String,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    let api_key = cfg.upstream.resolve_api_key().with_context(|| {
        format!(
            "No upstream API key: set upstream.api_key or {}",
            transcription_relay::config::API_KEY_ENV
        )
    })?;

    info!("Loaded config: {}", cfg.service.name);
    info!(
        model = %cfg.upstream.model,
        language = %cfg.upstream.language,
        "Upstream: {}",
        cfg.upstream.url
    );

    let registry = SessionRegistry::new();
    let factory = Arc::new(DeepgramFactory::new(cfg.upstream.clone(), api_key));
    let state = AppState::new(registry.clone(), factory, cfg.relay.clone());
    let app = create_router(state, &cfg.service.http.path);

    let addr: SocketAddr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port)
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        "WebSocket relay listening on ws://{}{}",
        listener.local_addr().context("Failed to read listen address")?,
        cfg.service.http.path
    );

    // Each session may take its close timeout plus the upstream grace to tear down
    let drain_timeout = cfg.relay.close_timeout() + cfg.upstream.close_grace() + Duration::from_secs(1);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry, drain_timeout))
        .await
        .context("Server error")?;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal(registry: SessionRegistry, drain_timeout: Duration) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Shutdown requested, closing {} active sessions", registry.len().await);
    registry.shutdown();

    if !registry.wait_until_empty(drain_timeout).await {
        warn!(
            "{} sessions still open after {:?}",
            registry.len().await,
            drain_timeout
        );
    }
}
