//! Task Gateway - authenticated uploads handed off to an AMQP work queue.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use task_gateway::{
    config::Config,
    server::{create_router, AppState, RouterConfig},
    AmqpConnector, JwksKeySource, KeyCache, LocalStorage, QueuePublisher, TokenVerifier,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let settings = match config.auth_settings() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Task Gateway v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Broker: {}", config.redacted_broker_url());
    info!("  Publish timeout: {}s", config.publish_timeout);
    info!("  Issuer: {}", config.auth_issuer);
    info!("  Audience: {}", config.auth_audience);
    info!("  Algorithm: {:?}", settings.algorithm);
    info!("  JWKS: {} (cache {}s)", config.jwks_url(), config.jwks_cache_ttl);
    info!("  Storage root: {}", config.storage_root.display());
    info!("  Max upload: {} bytes", config.max_upload_size);

    if config.probe_public {
        warn!("  /test-queue accepts anonymous requests");
    }

    // Storage must be writable before we accept uploads
    let storage = LocalStorage::new(config.storage_root.clone());
    if let Err(e) = storage.ensure_root().await {
        error!("Failed to prepare storage root: {}", e);
        return ExitCode::FAILURE;
    }

    let keys = KeyCache::new(JwksKeySource::new(config.jwks_url())).with_ttl(config.jwks_cache_ttl());
    let verifier = TokenVerifier::new(keys, &settings);

    let publisher = QueuePublisher::new(AmqpConnector::new(config.broker_url.clone()))
        .with_timeout(config.publish_timeout());

    let state = AppState::new(publisher, storage, verifier);
    let router = create_router(state, build_router_config(&config));

    let addr = config.bind_address();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Gateway listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "task_gateway=debug,tower_http=debug"
    } else {
        "task_gateway=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application Config.
fn build_router_config(config: &Config) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_probe_public(config.probe_public)
        .with_max_upload_bytes(config.max_upload_size)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}
