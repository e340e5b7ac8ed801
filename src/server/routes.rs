//! Router configuration for the task gateway.
//!
//! Every request runs through the same ordered stages:
//!
//! ```text
//! TraceLayer → CorsLayer → auth stage → handler
//!                              │            │
//!                              └──── GatewayError ──→ classify → response
//! ```
//!
//! # Route Structure
//!
//! ```text
//! /health       - Liveness check (public)
//! /test-queue   - Probe publish (protected, or optional auth when public)
//! /upload       - File upload (protected)
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{optional_auth, require_auth};
use super::handlers::{health_handler, test_queue_handler, upload_handler, AppState};
use crate::broker::BrokerConnector;

/// Default upload size limit (50 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Whether `/test-queue` accepts anonymous requests
    pub probe_public: bool,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Largest accepted upload body in bytes
    pub max_upload_bytes: usize,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            probe_public: false,
            cors_origins: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `/test-queue` run without a token.
    pub fn with_probe_public(mut self, public: bool) -> Self {
        self.probe_public = public;
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
pub fn create_router<C: BrokerConnector>(state: AppState<C>, config: RouterConfig) -> Router {
    let verifier = state.verifier.clone();

    let upload_routes = Router::new()
        .route("/upload", post(upload_handler::<C>))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .route_layer(middleware::from_fn_with_state(
            verifier.clone(),
            require_auth,
        ));

    let probe_routes = Router::new().route("/test-queue", get(test_queue_handler::<C>));
    let probe_routes = if config.probe_public {
        probe_routes.route_layer(middleware::from_fn_with_state(verifier, optional_auth))
    } else {
        probe_routes.route_layer(middleware::from_fn_with_state(verifier, require_auth))
    };

    let router = Router::new()
        .merge(upload_routes)
        .merge(probe_routes)
        .with_state(state)
        .route("/health", get(health_handler))
        .layer(build_cors_layer(&config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}
