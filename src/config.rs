//! Configuration management for the task gateway.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `GATEWAY_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `GATEWAY_HOST` - Server bind address (default: 0.0.0.0)
//! - `GATEWAY_PORT` - Server port (default: 3000)
//! - `GATEWAY_BROKER_URL` - AMQP broker URL (default: amqp://rabbitmq:5672/%2f)
//! - `GATEWAY_AUTH_ISSUER` - Token issuer base URL (required)
//! - `GATEWAY_AUTH_AUDIENCE` - Expected token audience (required)
//! - `GATEWAY_AUTH_ALGORITHM` - Token signing algorithm (default: RS256)
//! - `GATEWAY_AUTH_JWKS_URL` - JWKS endpoint (default: {issuer}/.well-known/jwks.json)
//! - `GATEWAY_JWKS_CACHE_TTL` - Seconds to trust fetched keys (default: 3600)
//! - `GATEWAY_STORAGE_ROOT` - Shared upload directory (default: /shared/uploads)
//! - `GATEWAY_PUBLISH_TIMEOUT` - Seconds per broker round-trip (default: 10)
//! - `GATEWAY_MAX_UPLOAD_SIZE` - Upload limit in bytes (default: 50 MiB)
//! - `GATEWAY_PROBE_PUBLIC` - Allow anonymous `/test-queue` (default: false)
//! - `GATEWAY_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use jsonwebtoken::Algorithm;
use url::Url;

use crate::auth::{jwks_url_for_issuer, AuthSettings};
use crate::server::DEFAULT_MAX_UPLOAD_BYTES;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default broker URL.
pub const DEFAULT_BROKER_URL: &str = "amqp://rabbitmq:5672/%2f";

/// Default token signing algorithm.
pub const DEFAULT_ALGORITHM: &str = "RS256";

/// Default shared storage directory.
pub const DEFAULT_STORAGE_ROOT: &str = "/shared/uploads";

/// Default JWKS cache TTL in seconds.
pub const DEFAULT_JWKS_CACHE_TTL_SECS: u64 = 3600;

/// Default per-stage broker deadline in seconds.
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Task Gateway - authenticated uploads handed off to an AMQP work queue.
#[derive(Parser, Debug, Clone)]
#[command(name = "task-gateway")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "GATEWAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "GATEWAY_PORT")]
    pub port: u16,

    // =========================================================================
    // Broker Configuration
    // =========================================================================
    /// AMQP URL of the message broker.
    #[arg(long, default_value = DEFAULT_BROKER_URL, env = "GATEWAY_BROKER_URL")]
    pub broker_url: String,

    /// Deadline in seconds for each broker round-trip.
    #[arg(long, default_value_t = DEFAULT_PUBLISH_TIMEOUT_SECS, env = "GATEWAY_PUBLISH_TIMEOUT")]
    pub publish_timeout: u64,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Base URL of the token issuer; must match the `iss` claim exactly.
    #[arg(long, env = "GATEWAY_AUTH_ISSUER")]
    pub auth_issuer: String,

    /// Audience every token must carry.
    #[arg(long, env = "GATEWAY_AUTH_AUDIENCE")]
    pub auth_audience: String,

    /// Signing algorithm tokens must use (e.g. RS256, ES256).
    #[arg(long, default_value = DEFAULT_ALGORITHM, env = "GATEWAY_AUTH_ALGORITHM")]
    pub auth_algorithm: String,

    /// JWKS endpoint. Derived from the issuer when not set.
    #[arg(long, env = "GATEWAY_AUTH_JWKS_URL")]
    pub auth_jwks_url: Option<String>,

    /// Seconds a fetched key set is trusted before refetching.
    #[arg(long, default_value_t = DEFAULT_JWKS_CACHE_TTL_SECS, env = "GATEWAY_JWKS_CACHE_TTL")]
    pub jwks_cache_ttl: u64,

    /// Allow `/test-queue` without a token.
    ///
    /// A token that is supplied is still verified.
    #[arg(long, default_value_t = false, env = "GATEWAY_PROBE_PUBLIC")]
    pub probe_public: bool,

    // =========================================================================
    // Storage Configuration
    // =========================================================================
    /// Directory shared with the workers where uploads are written.
    #[arg(long, default_value = DEFAULT_STORAGE_ROOT, env = "GATEWAY_STORAGE_ROOT")]
    pub storage_root: PathBuf,

    /// Largest accepted upload in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES, env = "GATEWAY_MAX_UPLOAD_SIZE")]
    pub max_upload_size: usize,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "GATEWAY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        let broker = Url::parse(&self.broker_url)
            .map_err(|e| format!("Invalid broker URL '{}': {}", self.broker_url, e))?;
        if broker.scheme() != "amqp" && broker.scheme() != "amqps" {
            return Err(format!(
                "Broker URL must use amqp:// or amqps://, got '{}'",
                broker.scheme()
            ));
        }

        let issuer = Url::parse(&self.auth_issuer)
            .map_err(|e| format!("Invalid issuer URL '{}': {}", self.auth_issuer, e))?;
        if issuer.scheme() != "https" && issuer.scheme() != "http" {
            return Err("Issuer URL must use http:// or https://".to_string());
        }

        if let Some(ref jwks) = self.auth_jwks_url {
            Url::parse(jwks).map_err(|e| format!("Invalid JWKS URL '{}': {}", jwks, e))?;
        }

        if self.auth_audience.trim().is_empty() {
            return Err(
                "Token audience is required. Set --auth-audience or GATEWAY_AUTH_AUDIENCE"
                    .to_string(),
            );
        }

        self.algorithm()?;

        if self.publish_timeout == 0 {
            return Err("publish_timeout must be greater than 0".to_string());
        }
        if self.max_upload_size == 0 {
            return Err("max_upload_size must be greater than 0".to_string());
        }
        if self.storage_root.as_os_str().is_empty() {
            return Err("storage_root must not be empty".to_string());
        }
        // Task messages carry paths under the root; workers must resolve them as-is.
        if !self.storage_root.is_absolute() {
            return Err(format!(
                "storage_root must be an absolute path, got '{}'",
                self.storage_root.display()
            ));
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse the configured signing algorithm.
    pub fn algorithm(&self) -> Result<Algorithm, String> {
        Algorithm::from_str(&self.auth_algorithm)
            .map_err(|_| format!("Unknown signing algorithm '{}'", self.auth_algorithm))
    }

    /// JWKS endpoint, explicit or derived from the issuer.
    pub fn jwks_url(&self) -> String {
        self.auth_jwks_url
            .clone()
            .unwrap_or_else(|| jwks_url_for_issuer(&self.auth_issuer))
    }

    /// Token requirements (call validate() first).
    pub fn auth_settings(&self) -> Result<AuthSettings, String> {
        Ok(AuthSettings::new(
            self.auth_issuer.clone(),
            self.auth_audience.clone(),
            self.algorithm()?,
        ))
    }

    pub fn jwks_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.jwks_cache_ttl)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout)
    }

    /// Broker URL with any password masked, for logging.
    pub fn redacted_broker_url(&self) -> String {
        match Url::parse(&self.broker_url) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            Ok(url) => url.to_string(),
            Err(_) => self.broker_url.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
