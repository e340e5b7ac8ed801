//! # Task Gateway
//!
//! An HTTP entry point that admits authenticated clients and hands work off to
//! an asynchronous processing tier through an AMQP broker.
//!
//! Clients never talk to the broker or the workers directly. The gateway:
//!
//! - verifies bearer tokens against the issuer's published signing keys
//! - stores uploaded files in a directory shared with the workers
//! - publishes one durable, persistent task message per upload
//! - opens a fresh broker session for every publish and always closes it
//!
//! ## Architecture
//!
//! - [`auth`] - Token verification and the signing-key cache
//! - [`broker`] - Per-request broker sessions and the queue publisher
//! - [`message`] - Task and probe wire formats
//! - [`storage`] - Write-once file storage
//! - [`server`] - Axum routes, auth middleware and error classification
//! - [`config`] - CLI and environment configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use task_gateway::{
//!     AmqpConnector, AppState, AuthSettings, JwksKeySource, KeyCache, LocalStorage,
//!     QueuePublisher, RouterConfig, TokenVerifier, create_router,
//! };
//! use jsonwebtoken::Algorithm;
//!
//! #[tokio::main]
//! async fn main() {
//!     let issuer = "https://tenant.example.com/";
//!     let settings = AuthSettings::new(issuer, "https://api.example.com", Algorithm::RS256);
//!     let verifier = TokenVerifier::new(KeyCache::new(JwksKeySource::for_issuer(issuer)), &settings);
//!
//!     let publisher = QueuePublisher::new(AmqpConnector::new("amqp://localhost:5672/%2f"));
//!     let state = AppState::new(publisher, LocalStorage::new("/shared/uploads"), verifier);
//!
//!     let router = create_router(state, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod message;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use auth::{
    AuthSettings, JwksKeySource, KeyCache, KeySource, StaticKeySource, Subject, TokenVerifier,
    VerificationKey,
};
pub use broker::{AmqpConnector, BrokerConnector, BrokerSession, QueuePublisher};
pub use config::Config;
pub use error::{AuthError, BrokerError, GatewayError, StorageError, ValidationError};
pub use message::{
    OutboundMessage, ProbeMessage, ProbeUser, Task, TaskStatus, HEALTH_CHECK_QUEUE, TASK_QUEUE,
};
pub use server::{
    classify, create_router, AppState, ErrorResponse, HealthResponse, OptionalSubject,
    ProbeResponse, RouterConfig, UploadResponse,
};
pub use storage::{LocalStorage, StoredFile};
