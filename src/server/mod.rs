//! HTTP server layer for the task gateway.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │          GET /test-queue          POST /upload                  │
//! │                                                                 │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌───────────┐  │
//! │  │    auth    │  │  handlers  │  │ responder  │  │  routes   │  │
//! │  │ (bearer)   │  │ (requests) │  │ (classify) │  │ (router)  │  │
//! │  └────────────┘  └────────────┘  └────────────┘  └───────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod responder;
pub mod routes;

pub use auth::{bearer_token, optional_auth, require_auth, OptionalSubject};
pub use handlers::{
    health_handler, test_queue_handler, upload_handler, AppState, HealthResponse, ProbeResponse,
    UploadResponse, FILE_FIELD,
};
pub use responder::{classify, ErrorResponse, INVALID_TOKEN_MESSAGE};
pub use routes::{create_router, RouterConfig, DEFAULT_MAX_UPLOAD_BYTES};
