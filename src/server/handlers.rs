//! HTTP request handlers for the task gateway.
//!
//! # Endpoints
//!
//! - `GET /test-queue` - Publish a probe message to `health_check`
//! - `POST /upload` - Store a file and queue a task on `task_queue`
//! - `GET /health` - Liveness check (never touches the broker)

use std::sync::Arc;

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Subject, TokenVerifier};
use crate::broker::{BrokerConnector, QueuePublisher};
use crate::error::{GatewayError, ValidationError};
use crate::message::{OutboundMessage, ProbeMessage, Task, HEALTH_CHECK_QUEUE, TASK_QUEUE};
use crate::storage::{LocalStorage, StoredFile};

use super::auth::OptionalSubject;

/// Multipart field that carries the uploaded file.
pub const FILE_FIELD: &str = "file";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state.
///
/// Everything in here is read-only per request; the only interior mutability
/// is the key cache inside the verifier.
pub struct AppState<C: BrokerConnector> {
    /// Publisher opening one broker session per request
    pub publisher: Arc<QueuePublisher<C>>,

    /// Shared storage for uploaded files
    pub storage: Arc<LocalStorage>,

    /// Bearer token verifier used by the auth stage
    pub verifier: Arc<TokenVerifier>,
}

impl<C: BrokerConnector> AppState<C> {
    pub fn new(
        publisher: QueuePublisher<C>,
        storage: LocalStorage,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            publisher: Arc::new(publisher),
            storage: Arc::new(storage),
            verifier: Arc::new(verifier),
        }
    }
}

impl<C: BrokerConnector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            publisher: Arc::clone(&self.publisher),
            storage: Arc::clone(&self.storage),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from `GET /test-queue`.
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub status: String,
    pub message: String,
    /// Verified subject, `null` for anonymous probes
    pub user: Option<String>,
}

/// Response from `POST /upload`.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: String,
    pub task_id: Uuid,
    pub message: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Publish a probe message to the `health_check` queue.
///
/// # Endpoint
///
/// `GET /test-queue`
///
/// # Response
///
/// - `200 OK`: `{status: "success", message, user}`
/// - `401 Unauthorized`: missing or invalid token
/// - `500 Internal Server Error`: broker failure
pub async fn test_queue_handler<C: BrokerConnector>(
    State(state): State<AppState<C>>,
    OptionalSubject(subject): OptionalSubject,
) -> Result<Json<ProbeResponse>, GatewayError> {
    let probe = ProbeMessage::new(subject.as_ref());
    state
        .publisher
        .publish(&OutboundMessage::probe(&probe)?)
        .await?;

    info!(
        queue = HEALTH_CHECK_QUEUE,
        user = subject.as_ref().map(Subject::as_str).unwrap_or("-"),
        "Probe sent"
    );

    Ok(Json(ProbeResponse {
        status: "success".to_string(),
        message: format!("Sent to {}", HEALTH_CHECK_QUEUE),
        user: subject.map(Subject::into_inner),
    }))
}

/// Store an uploaded file and queue a task for it.
///
/// # Endpoint
///
/// `POST /upload` with `multipart/form-data` carrying one `file` part.
///
/// # Response
///
/// - `200 OK`: `{status: "queued", task_id, message}`
/// - `400 Bad Request`: no file part, several file parts, or broken multipart
/// - `401 Unauthorized`: missing or invalid token
/// - `500 Internal Server Error`: storage or broker failure
///
/// A file that was stored before a failed publish stays in storage; the
/// client gets a 500 and a resubmission creates a new file and task.
pub async fn upload_handler<C: BrokerConnector>(
    State(state): State<AppState<C>>,
    subject: Subject,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, GatewayError> {
    let mut multipart = multipart.map_err(multipart_rejection)?;
    let upload = receive_upload(&state.storage, &mut multipart).await?;

    let task = Task::pending(
        subject.into_inner(),
        upload.file.path_string(),
        upload.original_name,
    );

    if let Err(e) = state.publisher.publish(&OutboundMessage::task(&task)?).await {
        warn!(
            task_id = %task.task_id,
            file_path = %task.file_path,
            "Task not queued, uploaded file left in storage: {}",
            e
        );
        return Err(e.into());
    }

    info!(
        queue = TASK_QUEUE,
        task_id = %task.task_id,
        user = %task.user_id,
        bytes = upload.file.bytes,
        "Task queued"
    );

    Ok(Json(UploadResponse {
        status: "queued".to_string(),
        task_id: task.task_id,
        message: "File uploaded and queued for processing".to_string(),
    }))
}

// =============================================================================
// Multipart Intake
// =============================================================================

struct ReceivedUpload {
    original_name: String,
    file: StoredFile,
}

/// Stream the single `file` part of a multipart body into storage.
///
/// Parts with other names, and `file` parts without a filename, are skipped.
async fn receive_upload(
    storage: &LocalStorage,
    multipart: &mut Multipart,
) -> Result<ReceivedUpload, GatewayError> {
    let mut received: Option<ReceivedUpload> = None;

    loop {
        let next = multipart.next_field().await;
        let mut field = match next {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                if let Some(upload) = &received {
                    storage.remove(&upload.file).await;
                }
                return Err(multipart_error(e));
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_name = match field.file_name() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => continue,
        };

        if let Some(upload) = &received {
            storage.remove(&upload.file).await;
            return Err(ValidationError::MultipleFiles.into());
        }

        let mut writer = storage.create(&original_name).await?;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = writer.write_chunk(&chunk).await {
                        writer.discard().await;
                        return Err(e.into());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    writer.discard().await;
                    return Err(multipart_error(e));
                }
            }
        }

        received = Some(ReceivedUpload {
            original_name,
            file: writer.finish().await?,
        });
    }

    received.ok_or_else(|| ValidationError::MissingFile.into())
}

/// A body axum could not open as multipart (wrong content type, no boundary).
fn multipart_rejection(rejection: MultipartRejection) -> GatewayError {
    ValidationError::Multipart(rejection.body_text()).into()
}

fn multipart_error(err: MultipartError) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::TooLarge.into()
    } else {
        ValidationError::Multipart(err.body_text()).into()
    }
}
