//! Message types exchanged with the worker tier.
//!
//! Two shapes cross the broker boundary:
//!
//! - [`Task`] on `task_queue` (durable queue, persistent delivery)
//! - [`ProbeMessage`] on `health_check` (non-durable queue, transient delivery)
//!
//! [`OutboundMessage`] is the envelope handed to the publisher. It can only be
//! built from one of the two shapes, which pins each shape to its queue and
//! durability class.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Subject;
use crate::error::BrokerError;

/// Queue consumed by the processing workers.
pub const TASK_QUEUE: &str = "task_queue";

/// Queue used for wiring checks.
pub const HEALTH_CHECK_QUEUE: &str = "health_check";

/// Sender tag stamped on every probe message.
pub const PROBE_SENDER: &str = "gateway-service";

/// Fixed probe payload.
pub const PROBE_CONTENT: &str = "ping";

// =============================================================================
// Task
// =============================================================================

/// Lifecycle state of a task as seen by the gateway.
///
/// The gateway only ever creates tasks; later states belong to the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
}

/// A unit of deferred work created by an upload.
///
/// `file_path` locates the uploaded bytes; `task_id` is the handle returned to
/// the client. The two are generated independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub user_id: String,
    pub file_path: String,
    pub original_name: String,
    pub status: TaskStatus,
}

impl Task {
    /// Create a pending task with a freshly generated id.
    pub fn pending(
        user_id: impl Into<String>,
        file_path: impl Into<String>,
        original_name: impl Into<String>,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            user_id: user_id.into(),
            file_path: file_path.into(),
            original_name: original_name.into(),
            status: TaskStatus::Pending,
        }
    }
}

// =============================================================================
// Probe
// =============================================================================

/// Subject attached to a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeUser {
    pub sub: String,
}

/// Diagnostic message published by `GET /test-queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeMessage {
    pub sender: String,
    pub content: String,
    /// RFC 3339 UTC timestamp with millisecond precision
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ProbeUser>,
}

impl ProbeMessage {
    /// Build a probe stamped with the current time.
    pub fn new(subject: Option<&Subject>) -> Self {
        Self::at(Utc::now(), subject)
    }

    /// Build a probe stamped with the given time.
    pub fn at(now: DateTime<Utc>, subject: Option<&Subject>) -> Self {
        Self {
            sender: PROBE_SENDER.to_string(),
            content: PROBE_CONTENT.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            user: subject.map(|s| ProbeUser {
                sub: s.as_str().to_string(),
            }),
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// A serialized message ready for the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    queue: &'static str,
    durable: bool,
    persistent: bool,
    body: Vec<u8>,
}

impl OutboundMessage {
    /// Envelope for a task: durable queue, persistent delivery.
    pub fn task(task: &Task) -> Result<Self, BrokerError> {
        Ok(Self {
            queue: TASK_QUEUE,
            durable: true,
            persistent: true,
            body: encode(task)?,
        })
    }

    /// Envelope for a probe: non-durable queue, transient delivery.
    pub fn probe(probe: &ProbeMessage) -> Result<Self, BrokerError> {
        Ok(Self {
            queue: HEALTH_CHECK_QUEUE,
            durable: false,
            persistent: false,
            body: encode(probe)?,
        })
    }

    pub fn queue(&self) -> &'static str {
        self.queue
    }

    pub fn durable(&self) -> bool {
        self.durable
    }

    pub fn persistent(&self) -> bool {
        self.persistent
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, BrokerError> {
    serde_json::to_vec(value).map_err(|e| BrokerError::Encode(e.to_string()))
}
