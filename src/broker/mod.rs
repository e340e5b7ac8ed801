//! Message broker access.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             QueuePublisher              │
//! │  connect → declare → publish → close    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   BrokerConnector / BrokerSession       │
//! │   (one session per publish, no pool)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │      AmqpConnector (lapin, AMQP 0-9-1)  │
//! └─────────────────────────────────────────┘
//! ```

mod amqp;
mod publisher;

use async_trait::async_trait;

use crate::error::BrokerError;

pub use amqp::{AmqpConnector, AmqpSession};
pub use publisher::{QueuePublisher, DEFAULT_PUBLISH_TIMEOUT};

/// Opens broker sessions.
#[async_trait]
pub trait BrokerConnector: Send + Sync + 'static {
    /// Session type produced by this connector
    type Session: BrokerSession + 'static;

    /// Open a fresh connection and channel.
    async fn connect(&self) -> Result<Self::Session, BrokerError>;
}

/// A connection + channel pair used for exactly one publish.
#[async_trait]
pub trait BrokerSession: Send {
    /// Declare `queue` with the given durability. Idempotent for matching
    /// durability; a mismatch is [`BrokerError::DeclareConflict`].
    async fn declare_queue(&mut self, queue: &str, durable: bool) -> Result<(), BrokerError>;

    /// Publish `body` to `queue` via the default exchange and wait for the
    /// broker to acknowledge it.
    async fn publish(&mut self, queue: &str, body: &[u8], persistent: bool)
        -> Result<(), BrokerError>;

    /// Close channel and connection. Must be safe to call after a failed
    /// declare or publish.
    async fn close(&mut self) -> Result<(), BrokerError>;
}
