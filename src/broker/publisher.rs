use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{BrokerConnector, BrokerSession};
use crate::error::BrokerError;
use crate::message::OutboundMessage;

/// Default deadline for each broker round-trip.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes messages using a fresh broker session per call.
///
/// Every session that was opened is closed, whether the declare/publish
/// succeeded, failed, or ran past its deadline. The round-trip runs on its own
/// task, so a caller that goes away mid-publish (client disconnect) does not
/// leave the session open.
pub struct QueuePublisher<C: BrokerConnector> {
    connector: Arc<C>,
    timeout: Duration,
}

impl<C: BrokerConnector> QueuePublisher<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Set the per-stage deadline (connect, declare+publish, close).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Declare the message's queue and publish it.
    pub async fn publish(&self, message: &OutboundMessage) -> Result<(), BrokerError> {
        let connector = Arc::clone(&self.connector);
        let timeout = self.timeout;
        let owned = message.clone();

        let task = tokio::spawn(async move { round_trip(&*connector, timeout, &owned).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(BrokerError::Publish {
                queue: message.queue().to_string(),
                message: format!("publish task failed: {}", e),
            }),
        }
    }
}

/// Connect, deliver, and always close.
async fn round_trip<C: BrokerConnector>(
    connector: &C,
    timeout: Duration,
    message: &OutboundMessage,
) -> Result<(), BrokerError> {
    let mut session = stage(timeout, "connect", connector.connect()).await?;

    let outcome = stage(timeout, "publish", deliver(&mut session, message)).await;

    if let Err(e) = stage(timeout, "close", session.close()).await {
        warn!(queue = message.queue(), "Broker session close failed: {}", e);
    }

    if outcome.is_ok() {
        debug!(
            queue = message.queue(),
            durable = message.durable(),
            persistent = message.persistent(),
            bytes = message.body().len(),
            "Message published"
        );
    }

    outcome
}

async fn stage<T, F>(timeout: Duration, stage: &'static str, fut: F) -> Result<T, BrokerError>
where
    F: Future<Output = Result<T, BrokerError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::Timeout {
            stage,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

async fn deliver<S: BrokerSession>(
    session: &mut S,
    message: &OutboundMessage,
) -> Result<(), BrokerError> {
    session
        .declare_queue(message.queue(), message.durable())
        .await?;
    session
        .publish(message.queue(), message.body(), message.persistent())
        .await
}
