//! AMQP 0-9-1 broker sessions backed by `lapin`.

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::debug;

use super::{BrokerConnector, BrokerSession};
use crate::error::BrokerError;

const REPLY_SUCCESS: u16 = 200;

const DELIVERY_MODE_TRANSIENT: u8 = 1;
const DELIVERY_MODE_PERSISTENT: u8 = 2;

const CONTENT_TYPE_JSON: &str = "application/json";

/// Opens a new AMQP connection per session.
///
/// # Example
///
/// ```ignore
/// use task_gateway::broker::{AmqpConnector, QueuePublisher};
///
/// let publisher = QueuePublisher::new(AmqpConnector::new("amqp://rabbitmq:5672/%2f"));
/// ```
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    uri: String,
}

impl AmqpConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    type Session = AmqpSession;

    async fn connect(&self) -> Result<AmqpSession, BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(e.to_string()))?;

        let channel = match open_confirm_channel(&connection).await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(REPLY_SUCCESS, "channel setup failed").await;
                return Err(BrokerError::Connect(e.to_string()));
            }
        };

        debug!(channel_id = channel.id(), "Broker session opened");
        Ok(AmqpSession {
            connection,
            channel,
        })
    }
}

async fn open_confirm_channel(connection: &Connection) -> Result<Channel, lapin::Error> {
    let channel = connection.create_channel().await?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await?;
    Ok(channel)
}

/// A single connection + confirm-mode channel.
pub struct AmqpSession {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerSession for AmqpSession {
    async fn declare_queue(&mut self, queue: &str, durable: bool) -> Result<(), BrokerError> {
        let options = QueueDeclareOptions {
            durable,
            ..QueueDeclareOptions::default()
        };

        self.channel
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map(|_| ())
            .map_err(|e| {
                if is_precondition_failed(&e) {
                    BrokerError::DeclareConflict {
                        queue: queue.to_string(),
                        message: e.to_string(),
                    }
                } else {
                    BrokerError::Declare {
                        queue: queue.to_string(),
                        message: e.to_string(),
                    }
                }
            })
    }

    async fn publish(
        &mut self,
        queue: &str,
        body: &[u8],
        persistent: bool,
    ) -> Result<(), BrokerError> {
        let delivery_mode = if persistent {
            DELIVERY_MODE_PERSISTENT
        } else {
            DELIVERY_MODE_TRANSIENT
        };
        let properties = BasicProperties::default()
            .with_delivery_mode(delivery_mode)
            .with_content_type(CONTENT_TYPE_JSON.into());

        let publish_error = |e: lapin::Error| BrokerError::Publish {
            queue: queue.to_string(),
            message: e.to_string(),
        };

        let confirmation = self
            .channel
            .basic_publish("", queue, BasicPublishOptions::default(), body, properties)
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        if confirmation.is_nack() {
            return Err(BrokerError::Nacked {
                queue: queue.to_string(),
            });
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        // A failed declare already closed the channel broker-side; the
        // connection still has to be closed.
        let channel = self.channel.close(REPLY_SUCCESS, "OK").await;
        let connection = self.connection.close(REPLY_SUCCESS, "OK").await;

        if let Err(e) = &channel {
            debug!("Channel close: {}", e);
        }
        connection.map_err(|e| BrokerError::Connect(format!("close failed: {}", e)))
    }
}

fn is_precondition_failed(err: &lapin::Error) -> bool {
    matches!(
        err,
        lapin::Error::ProtocolError(amqp)
            if matches!(amqp.kind(), AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED))
    )
}
