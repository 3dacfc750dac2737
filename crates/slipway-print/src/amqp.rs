// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// AMQP 0-9-1 broker (RabbitMQ and compatible) for the queue RPC transport.
//
// Everything goes through the default exchange, so a routing key is simply
// a queue name.  Deliveries are consumed without acknowledgements.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use slipway_core::error::{Result, SlipwayError};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::queue_rpc::{Broker, BrokerMessage};

/// A connection plus one channel to an AMQP broker.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
}

impl AmqpBroker {
    /// Connect to `uri` (e.g. `amqp://localhost:5672/%2f`) and open a channel.
    #[instrument(skip_all)]
    pub async fn connect(uri: &str) -> Result<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| SlipwayError::Broker(format!("connect: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SlipwayError::Broker(format!("create channel: {e}")))?;
        info!("connected to AMQP broker");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Close the channel and the connection.
    pub async fn close(&self) -> Result<()> {
        self.channel
            .close(200, "bye")
            .await
            .map_err(|e| SlipwayError::Broker(format!("close channel: {e}")))?;
        self.connection
            .close(200, "bye")
            .await
            .map_err(|e| SlipwayError::Broker(format!("close connection: {e}")))
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_queue(&self, name: Option<&str>) -> Result<String> {
        let options = match name {
            Some(_) => QueueDeclareOptions::default(),
            None => QueueDeclareOptions {
                exclusive: true,
                auto_delete: true,
                ..QueueDeclareOptions::default()
            },
        };
        let queue = self
            .channel
            .queue_declare(name.unwrap_or(""), options, FieldTable::default())
            .await
            .map_err(|e| SlipwayError::Broker(format!("queue declare: {e}")))?;
        let declared = queue.name().as_str().to_owned();
        debug!(queue = %declared, "queue declared");
        Ok(declared)
    }

    async fn publish(&self, routing_key: &str, message: BrokerMessage) -> Result<()> {
        let mut properties = BasicProperties::default();
        if let Some(reply_to) = message.reply_to {
            properties = properties.with_reply_to(ShortString::from(reply_to));
        }
        if let Some(correlation_id) = message.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id));
        }

        self.channel
            .basic_publish(
                "",
                routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties,
            )
            .await
            .map_err(|e| SlipwayError::Broker(format!("publish to {routing_key}: {e}")))?;
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<BrokerMessage>> {
        let tag = format!("slipway-{}", Uuid::new_v4().simple());
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| SlipwayError::Broker(format!("consume {queue}: {e}")))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = queue.to_owned();
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let message = BrokerMessage {
                            reply_to: delivery
                                .properties
                                .reply_to()
                                .as_ref()
                                .map(|s| s.as_str().to_owned()),
                            correlation_id: delivery
                                .properties
                                .correlation_id()
                                .as_ref()
                                .map(|s| s.as_str().to_owned()),
                            body: delivery.data,
                        };
                        if sender.send(message).is_err() {
                            debug!(%queue, "receiver dropped, consumer stopping");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(%queue, error = %e, "consumer stream failed");
                        break;
                    }
                }
            }
        });
        Ok(receiver)
    }
}
