// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Queue RPC transport.
//
// Request/reply over a message broker: the client publishes a request to
// the server's routing key, naming its own exclusive reply queue and a fresh
// correlation id; the server publishes the reply to that queue with the same
// id.  Replies carrying any other id are discarded by the client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slipway_core::codec;
use slipway_core::error::{Result, SlipwayError};
use slipway_core::protocol::{Envelope, Reply};
use slipway_core::types::ServerStatus;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::client::JobClient;
use crate::dispatcher::JobDispatcher;
use crate::handler;

// ---------------------------------------------------------------------------
// Broker abstraction
// ---------------------------------------------------------------------------

/// A message as seen by the broker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerMessage {
    pub body: Vec<u8>,
    /// Queue the receiver should answer on.
    pub reply_to: Option<String>,
    /// Opaque id echoed back in the reply.
    pub correlation_id: Option<String>,
}

/// The slice of a message broker the RPC layer needs: named queues on a
/// default exchange.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declare a queue and return its name.
    ///
    /// `None` asks the broker for an exclusive queue with a generated name.
    async fn declare_queue(&self, name: Option<&str>) -> Result<String>;

    /// Publish to the queue named `routing_key`.
    async fn publish(&self, routing_key: &str, message: BrokerMessage) -> Result<()>;

    /// Start consuming `queue`.
    async fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<BrokerMessage>>;
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

struct MemoryQueue {
    sender: mpsc::UnboundedSender<BrokerMessage>,
    receiver: Option<mpsc::UnboundedReceiver<BrokerMessage>>,
    /// Server-named queues disappear once their consumer is gone.
    auto_delete: bool,
}

impl MemoryQueue {
    fn abandoned(&self) -> bool {
        self.auto_delete && self.receiver.is_none() && self.sender.is_closed()
    }
}

/// In-process broker: each queue is an unbounded channel with at most one
/// consumer.  Clones share the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<Mutex<HashMap<String, MemoryQueue>>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live queues.
    pub fn queue_count(&self) -> usize {
        self.lock().len()
    }

    /// Lock the queue table, dropping auto-delete queues whose consumer
    /// has gone away.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryQueue>> {
        let mut queues = self.queues.lock().expect("broker lock poisoned");
        queues.retain(|name, queue| {
            let keep = !queue.abandoned();
            if !keep {
                debug!(queue = %name, "auto-delete queue removed");
            }
            keep
        });
        queues
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_queue(&self, name: Option<&str>) -> Result<String> {
        let (name, auto_delete) = match name {
            Some(name) => (name.to_owned(), false),
            None => (format!("amq.gen-{}", Uuid::new_v4().simple()), true),
        };
        self.lock().entry(name.clone()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            MemoryQueue {
                sender,
                receiver: Some(receiver),
                auto_delete,
            }
        });
        debug!(queue = %name, "queue declared");
        Ok(name)
    }

    async fn publish(&self, routing_key: &str, message: BrokerMessage) -> Result<()> {
        let queues = self.lock();
        match queues.get(routing_key) {
            Some(queue) => {
                if queue.sender.send(message).is_err() {
                    warn!(queue = routing_key, "consumer gone, message dropped");
                }
            }
            None => warn!(queue = routing_key, "no such queue, message dropped"),
        }
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<mpsc::UnboundedReceiver<BrokerMessage>> {
        let mut queues = self.lock();
        let entry = queues
            .get_mut(queue)
            .ok_or_else(|| SlipwayError::Broker(format!("no such queue {queue}")))?;
        entry
            .receiver
            .take()
            .ok_or_else(|| SlipwayError::Broker(format!("queue {queue} already has a consumer")))
    }
}

// ---------------------------------------------------------------------------
// QueueRpcClient
// ---------------------------------------------------------------------------

/// Client side of the queue transport.
pub struct QueueRpcClient {
    broker: Arc<dyn Broker>,
    routing_key: String,
    reply_queue: String,
    replies: mpsc::UnboundedReceiver<BrokerMessage>,
    timeout: Duration,
}

impl QueueRpcClient {
    /// Declare a private reply queue and start listening on it.
    #[instrument(skip_all)]
    pub async fn connect(
        broker: Arc<dyn Broker>,
        routing_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let routing_key = routing_key.into();
        let reply_queue = broker.declare_queue(None).await?;
        let replies = broker.consume(&reply_queue).await?;
        info!(%routing_key, %reply_queue, "queue RPC client ready");
        Ok(Self {
            broker,
            routing_key,
            reply_queue,
            replies,
            timeout,
        })
    }

    /// Name of the private reply queue.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }
}

#[async_trait]
impl JobClient for QueueRpcClient {
    async fn call(&mut self, envelope: &Envelope) -> Result<Reply> {
        // Late replies to earlier calls that timed out.
        while let Ok(stale) = self.replies.try_recv() {
            debug!(correlation_id = ?stale.correlation_id, "dropping stale reply");
        }

        let correlation_id = Uuid::new_v4().to_string();
        let message = BrokerMessage {
            body: codec::encode(envelope)?,
            reply_to: Some(self.reply_queue.clone()),
            correlation_id: Some(correlation_id.clone()),
        };
        self.broker.publish(&self.routing_key, message).await?;
        debug!(%correlation_id, routing_key = %self.routing_key, "request published");

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let delivery = tokio::time::timeout_at(deadline, self.replies.recv())
                .await
                .map_err(|_| {
                    SlipwayError::Timeout(format!(
                        "no reply for {correlation_id} within {}ms",
                        self.timeout.as_millis()
                    ))
                })?
                .ok_or_else(|| SlipwayError::Broker("reply queue closed".into()))?;

            if delivery.correlation_id.as_deref() == Some(correlation_id.as_str()) {
                return codec::decode(&delivery.body);
            }
            debug!(
                expected = %correlation_id,
                got = ?delivery.correlation_id,
                "discarding reply with foreign correlation id"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// QueueRpcServer
// ---------------------------------------------------------------------------

/// Consumes requests from a routing key and answers on each `reply_to`.
pub struct QueueRpcServer {
    routing_key: String,
    status: ServerStatus,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
}

impl QueueRpcServer {
    pub fn new(routing_key: impl Into<String>) -> Self {
        Self {
            routing_key: routing_key.into(),
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
        }
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Declare the request queue and start consuming it.
    pub async fn start(
        &mut self,
        broker: Arc<dyn Broker>,
        dispatcher: Arc<JobDispatcher>,
    ) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!(routing_key = %self.routing_key, "queue RPC server already running");
            return Ok(());
        }
        self.status = ServerStatus::Starting;

        let requests = match Self::subscribe(broker.as_ref(), &self.routing_key).await {
            Ok(requests) => requests,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(e);
            }
        };
        info!(routing_key = %self.routing_key, "queue RPC server consuming");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let handle = tokio::spawn(async move {
            Self::consume_loop(requests, broker, dispatcher, shutdown).await;
        });

        self.task_handle = Some(handle);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Stop consuming and wait for the consumer task to exit.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }
        info!(routing_key = %self.routing_key, "stopping queue RPC server");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| SlipwayError::Transport(format!("task join: {e}")))?;
        }
        self.status = ServerStatus::Stopped;
        Ok(())
    }

    async fn subscribe(
        broker: &dyn Broker,
        routing_key: &str,
    ) -> Result<mpsc::UnboundedReceiver<BrokerMessage>> {
        broker.declare_queue(Some(routing_key)).await?;
        broker.consume(routing_key).await
    }

    async fn consume_loop(
        mut requests: mpsc::UnboundedReceiver<BrokerMessage>,
        broker: Arc<dyn Broker>,
        dispatcher: Arc<JobDispatcher>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("consume loop received shutdown signal");
                    break;
                }

                request = requests.recv() => {
                    let Some(request) = request else {
                        warn!("request queue closed");
                        break;
                    };
                    if let Err(e) = Self::answer(broker.as_ref(), &dispatcher, request).await {
                        warn!(error = %e, "failed to answer request");
                    }
                }
            }
        }
    }

    async fn answer(
        broker: &dyn Broker,
        dispatcher: &Arc<JobDispatcher>,
        request: BrokerMessage,
    ) -> Result<()> {
        let BrokerMessage {
            body,
            reply_to,
            correlation_id,
        } = request;
        debug!(?correlation_id, bytes = body.len(), "request received");

        let reply = handler::handle_request(Arc::clone(dispatcher), body).await?;
        let Some(reply_to) = reply_to else {
            warn!(?correlation_id, "request has no reply_to, reply dropped");
            return Ok(());
        };
        broker
            .publish(
                &reply_to,
                BrokerMessage {
                    body: reply,
                    reply_to: None,
                    correlation_id,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_core::protocol::{Arg, Command, ReplyStatus};
    use slipway_core::types::{JobId, JobState};

    use crate::device::RecordingPrinter;
    use crate::dispatcher::DispatcherConfig;

    const ROUTING_KEY: &str = "slipway_jobs";
    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn running_server(broker: &MemoryBroker) -> (QueueRpcServer, Arc<JobDispatcher>) {
        let dispatcher = Arc::new(JobDispatcher::start(
            RecordingPrinter::new(),
            DispatcherConfig::default(),
        ));
        let mut server = QueueRpcServer::new(ROUTING_KEY);
        server
            .start(Arc::new(broker.clone()), Arc::clone(&dispatcher))
            .await
            .expect("start");
        (server, dispatcher)
    }

    #[tokio::test]
    async fn memory_broker_allows_one_consumer_per_queue() {
        let broker = MemoryBroker::new();
        let name = broker.declare_queue(None).await.expect("declare");
        assert!(name.starts_with("amq.gen-"));

        assert!(broker.consume(&name).await.is_ok());
        assert!(matches!(
            broker.consume(&name).await,
            Err(SlipwayError::Broker(_))
        ));
        assert!(broker.consume("missing").await.is_err());
    }

    #[tokio::test]
    async fn reply_queues_of_dropped_clients_are_removed() {
        let broker = MemoryBroker::new();
        let (mut server, dispatcher) = running_server(&broker).await;
        assert_eq!(broker.queue_count(), 1);

        for _ in 0..100 {
            let client = QueueRpcClient::connect(Arc::new(broker.clone()), ROUTING_KEY, TIMEOUT)
                .await
                .expect("connect");
            drop(client);
        }
        // Only the server's named request queue is left.
        assert_eq!(broker.queue_count(), 1);

        server.stop().await.expect("stop");
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn named_queue_outlives_its_consumer() {
        let broker = MemoryBroker::new();
        broker.declare_queue(Some("orders")).await.expect("declare");
        drop(broker.consume("orders").await.expect("consume"));
        assert_eq!(broker.queue_count(), 1);
    }

    #[tokio::test]
    async fn unroutable_publish_is_dropped() {
        let broker = MemoryBroker::new();
        broker
            .publish("nowhere", BrokerMessage::default())
            .await
            .expect("publish");
    }

    #[tokio::test]
    async fn submit_and_query_round_trip() {
        let broker = MemoryBroker::new();
        let (mut server, dispatcher) = running_server(&broker).await;
        let mut client = QueueRpcClient::connect(Arc::new(broker.clone()), ROUTING_KEY, TIMEOUT)
            .await
            .expect("connect");

        let reply = client
            .send_rich_text(vec![
                Command::bare("inverseOn"),
                Command::call("println", vec![Arg::from("hi")]),
                Command::bare("inverseOff"),
            ])
            .await
            .expect("call");
        assert_eq!(reply.status, ReplyStatus::Ok);
        let id = reply.job_id.expect("job id");

        let mut state = None;
        for _ in 0..200 {
            state = client.query_job_state(&id).await.expect("query").state;
            if state == Some(JobState::Done) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state, Some(JobState::Done));

        let unknown = client
            .query_job_state(&JobId::new().to_string())
            .await
            .expect("query");
        assert_eq!(unknown.status, ReplyStatus::NotFound);

        server.stop().await.expect("stop");
        assert_eq!(server.status(), ServerStatus::Stopped);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn untyped_request_is_rejected() {
        let broker = MemoryBroker::new();
        let (mut server, dispatcher) = running_server(&broker).await;
        let mut client = QueueRpcClient::connect(Arc::new(broker.clone()), ROUTING_KEY, TIMEOUT)
            .await
            .expect("connect");

        let reply = client.call(&Envelope::default()).await.expect("call");
        assert_eq!(reply.status, ReplyStatus::Rejected);
        assert!(dispatcher.is_empty());

        server.stop().await.expect("stop");
        dispatcher.shutdown().await;
    }

    /// Answers every request with a decoy first, then the real reply.
    async fn spawn_decoy_server(broker: MemoryBroker, answer_correctly: bool) {
        broker.declare_queue(Some(ROUTING_KEY)).await.expect("declare");
        let mut requests = broker.consume(ROUTING_KEY).await.expect("consume");
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let reply_to = request.reply_to.clone().expect("reply_to");
                let decoy = BrokerMessage {
                    body: codec::encode(&Reply::error("decoy")).expect("encode"),
                    reply_to: None,
                    correlation_id: Some("someone-else".into()),
                };
                broker.publish(&reply_to, decoy).await.expect("publish");

                if answer_correctly {
                    let real = BrokerMessage {
                        body: codec::encode(&Reply::job(JobId::new(), JobState::Queued))
                            .expect("encode"),
                        reply_to: None,
                        correlation_id: request.correlation_id.clone(),
                    };
                    broker.publish(&reply_to, real).await.expect("publish");
                }
            }
        });
    }

    #[tokio::test]
    async fn reply_with_foreign_correlation_id_is_discarded() {
        let broker = MemoryBroker::new();
        spawn_decoy_server(broker.clone(), true).await;
        let mut client = QueueRpcClient::connect(Arc::new(broker), ROUTING_KEY, TIMEOUT)
            .await
            .expect("connect");

        let reply = client.send_simple_text("hi", false).await.expect("call");
        assert!(reply.is_ok());
        assert_eq!(reply.state, Some(JobState::Queued));
    }

    #[tokio::test]
    async fn only_foreign_replies_time_out() {
        let broker = MemoryBroker::new();
        spawn_decoy_server(broker.clone(), false).await;
        let mut client =
            QueueRpcClient::connect(Arc::new(broker), ROUTING_KEY, Duration::from_millis(100))
                .await
                .expect("connect");

        let err = client.send_simple_text("hi", false).await.unwrap_err();
        assert!(matches!(err, SlipwayError::Timeout(_)));
    }

    #[tokio::test]
    async fn request_without_reply_to_is_handled_silently() {
        let broker = MemoryBroker::new();
        let (mut server, dispatcher) = running_server(&broker).await;

        let body = codec::encode(&Envelope::simple_text("fire and forget", false)).expect("encode");
        broker
            .publish(
                ROUTING_KEY,
                BrokerMessage {
                    body,
                    ..BrokerMessage::default()
                },
            )
            .await
            .expect("publish");

        for _ in 0..200 {
            if !dispatcher.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(dispatcher.len(), 1);

        server.stop().await.expect("stop");
        dispatcher.shutdown().await;
    }
}
