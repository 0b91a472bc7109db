use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::utils::{retry_with_backoff, RetryConfig, RetryResult};

use super::{MessageBroker, MessageHandler};

// ============================================================================
// Kafka Broker Adapter
// ============================================================================
//
// Maps the queue contract onto a Kafka-compatible broker:
//
// - queue            -> single-partition topic (FIFO under one consumer)
// - durable declare  -> idempotent topic creation via the admin API
// - persistent send  -> acks=all against the broker's durable log
// - ack              -> manual offset commit after the handler succeeds
// - nack, no requeue -> offset committed anyway; the message is dropped
//
// Connecting is a startup precondition: the probe retries on a fixed
// interval and the process must not serve traffic if it ultimately fails.
//
// ============================================================================

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_INTERVAL: Duration = Duration::from_secs(3);
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

#[derive(Default)]
struct Inner {
    producer: Option<FutureProducer>,
    admin: Option<Arc<AdminClient<DefaultClientContext>>>,
    declared: HashSet<String>,
    consumers: Vec<JoinHandle<()>>,
}

pub struct KafkaBroker {
    servers: String,
    state: Mutex<ConnectionState>,
    inner: Mutex<Inner>,
}

impl KafkaBroker {
    pub fn new(servers: &str) -> Self {
        Self {
            servers: servers.to_string(),
            state: Mutex::new(ConnectionState::Disconnected),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Establish the broker connection, retrying on a fixed interval up to a
    /// bounded attempt count. Exhausting the attempts is fatal.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            match *state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => bail!("broker connection already closed"),
                _ => *state = ConnectionState::Connecting,
            }
        }

        let servers = self.servers.clone();
        let result = retry_with_backoff(
            RetryConfig::fixed(CONNECT_ATTEMPTS, CONNECT_INTERVAL),
            |attempt| {
                let servers = servers.clone();
                async move {
                    tracing::info!(attempt, servers = %servers, "Connecting to message broker");
                    open_clients(servers).await
                }
            },
        )
        .await;

        match result {
            RetryResult::Success((producer, admin)) => {
                let mut inner = self.inner.lock().await;
                inner.producer = Some(producer);
                inner.admin = Some(Arc::new(admin));
                drop(inner);

                *self.state.lock().await = ConnectionState::Connected;
                tracing::info!("Connected to message broker");
                Ok(())
            }
            RetryResult::Failed(error) => {
                *self.state.lock().await = ConnectionState::Disconnected;
                Err(error.context(format!(
                    "could not connect to the message broker after {CONNECT_ATTEMPTS} attempts"
                )))
            }
        }
    }

    async fn require_connected(&self) -> Result<()> {
        let state = *self.state.lock().await;
        if state != ConnectionState::Connected {
            bail!("broker is not connected (state: {state:?})");
        }
        Ok(())
    }

    /// Idempotent durable-queue declaration. Declared names are cached so the
    /// admin round-trip happens once per queue per process.
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        let admin = {
            let inner = self.inner.lock().await;
            if inner.declared.contains(queue) {
                return Ok(());
            }
            inner
                .admin
                .clone()
                .ok_or_else(|| anyhow!("admin client not initialized"))?
        };

        let results = admin
            .create_topics(
                &[NewTopic::new(queue, 1, TopicReplication::Fixed(1))],
                &AdminOptions::new(),
            )
            .await
            .context("queue declaration request failed")?;

        for result in results {
            match result {
                Ok(_) => {}
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((topic, code)) => bail!("failed to declare queue {topic}: {code}"),
            }
        }

        self.inner.lock().await.declared.insert(queue.to_string());
        tracing::debug!(queue, "Queue declared");
        Ok(())
    }
}

#[async_trait]
impl MessageBroker for KafkaBroker {
    async fn publish(&self, queue: &str, key: &str, payload: &str) -> Result<()> {
        self.require_connected().await?;
        self.declare_queue(queue).await?;

        let producer = {
            let inner = self.inner.lock().await;
            inner
                .producer
                .clone()
                .ok_or_else(|| anyhow!("producer not initialized"))?
        };

        let record = FutureRecord::to(queue).key(key).payload(payload);
        producer
            .send(record, Timeout::After(PUBLISH_TIMEOUT))
            .await
            .map_err(|(error, _)| anyhow!("broker send error: {error}"))?;

        tracing::info!(queue, key, "Message published");
        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: MessageHandler) -> Result<()> {
        self.require_connected().await?;
        self.declare_queue(queue).await?;

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.servers)
            .set("group.id", format!("{queue}-consumer"))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .create()
            .context("failed to create consumer")?;

        consumer
            .subscribe(&[queue])
            .with_context(|| format!("failed to subscribe to queue {queue}"))?;

        let queue_name = queue.to_string();
        let task = tokio::spawn(consume_loop(consumer, queue_name, handler));
        self.inner.lock().await.consumers.push(task);

        tracing::info!(queue, "Subscribed to queue");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if *state == ConnectionState::Closed {
                return Ok(());
            }
            *state = ConnectionState::Closed;
        }

        let mut inner = self.inner.lock().await;
        for task in inner.consumers.drain(..) {
            task.abort();
        }
        if let Some(producer) = inner.producer.take() {
            if let Err(error) = producer.flush(Timeout::After(PUBLISH_TIMEOUT)) {
                tracing::warn!(error = %error, "Producer flush failed during close");
            }
        }
        inner.admin = None;
        inner.declared.clear();

        tracing::info!("Broker connection closed");
        Ok(())
    }
}

/// Create producer and admin clients and probe broker metadata. Client
/// creation succeeds even when the broker is down, so the metadata probe is
/// what actually verifies reachability.
async fn open_clients(
    servers: String,
) -> Result<(FutureProducer, AdminClient<DefaultClientContext>)> {
    tokio::task::spawn_blocking(move || {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &servers)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .create()
            .context("failed to create producer")?;

        producer
            .client()
            .fetch_metadata(None, METADATA_TIMEOUT)
            .context("broker metadata probe failed")?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &servers)
            .create()
            .context("failed to create admin client")?;

        Ok((producer, admin))
    })
    .await?
}

/// Serial delivery loop for one queue. The offset is committed whether the
/// handler succeeded or not: failure means drop, never redeliver.
async fn consume_loop(consumer: StreamConsumer, queue: String, handler: MessageHandler) {
    loop {
        match consumer.recv().await {
            Ok(message) => {
                let payload = match message.payload_view::<str>() {
                    Some(Ok(text)) => text.to_string(),
                    Some(Err(_)) | None => {
                        tracing::error!(
                            queue = %queue,
                            offset = message.offset(),
                            "Dropping message with empty or non-UTF-8 payload"
                        );
                        commit(&consumer, &message, &queue);
                        continue;
                    }
                };

                if let Err(error) = handler(payload).await {
                    tracing::error!(
                        queue = %queue,
                        offset = message.offset(),
                        error = %error,
                        "Handler failed, dropping message"
                    );
                }
                commit(&consumer, &message, &queue);
            }
            Err(error) => {
                tracing::error!(queue = %queue, error = %error, "Consumer receive error");
            }
        }
    }
}

fn commit(consumer: &StreamConsumer, message: &rdkafka::message::BorrowedMessage<'_>, queue: &str) {
    if let Err(error) = consumer.commit_message(message, CommitMode::Async) {
        tracing::error!(queue = %queue, error = %error, "Offset commit failed");
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
