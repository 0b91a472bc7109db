use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use super::{MessageBroker, MessageHandler};

// ============================================================================
// In-Memory Broker (test double)
// ============================================================================
//
// Stands in for the Kafka adapter in pipeline tests with the same delivery
// contract: FIFO per queue, one consumer, each message delivered once and
// dropped (not redelivered) when the handler fails. Publishes made before a
// consumer exists are buffered and replayed on subscribe.
//
// ============================================================================

#[derive(Default)]
pub struct MemoryBroker {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    queues: HashMap<String, Queue>,
    failing: HashSet<String>,
    tasks: Vec<JoinHandle<()>>,
}

#[derive(Default)]
struct Queue {
    published: Vec<String>,
    backlog: Vec<String>,
    sender: Option<mpsc::UnboundedSender<String>>,
    deliveries: Arc<AtomicUsize>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish to `queue` fail, to exercise handler
    /// error paths.
    pub async fn fail_queue(&self, queue: &str) {
        self.inner.lock().await.failing.insert(queue.to_string());
    }

    /// All payloads successfully published to `queue`, in order.
    pub async fn published(&self, queue: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .queues
            .get(queue)
            .map(|q| q.published.clone())
            .unwrap_or_default()
    }

    /// Number of messages handed to the consumer of `queue`.
    pub async fn delivery_count(&self, queue: &str) -> usize {
        self.inner
            .lock()
            .await
            .queues
            .get(queue)
            .map(|q| q.deliveries.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageBroker for MemoryBroker {
    async fn publish(&self, queue: &str, _key: &str, payload: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.failing.contains(queue) {
            bail!("simulated publish failure on queue {queue}");
        }

        let entry = inner.queues.entry(queue.to_string()).or_default();
        entry.published.push(payload.to_string());

        let delivered = entry
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(payload.to_string()).is_ok());
        if !delivered {
            entry.backlog.push(payload.to_string());
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str, handler: MessageHandler) -> Result<()> {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let deliveries = {
            let mut inner = self.inner.lock().await;
            let entry = inner.queues.entry(queue.to_string()).or_default();
            for pending in entry.backlog.drain(..) {
                let _ = sender.send(pending);
            }
            entry.sender = Some(sender);
            Arc::clone(&entry.deliveries)
        };

        let queue_name = queue.to_string();
        let task = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                deliveries.fetch_add(1, Ordering::SeqCst);
                if let Err(error) = handler(message).await {
                    tracing::error!(
                        queue = %queue_name,
                        error = %error,
                        "Handler failed, dropping message"
                    );
                }
            }
        });
        self.inner.lock().await.tasks.push(task);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for task in inner.tasks.drain(..) {
            task.abort();
        }
        inner.queues.clear();
        Ok(())
    }
}
