use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;

// ============================================================================
// Messaging Layer
// ============================================================================
//
// The broker is the sole coordination mechanism between pipeline stages.
// Delivery contract: at-least-once, FIFO per queue under a single consumer,
// handler success acknowledges the message, handler failure drops it without
// requeueing.
//
// ============================================================================

mod kafka;
#[cfg(test)]
pub mod memory;

pub use kafka::{ConnectionState, KafkaBroker};

/// Consumer callback invoked once per delivered message with the raw UTF-8
/// payload. Returning `Err` drops the message.
pub type MessageHandler =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Seam between the pipeline orchestration and the broker transport.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Durably enqueue `payload` on `queue`, declaring the queue first
    /// (idempotent declaration). Returns once the broker has accepted the
    /// write; consumer-side processing is not implied.
    async fn publish(&self, queue: &str, key: &str, payload: &str) -> Result<()>;

    /// Register the single consumer for `queue` and start delivering
    /// messages to `handler` in order.
    async fn subscribe(&self, queue: &str, handler: MessageHandler) -> Result<()>;

    /// Stop consumers and release broker resources. Idempotent.
    async fn close(&self) -> Result<()>;
}
