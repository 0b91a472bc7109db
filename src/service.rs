use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::FutureExt;
use uuid::Uuid;

use crate::domain::{self, ValidationError};
use crate::messaging::{MessageBroker, MessageHandler};
use crate::metrics::Metrics;
use crate::models::{NotificationPayload, Order, OrderRequest, OrderStatus, ResultPayload};
use crate::store::OrderStore;

// ============================================================================
// Order Pipeline Service
// ============================================================================
//
// Owns the three stage handlers and the queue topology connecting them:
//
//   orders         full Order            intake       -> processing
//   notifications  NotificationPayload   processing   -> notification
//   results        ResultPayload         notification -> results logger
//
// Sequencing contract: within a stage the store write always precedes the
// downstream publish, so a later stage can never observe a payload for state
// that is not yet visible in the store.
//
// A stage handler failure is terminal for that message: the broker drops it
// without requeueing, and the order (when its id is known) is marked with
// the error status instead of staying pending forever.
//
// ============================================================================

pub const QUEUE_ORDERS: &str = "orders";
pub const QUEUE_NOTIFICATIONS: &str = "notifications";
pub const QUEUE_RESULTS: &str = "results";

/// Simulated unit-of-work latency of the processing stage.
const PROCESSING_DELAY: Duration = Duration::from_millis(500);
/// Simulated delivery latency of the notification stage.
const NOTIFICATION_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to enqueue order: {0}")]
    Broker(String),
}

pub struct OrderService {
    broker: Arc<dyn MessageBroker>,
    store: OrderStore,
    metrics: Arc<Metrics>,
}

impl OrderService {
    pub fn new(broker: Arc<dyn MessageBroker>, metrics: Arc<Metrics>) -> Self {
        Self {
            broker,
            store: OrderStore::new(),
            metrics,
        }
    }

    /// Intake stage. Validates the request (no side effects on failure),
    /// prices and stores the order as pending, publishes it to the orders
    /// queue, and returns it synchronously. Later stages update it
    /// asynchronously.
    pub async fn submit_order(&self, request: OrderRequest) -> Result<Order, SubmitError> {
        if let Err(error) = domain::validate_request(&request) {
            self.metrics.validation_failures.inc();
            tracing::warn!(error = %error, "Order request rejected");
            return Err(error.into());
        }

        let order = domain::create_order(&request);
        self.store.insert(order.clone()).await;

        self.publish_json(QUEUE_ORDERS, order.id, &order)
            .await
            .map_err(|error| SubmitError::Broker(error.to_string()))?;

        self.metrics.orders_submitted.inc();
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = order.total,
            "🛒 Order accepted"
        );
        Ok(order)
    }

    /// Processing stage, consuming from the orders queue. Marks the order
    /// processed, then hands a notification payload to the next stage.
    /// Redelivery is idempotent on the status but duplicates the downstream
    /// publish; the pipeline carries no deduplication token.
    pub async fn process_order(&self, order: Order) -> Result<()> {
        let timer = self
            .metrics
            .stage_duration
            .with_label_values(&["processing"])
            .start_timer();
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            "📦 Processing order"
        );

        tokio::time::sleep(PROCESSING_DELAY).await;

        let updated = self
            .store
            .update(order.id, |stored| stored.status = OrderStatus::Processed)
            .await;
        if updated.is_none() {
            // A message can outlive the process that stored its order (the
            // queue is durable, the store is not); adopt it as processed.
            let mut adopted = order.clone();
            adopted.status = OrderStatus::Processed;
            self.store.insert(adopted).await;
        }

        let payload = NotificationPayload {
            order_id: order.id,
            order_number: order.order_number.clone(),
            email: order.email.clone(),
            product: order.product.clone(),
            quantity: order.quantity,
            total: order.total,
            discount: order.discount,
        };
        self.publish_json(QUEUE_NOTIFICATIONS, order.id, &payload)
            .await?;

        self.metrics.orders_processed.inc();
        timer.observe_duration();
        tracing::info!(
            order_number = %order.order_number,
            total = order.total,
            "✅ Order processed"
        );
        Ok(())
    }

    /// Notification stage, consuming from the notifications queue. Sets the
    /// order's notification field, then publishes the terminal result. When
    /// the order id is unknown to the store the field update is skipped but
    /// the result is still published, with the unit price absent.
    pub async fn process_notification(&self, payload: NotificationPayload) -> Result<()> {
        let timer = self
            .metrics
            .stage_duration
            .with_label_values(&["notification"])
            .start_timer();
        tracing::info!(
            email = %payload.email,
            order_number = %payload.order_number,
            "📧 Sending notification"
        );

        tokio::time::sleep(NOTIFICATION_DELAY).await;

        let confirmation = format!("Email sent to {}", payload.email);
        tracing::info!(
            to = %payload.email,
            order_number = %payload.order_number,
            product = %payload.product,
            quantity = payload.quantity,
            total = payload.total,
            discount = payload.discount,
            "📬 Email sent"
        );

        let updated = self
            .store
            .update(payload.order_id, |stored| {
                stored.notification = Some(confirmation.clone());
            })
            .await;
        if updated.is_none() {
            tracing::warn!(
                order_id = %payload.order_id,
                "Order not found in store, skipping notification field update"
            );
        }

        let result = ResultPayload {
            order_id: payload.order_id,
            order_number: payload.order_number.clone(),
            product: payload.product.clone(),
            quantity: payload.quantity,
            unit_price: updated.as_ref().map(|order| order.unit_price),
            total: payload.total,
            discount: payload.discount,
            status: OrderStatus::Processed,
            notification: confirmation,
        };
        self.publish_json(QUEUE_RESULTS, payload.order_id, &result)
            .await?;

        self.metrics.notifications_sent.inc();
        timer.observe_duration();
        Ok(())
    }

    /// Terminal consumer on the results queue; observability only.
    pub fn handle_result(&self, payload: ResultPayload) {
        self.metrics.results_received.inc();
        tracing::info!(
            order_id = %payload.order_id,
            order_number = %payload.order_number,
            status = ?payload.status,
            notification = %payload.notification,
            "📋 Final result processed"
        );
    }

    pub async fn get_order(&self, id: Uuid) -> Option<Order> {
        self.store.get(id).await
    }

    pub async fn all_orders(&self) -> Vec<Order> {
        self.store.list().await
    }

    /// Bind the stage handlers to their queues. One consumer per queue;
    /// a failed handler marks the order errored before the broker drops the
    /// message.
    pub async fn start_consumers(self: Arc<Self>) -> Result<()> {
        let service = Arc::clone(&self);
        let handler: MessageHandler = Arc::new(move |raw: String| {
            let service = Arc::clone(&service);
            async move {
                let order: Order =
                    serde_json::from_str(&raw).context("invalid order payload")?;
                let order_id = order.id;
                if let Err(error) = service.process_order(order).await {
                    service.mark_failed(order_id, "processing", &error).await;
                    return Err(error);
                }
                Ok(())
            }
            .boxed()
        });
        self.broker.subscribe(QUEUE_ORDERS, handler).await?;

        let service = Arc::clone(&self);
        let handler: MessageHandler = Arc::new(move |raw: String| {
            let service = Arc::clone(&service);
            async move {
                let payload: NotificationPayload =
                    serde_json::from_str(&raw).context("invalid notification payload")?;
                let order_id = payload.order_id;
                if let Err(error) = service.process_notification(payload).await {
                    service.mark_failed(order_id, "notification", &error).await;
                    return Err(error);
                }
                Ok(())
            }
            .boxed()
        });
        self.broker.subscribe(QUEUE_NOTIFICATIONS, handler).await?;

        let service = Arc::clone(&self);
        let handler: MessageHandler = Arc::new(move |raw: String| {
            let service = Arc::clone(&service);
            async move {
                let payload: ResultPayload =
                    serde_json::from_str(&raw).context("invalid result payload")?;
                service.handle_result(payload);
                Ok(())
            }
            .boxed()
        });
        self.broker.subscribe(QUEUE_RESULTS, handler).await?;

        Ok(())
    }

    async fn publish_json<T: serde::Serialize>(
        &self,
        queue: &str,
        key: Uuid,
        payload: &T,
    ) -> Result<()> {
        let body = serde_json::to_string(payload).context("failed to encode payload")?;
        self.broker.publish(queue, &key.to_string(), &body).await?;
        self.metrics
            .messages_published
            .with_label_values(&[queue])
            .inc();
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, stage: &str, error: &anyhow::Error) {
        self.metrics.handler_failures.with_label_values(&[stage]).inc();
        tracing::error!(
            order_id = %id,
            stage,
            error = %error,
            "Stage handler failed, marking order as errored"
        );
        self.store
            .update(id, |stored| stored.status = OrderStatus::Error)
            .await;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::messaging::memory::MemoryBroker;

    fn pipeline() -> (Arc<OrderService>, Arc<MemoryBroker>) {
        let broker = Arc::new(MemoryBroker::new());
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = Arc::new(OrderService::new(broker.clone(), metrics));
        (service, broker)
    }

    fn request(product: &str, quantity: i32, email: &str) -> OrderRequest {
        OrderRequest {
            product: product.to_string(),
            quantity,
            email: email.to_string(),
        }
    }

    async fn wait_for<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not met within deadline");
    }

    #[tokio::test]
    async fn test_submit_stores_pending_order_and_publishes_it() {
        let (service, broker) = pipeline();

        let order = service
            .submit_order(request("laptop", 2, "a@b.com"))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert!((order.total - 1998.0).abs() < 1e-9);

        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);

        let published = broker.published(QUEUE_ORDERS).await;
        assert_eq!(published.len(), 1);
        let wire: Order = serde_json::from_str(&published[0]).unwrap();
        assert_eq!(wire.id, order.id);
    }

    #[tokio::test]
    async fn test_invalid_email_is_rejected_without_side_effects() {
        let (service, broker) = pipeline();

        let error = service
            .submit_order(request("laptop", 1, "not-an-email"))
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "Invalid email");
        assert!(service.all_orders().await.is_empty());
        assert!(broker.published(QUEUE_ORDERS).await.is_empty());
    }

    #[tokio::test]
    async fn test_processing_marks_processed_and_publishes_notification() {
        let (service, broker) = pipeline();
        let order = service
            .submit_order(request("laptop", 6, "a@b.com"))
            .await
            .unwrap();

        service.process_order(order.clone()).await.unwrap();

        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Processed);
        // Pricing fields are untouched by the transition.
        assert!((stored.total - 5394.6).abs() < 1e-9);

        let published = broker.published(QUEUE_NOTIFICATIONS).await;
        assert_eq!(published.len(), 1);
        let payload: NotificationPayload = serde_json::from_str(&published[0]).unwrap();
        assert_eq!(payload.order_id, order.id);
        assert_eq!(payload.email, "a@b.com");
        assert!((payload.discount - 599.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_idempotent_but_republishes() {
        let (service, broker) = pipeline();
        let order = service
            .submit_order(request("phone", 1, "a@b.com"))
            .await
            .unwrap();

        service.process_order(order.clone()).await.unwrap();
        service.process_order(order.clone()).await.unwrap();

        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(stored.status, OrderStatus::Processed);

        // Known at-least-once behavior: the status transition is idempotent
        // but the downstream publish is duplicated.
        assert_eq!(broker.published(QUEUE_NOTIFICATIONS).await.len(), 2);
    }

    #[tokio::test]
    async fn test_notification_sets_field_and_publishes_result() {
        let (service, broker) = pipeline();
        let order = service
            .submit_order(request("laptop", 1, "a@b.com"))
            .await
            .unwrap();
        service.process_order(order.clone()).await.unwrap();

        let published = broker.published(QUEUE_NOTIFICATIONS).await;
        let payload: NotificationPayload = serde_json::from_str(&published[0]).unwrap();
        service.process_notification(payload).await.unwrap();

        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(
            stored.notification.as_deref(),
            Some("Email sent to a@b.com")
        );

        let results = broker.published(QUEUE_RESULTS).await;
        assert_eq!(results.len(), 1);
        let result: ResultPayload = serde_json::from_str(&results[0]).unwrap();
        assert_eq!(result.order_id, order.id);
        assert_eq!(result.unit_price, Some(999.0));
        assert_eq!(result.status, OrderStatus::Processed);
    }

    #[tokio::test]
    async fn test_notification_for_unknown_order_still_publishes_result() {
        let (service, broker) = pipeline();

        let payload = NotificationPayload {
            order_id: Uuid::new_v4(),
            order_number: "#ORD-999999".to_string(),
            email: "ghost@b.com".to_string(),
            product: "monitor".to_string(),
            quantity: 1,
            total: 299.0,
            discount: 0.0,
        };
        service.process_notification(payload).await.unwrap();

        assert!(service.all_orders().await.is_empty());

        let results = broker.published(QUEUE_RESULTS).await;
        assert_eq!(results.len(), 1);
        let result: ResultPayload = serde_json::from_str(&results[0]).unwrap();
        assert_eq!(result.unit_price, None);
        assert_eq!(result.notification, "Email sent to ghost@b.com");
    }

    #[tokio::test]
    async fn test_order_flows_through_all_three_stages() {
        let (service, broker) = pipeline();
        service.clone().start_consumers().await.unwrap();

        let order = service
            .submit_order(request("laptop", 6, "a@b.com"))
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);

        // Eventual consistency, bounded by the simulated stage delays.
        let id = order.id;
        wait_for(|| {
            let service = service.clone();
            async move {
                service.get_order(id).await.is_some_and(|o| {
                    o.status == OrderStatus::Processed && o.notification.is_some()
                })
            }
        })
        .await;

        let broker_ref = broker.clone();
        wait_for(|| {
            let broker = broker_ref.clone();
            async move { broker.delivery_count(QUEUE_RESULTS).await == 1 }
        })
        .await;

        let stored = service.get_order(order.id).await.unwrap();
        assert_eq!(
            stored.notification.as_deref(),
            Some("Email sent to a@b.com")
        );
        // Pricing never changed along the way.
        assert!((stored.total - 5394.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_handler_drops_message_and_marks_order_errored() {
        let (service, broker) = pipeline();
        service.clone().start_consumers().await.unwrap();

        // The processing stage fails when it republishes downstream.
        broker.fail_queue(QUEUE_NOTIFICATIONS).await;

        let order = service
            .submit_order(request("tablet", 1, "a@b.com"))
            .await
            .unwrap();

        let id = order.id;
        wait_for(|| {
            let service = service.clone();
            async move {
                service
                    .get_order(id)
                    .await
                    .is_some_and(|o| o.status == OrderStatus::Error)
            }
        })
        .await;

        // Dropped, not redelivered: exactly one delivery of the order
        // message, and nothing ever reached the later queues.
        assert_eq!(broker.delivery_count(QUEUE_ORDERS).await, 1);
        assert!(broker.published(QUEUE_NOTIFICATIONS).await.is_empty());
        assert!(broker.published(QUEUE_RESULTS).await.is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(broker.delivery_count(QUEUE_ORDERS).await, 1);
    }
}
