use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

// ============================================================================
// Metrics - Prometheus metrics for pipeline observability
// ============================================================================
//
// Pipeline handler failures never reach an HTTP caller (the caller already
// got its `pending` response), so these counters and the logs are the only
// place they show up.
//
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Intake
    pub orders_submitted: IntCounter,
    pub validation_failures: IntCounter,

    // Pipeline stages
    pub orders_processed: IntCounter,
    pub notifications_sent: IntCounter,
    pub results_received: IntCounter,
    pub handler_failures: IntCounterVec,
    pub stage_duration: HistogramVec,

    // Broker traffic
    pub messages_published: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_submitted = IntCounter::new(
            "orders_submitted_total",
            "Orders accepted by the intake stage",
        )?;
        registry.register(Box::new(orders_submitted.clone()))?;

        let validation_failures = IntCounter::new(
            "validation_failures_total",
            "Order requests rejected by validation",
        )?;
        registry.register(Box::new(validation_failures.clone()))?;

        let orders_processed = IntCounter::new(
            "orders_processed_total",
            "Orders marked processed by the processing stage",
        )?;
        registry.register(Box::new(orders_processed.clone()))?;

        let notifications_sent = IntCounter::new(
            "notifications_sent_total",
            "Notifications delivered by the notification stage",
        )?;
        registry.register(Box::new(notifications_sent.clone()))?;

        let results_received = IntCounter::new(
            "results_received_total",
            "Terminal result payloads consumed",
        )?;
        registry.register(Box::new(results_received.clone()))?;

        let handler_failures = IntCounterVec::new(
            Opts::new(
                "handler_failures_total",
                "Stage handler failures (message dropped)",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(handler_failures.clone()))?;

        let stage_duration = HistogramVec::new(
            HistogramOpts::new("stage_duration_seconds", "Stage handler duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["stage"],
        )?;
        registry.register(Box::new(stage_duration.clone()))?;

        let messages_published = IntCounterVec::new(
            Opts::new("messages_published_total", "Messages published per queue"),
            &["queue"],
        )?;
        registry.register(Box::new(messages_published.clone()))?;

        Ok(Self {
            registry,
            orders_submitted,
            validation_failures,
            orders_processed,
            notifications_sent,
            results_received,
            handler_failures,
            stage_duration,
            messages_published,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
