use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Domain Models
// ============================================================================
//
// Wire payloads use camelCase field names; producers and consumers decode
// them symmetrically with serde_json.
//
// ============================================================================

/// Caller-supplied order request, as received by the HTTP front door.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OrderRequest {
    pub product: String,
    pub quantity: i32,
    pub email: String,
}

/// The central entity. Pricing fields are computed once at creation and never
/// change; only `status` and `notification` mutate afterwards.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub product: String,
    pub quantity: i32,
    pub email: String,
    pub unit_price: f64,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Processed,
    Error,
}

/// Projection of an order handed from the processing stage to the
/// notification stage. Transient, never stored.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub order_id: Uuid,
    pub order_number: String,
    pub email: String,
    pub product: String,
    pub quantity: i32,
    pub total: f64,
    pub discount: f64,
}

/// Terminal payload published after notification delivery, consumed only for
/// observability. `unit_price` is absent when the store lookup missed.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub order_id: Uuid,
    pub order_number: String,
    pub product: String,
    pub quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    pub total: f64,
    pub discount: f64,
    pub status: OrderStatus,
    pub notification: String,
}

// ============================================================================
// Unit Tests
// ============================================================================
