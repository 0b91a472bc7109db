use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Order, OrderRequest, OrderStatus};

use super::errors::ValidationError;
use super::pricing;

// ============================================================================
// Order Creation
// ============================================================================

/// Validate a caller-supplied request before any pricing or storage happens.
pub fn validate_request(request: &OrderRequest) -> Result<(), ValidationError> {
    if request.product.trim().is_empty() {
        return Err(ValidationError::ProductRequired);
    }
    if request.quantity < 1 {
        return Err(ValidationError::QuantityTooSmall);
    }
    if !request.email.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// Build a new pending order from a validated request. Pricing is computed
/// here, once, and is immutable afterwards.
pub fn create_order(request: &OrderRequest) -> Order {
    let quote = pricing::price(&request.product, request.quantity);
    let created_at = Utc::now();

    Order {
        id: Uuid::new_v4(),
        order_number: order_number(created_at),
        product: request.product.clone(),
        quantity: request.quantity,
        email: request.email.clone(),
        unit_price: quote.unit_price,
        subtotal: quote.subtotal,
        discount: quote.discount,
        total: quote.total,
        status: OrderStatus::Pending,
        notification: None,
        created_at,
    }
}

/// Short human-facing code derived from the creation time. Orders created in
/// the same millisecond slice collide; this is a display label, never a
/// lookup key.
fn order_number(at: DateTime<Utc>) -> String {
    format!("#ORD-{:06}", at.timestamp_millis().rem_euclid(1_000_000))
}

// ============================================================================
// Unit Tests
// ============================================================================
