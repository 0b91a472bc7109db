// ============================================================================
// Pricing Engine
// ============================================================================
//
// Pure function from (product, quantity) to a price breakdown. Products not
// in the table fall back to a flat default price.
//
// ============================================================================

const DEFAULT_PRICE: f64 = 99.0;
const DISCOUNT_RATE: f64 = 0.10;
const DISCOUNT_MIN_QUANTITY: i32 = 5;

/// Computed price breakdown for a single order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub unit_price: f64,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
}

fn unit_price(product: &str) -> f64 {
    match product.to_lowercase().as_str() {
        "laptop" => 999.0,
        "phone" => 599.0,
        "tablet" => 449.0,
        "monitor" => 299.0,
        "keyboard" => 89.0,
        "mouse" => 49.0,
        _ => DEFAULT_PRICE,
    }
}

/// Price an order line. A 10% discount applies when more than
/// `DISCOUNT_MIN_QUANTITY` units are ordered.
pub fn price(product: &str, quantity: i32) -> Quote {
    let unit_price = unit_price(product);
    let subtotal = unit_price * f64::from(quantity);
    let discount = if quantity > DISCOUNT_MIN_QUANTITY {
        subtotal * DISCOUNT_RATE
    } else {
        0.0
    };

    Quote {
        unit_price,
        subtotal,
        discount,
        total: subtotal - discount,
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
