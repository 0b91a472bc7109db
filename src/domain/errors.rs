// ============================================================================
// Order Validation Errors
// ============================================================================
//
// The Display strings double as the HTTP 400 error messages, so they are
// phrased for the caller.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Product is required")]
    ProductRequired,

    #[error("Quantity must be greater than 0")]
    QuantityTooSmall,

    #[error("Invalid email")]
    InvalidEmail,
}
