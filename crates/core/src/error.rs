//! Shared error taxonomy.

use thiserror::Error;

/// Result type used across the domain and engine layers.
pub type CoreResult<T> = Result<T, CoreError>;

/// Error taxonomy for the order/inventory core.
///
/// Deterministic business failures and engine-level outcomes share one enum so
/// the boundary can translate them uniformly. Only `Contention` is retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A deduction requested more stock than is available. Terminal for the
    /// request; retrying cannot succeed until stock is restored.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { available: i64, requested: i64 },

    /// An order transition outside the state table was attempted.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A transition was attempted on an order already in a terminal state.
    /// Safe to ignore on retry; the first application already took effect.
    #[error("order is already terminal in state {status}")]
    AlreadyTerminal { status: String },

    /// Lock/version conflict that survived the bounded retry budget.
    /// Retryable with backoff; no partial state was left behind.
    #[error("contention: {0}")]
    Contention(String),

    /// A referenced product or order does not exist.
    #[error("not found")]
    NotFound,

    /// A value failed validation (e.g. non-positive quantity).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The acting party does not own the side of the order it tried to mutate.
    #[error("unauthorized")]
    Unauthorized,

    /// Journal failure that is neither a conflict nor a missing stream.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn contention(msg: impl Into<String>) -> Self {
        Self::Contention(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_stock(available: i64, requested: i64) -> Self {
        Self::InsufficientStock {
            available,
            requested,
        }
    }

    pub fn invalid_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn already_terminal(status: impl Into<String>) -> Self {
        Self::AlreadyTerminal {
            status: status.into(),
        }
    }

    /// Whether a caller may retry the failed operation and expect progress.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Contention(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retryable() {
        assert!(CoreError::contention("lock timeout").is_retryable());
        assert!(!CoreError::insufficient_stock(2, 5).is_retryable());
        assert!(!CoreError::already_terminal("cancelled").is_retryable());
        assert!(!CoreError::not_found().is_retryable());
    }

    #[test]
    fn transition_errors_name_both_states() {
        let err = CoreError::invalid_transition("pending", "delivered");
        assert_eq!(err.to_string(), "invalid transition: pending -> delivered");
    }

    #[test]
    fn insufficient_stock_reports_both_quantities() {
        let err = CoreError::insufficient_stock(5, 10);
        assert_eq!(
            err.to_string(),
            "insufficient stock: requested 10, available 5"
        );
    }
}
