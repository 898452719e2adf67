//! Broker integrations.
//!
//! Defines the `BrokerGateway` trait — the thin capability-typed surface
//! the execution engine talks to — and the Alpaca implementation. The
//! engine never implements brokerage semantics; it only classifies gateway
//! failures into transient vs permanent for its retry policy.

pub mod alpaca;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::Secret;

use crate::types::{AccountSnapshot, OrderRequest, OrderResult};

/// Broker failure taxonomy.
///
/// Transient errors are retried with bounded backoff within a tick;
/// permanent errors short-circuit and leave the period `failed` for the
/// next scheduled attempt (or operator intervention).
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by broker")]
    RateLimited,

    #[error("broker server error (HTTP {status})")]
    Server { status: u16 },

    #[error("authentication rejected (HTTP {status}): check API credentials")]
    Auth { status: u16 },

    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("insufficient buying power: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("market is closed")]
    MarketClosed,

    #[error("unexpected broker response (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

impl BrokerError {
    /// Whether a retry within the same tick can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Timeout
                | BrokerError::Network(_)
                | BrokerError::RateLimited
                | BrokerError::Server { .. }
        )
    }
}

/// API credentials resolved from the environment. The secret key is held
/// behind `secrecy` so it never lands in debug output or logs.
pub struct ApiCredentials {
    pub key_id: String,
    pub secret_key: Secret<String>,
}

/// Abstraction over the brokerage order API.
///
/// Implementors own no execution state; the gateway is a stateless bridge
/// to the external service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Submit an order. The result carries the broker-assigned order id.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, BrokerError>;

    /// Whether the market is currently open for trading.
    async fn is_market_open(&self) -> Result<bool, BrokerError>;

    /// Current account balances.
    async fn account(&self) -> Result<AccountSnapshot, BrokerError>;

    /// Broker name for logging and identification.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transient_classification() {
        assert!(BrokerError::Timeout.is_transient());
        assert!(BrokerError::Network("connection reset".into()).is_transient());
        assert!(BrokerError::RateLimited.is_transient());
        assert!(BrokerError::Server { status: 503 }.is_transient());
    }

    #[test]
    fn test_permanent_classification() {
        assert!(!BrokerError::Auth { status: 401 }.is_transient());
        assert!(!BrokerError::OrderRejected { reason: "unknown symbol".into() }.is_transient());
        assert!(!BrokerError::MarketClosed.is_transient());
        assert!(!BrokerError::InsufficientFunds {
            needed: dec!(100),
            available: dec!(12.50),
        }
        .is_transient());
        assert!(!BrokerError::Api { status: 404, message: "not found".into() }.is_transient());
    }

    #[test]
    fn test_error_display() {
        let e = BrokerError::InsufficientFunds {
            needed: dec!(100),
            available: dec!(12.5),
        };
        let display = format!("{e}");
        assert!(display.contains("100.00"));
        assert!(display.contains("12.50"));
    }
}
