//! Alpaca trading API integration.
//!
//! REST order submission, market clock, and account endpoints. Paper and
//! live environments differ only by base URL.
//!
//! API docs: https://docs.alpaca.markets/reference
//! Paper base URL: https://paper-api.alpaca.markets
//! Auth: `APCA-API-KEY-ID` / `APCA-API-SECRET-KEY` headers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{ApiCredentials, BrokerError, BrokerGateway};
use crate::types::{AccountSnapshot, OrderAmount, OrderRequest, OrderResult, OrderSide, OrderState, TradeMode};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";
const LIVE_BASE_URL: &str = "https://api.alpaca.markets";
const BROKER_NAME: &str = "alpaca";

// ---------------------------------------------------------------------------
// Wire types (Alpaca JSON ↔ Rust)
// ---------------------------------------------------------------------------

/// POST `/v2/orders` request body. Exactly one of `notional`/`qty` is set.
#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    symbol: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notional: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    qty: Option<Decimal>,
    side: &'a str,
    #[serde(rename = "type")]
    order_type: &'a str,
    time_in_force: &'a str,
}

impl<'a> PlaceOrderBody<'a> {
    fn from_request(request: &'a OrderRequest) -> Self {
        let (notional, qty) = match request.amount {
            OrderAmount::Notional(v) => (Some(v), None),
            OrderAmount::Quantity(v) => (None, Some(v)),
        };
        Self {
            symbol: &request.symbol,
            notional,
            qty,
            side: match request.side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            order_type: "market",
            time_in_force: "day",
        }
    }
}

/// Order envelope returned by `/v2/orders`. Decimal fields arrive as
/// strings; only the fields we need are deserialized.
#[derive(Debug, Deserialize)]
struct OrderEnvelope {
    id: String,
    symbol: String,
    status: String,
    #[serde(default)]
    filled_avg_price: Option<String>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
}

/// Response from GET `/v2/clock`.
#[derive(Debug, Deserialize)]
struct ClockEnvelope {
    is_open: bool,
    #[serde(default)]
    next_open: Option<DateTime<Utc>>,
}

/// Response from GET `/v2/account`.
#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    id: String,
    cash: String,
    buying_power: String,
    portfolio_value: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Alpaca broker gateway.
pub struct AlpacaClient {
    http: Client,
    base_url: String,
    credentials: ApiCredentials,
}

impl AlpacaClient {
    /// Create a client for the given trade mode. Paper mode talks to the
    /// paper-trading environment and can never touch a live account.
    pub fn new(
        credentials: ApiCredentials,
        mode: TradeMode,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()?;
        let base_url = match mode {
            TradeMode::Paper => PAPER_BASE_URL,
            TradeMode::Live => LIVE_BASE_URL,
        };
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            credentials,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("APCA-API-KEY-ID", &self.credentials.key_id)
            .header(
                "APCA-API-SECRET-KEY",
                self.credentials.secret_key.expose_secret(),
            )
    }

    /// Map a non-success HTTP status (plus response body) onto the error
    /// taxonomy the engine retries against.
    fn classify_status(status: u16, message: String) -> BrokerError {
        match status {
            401 => BrokerError::Auth { status },
            403 if message.contains("buying power") => {
                BrokerError::OrderRejected { reason: message }
            }
            403 => BrokerError::Auth { status },
            422 => BrokerError::OrderRejected { reason: message },
            429 => BrokerError::RateLimited,
            s if s >= 500 => BrokerError::Server { status: s },
            s => BrokerError::Api { status: s, message },
        }
    }

    fn map_transport(err: reqwest::Error) -> BrokerError {
        if err.is_timeout() {
            BrokerError::Timeout
        } else {
            BrokerError::Network(err.to_string())
        }
    }

    /// Lift a response into `Ok` or a classified `BrokerError`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, BrokerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(Self::classify_status(status.as_u16(), message))
    }

    fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, BrokerError> {
        Decimal::from_str(raw).map_err(|e| BrokerError::Api {
            status: 200,
            message: format!("unparseable {field} value {raw:?}: {e}"),
        })
    }
}

#[async_trait]
impl BrokerGateway for AlpacaClient {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, BrokerError> {
        let body = PlaceOrderBody::from_request(request);
        debug!(symbol = %request.symbol, amount = %request.amount, "Submitting order");

        let response = self
            .request(reqwest::Method::POST, "/v2/orders")
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport)?;
        let envelope: OrderEnvelope = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::map_transport)?;

        // Rejections can come back as 200 with a terminal status.
        let state = match envelope.status.as_str() {
            "filled" => OrderState::Filled,
            "rejected" | "canceled" | "expired" => {
                return Err(BrokerError::OrderRejected {
                    reason: format!("order {} returned status {}", envelope.id, envelope.status),
                })
            }
            _ => OrderState::Accepted,
        };

        let filled_avg_price = match envelope.filled_avg_price.as_deref() {
            Some(raw) => Some(Self::parse_decimal(raw, "filled_avg_price")?),
            None => None,
        };

        info!(
            order_id = %envelope.id,
            symbol = %envelope.symbol,
            status = %envelope.status,
            "Order placed"
        );

        Ok(OrderResult {
            order_id: envelope.id,
            symbol: envelope.symbol,
            state,
            filled_avg_price,
            submitted_at: envelope.submitted_at.unwrap_or_else(Utc::now),
        })
    }

    async fn is_market_open(&self) -> Result<bool, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, "/v2/clock")
            .send()
            .await
            .map_err(Self::map_transport)?;
        let clock: ClockEnvelope = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::map_transport)?;

        if !clock.is_open {
            info!(next_open = ?clock.next_open, "Market is closed");
        }
        Ok(clock.is_open)
    }

    async fn account(&self) -> Result<AccountSnapshot, BrokerError> {
        let response = self
            .request(reqwest::Method::GET, "/v2/account")
            .send()
            .await
            .map_err(Self::map_transport)?;
        let envelope: AccountEnvelope = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::map_transport)?;

        let snapshot = AccountSnapshot {
            account_id: envelope.id,
            cash: Self::parse_decimal(&envelope.cash, "cash")?,
            buying_power: Self::parse_decimal(&envelope.buying_power, "buying_power")?,
            portfolio_value: Self::parse_decimal(&envelope.portfolio_value, "portfolio_value")?,
        };

        debug!(
            account_id = %snapshot.account_id,
            cash = %snapshot.cash,
            portfolio_value = %snapshot.portfolio_value,
            "Account snapshot"
        );
        Ok(snapshot)
    }

    fn name(&self) -> &str {
        BROKER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
