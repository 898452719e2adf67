//! Shared types for the DRIP agent.
//!
//! These types form the data model used across all modules: the immutable
//! investment plan, the transient order request/result pair exchanged with
//! the broker, and the durable execution record that provides the
//! anti-double-buy guarantee.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Trade mode & recurrence
// ---------------------------------------------------------------------------

/// Paper (simulated) vs live trading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Paper,
    Live,
}

impl TradeMode {
    /// Resolve the effective mode from the configured value and an
    /// optional `IS_PAPER` override ("true"/"false", case-insensitive).
    /// Unrecognised override values are ignored.
    pub fn resolve(configured: TradeMode, is_paper_override: Option<&str>) -> TradeMode {
        match is_paper_override.map(str::to_lowercase).as_deref() {
            Some("true") | Some("1") | Some("yes") => TradeMode::Paper,
            Some("false") | Some("0") | Some("no") => TradeMode::Live,
            _ => configured,
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeMode::Paper => write!(f, "paper"),
            TradeMode::Live => write!(f, "live"),
        }
    }
}

/// How often the plan buys. Each variant defines a calendar bucket; one
/// order is placed per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
}

impl std::str::FromStr for RecurrenceInterval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "1 day" | "day" => Ok(RecurrenceInterval::Daily),
            "weekly" | "1 week" | "week" => Ok(RecurrenceInterval::Weekly),
            "monthly" | "1 month" | "month" => Ok(RecurrenceInterval::Monthly),
            other => Err(anyhow::anyhow!("Unknown recurrence interval: {other}")),
        }
    }
}

impl TryFrom<String> for RecurrenceInterval {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RecurrenceInterval> for String {
    fn from(interval: RecurrenceInterval) -> String {
        interval.to_string()
    }
}

impl fmt::Display for RecurrenceInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrenceInterval::Daily => write!(f, "daily"),
            RecurrenceInterval::Weekly => write!(f, "weekly"),
            RecurrenceInterval::Monthly => write!(f, "monthly"),
        }
    }
}

// ---------------------------------------------------------------------------
// Period key
// ---------------------------------------------------------------------------

/// Identifier of the recurrence bucket an order belongs to.
///
/// Keys are formatted so that lexicographic order matches chronological
/// order within a given interval ("2026-02-03", "2026-W07", "2026-02"),
/// which is what the scheduler's clock-skew check relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey(String);

impl PeriodKey {
    /// Compute the period key for an instant under the given interval.
    pub fn for_instant(now: DateTime<Utc>, interval: RecurrenceInterval) -> Self {
        let key = match interval {
            RecurrenceInterval::Daily => now.format("%Y-%m-%d").to_string(),
            RecurrenceInterval::Weekly => {
                let week = now.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            RecurrenceInterval::Monthly => now.format("%Y-%m").to_string(),
        };
        PeriodKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Order amount & plan
// ---------------------------------------------------------------------------

/// Fixed purchase size: a dollar amount (notional) or a share quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAmount {
    Notional(Decimal),
    Quantity(Decimal),
}

impl OrderAmount {
    pub fn is_positive(&self) -> bool {
        match self {
            OrderAmount::Notional(v) | OrderAmount::Quantity(v) => {
                v.is_sign_positive() && !v.is_zero()
            }
        }
    }

    /// The notional dollar value, if this is a notional order.
    pub fn notional(&self) -> Option<Decimal> {
        match self {
            OrderAmount::Notional(v) => Some(*v),
            OrderAmount::Quantity(_) => None,
        }
    }
}

impl fmt::Display for OrderAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderAmount::Notional(v) => write!(f, "${v:.2}"),
            OrderAmount::Quantity(v) => write!(f, "{v} shares"),
        }
    }
}

/// Immutable recurring-investment configuration. Built once at startup
/// from external configuration; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentPlan {
    pub symbol: String,
    pub amount: OrderAmount,
    pub interval: RecurrenceInterval,
    pub mode: TradeMode,
}

impl InvestmentPlan {
    /// Create and validate a plan. The symbol must be non-empty and the
    /// amount strictly positive.
    pub fn new(
        symbol: impl Into<String>,
        amount: OrderAmount,
        interval: RecurrenceInterval,
        mode: TradeMode,
    ) -> anyhow::Result<Self> {
        let symbol = symbol.into().trim().to_uppercase();
        if symbol.is_empty() {
            anyhow::bail!("Plan symbol must not be empty");
        }
        if !amount.is_positive() {
            anyhow::bail!("Plan amount must be positive, got {amount}");
        }
        Ok(Self {
            symbol,
            amount,
            interval,
            mode,
        })
    }
}

impl fmt::Display for InvestmentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} {} ({})",
            self.amount, self.symbol, self.interval, self.mode,
        )
    }
}

// ---------------------------------------------------------------------------
// Order request / result
// ---------------------------------------------------------------------------

/// Order direction. The engine only ever buys; Sell exists for the broker
/// wire format's sake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Transient value object handed to the broker gateway. Always a market
/// order with day time-in-force; not persisted beyond the execution record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub symbol: String,
    pub amount: OrderAmount,
    pub side: OrderSide,
}

impl OrderRequest {
    /// Build the period's buy order from a plan.
    pub fn buy(plan: &InvestmentPlan) -> Self {
        Self {
            symbol: plan.symbol.clone(),
            amount: plan.amount,
            side: OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.amount, self.symbol)
    }
}

/// Where the broker reports the order in its lifecycle at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Accepted by the broker but not yet filled.
    Accepted,
    /// Filled at submission (market orders during trading hours).
    Filled,
}

/// Broker response to a successful submission.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub state: OrderState,
    pub filled_avg_price: Option<Decimal>,
    pub submitted_at: DateTime<Utc>,
}

/// Account balances used by the funds preflight.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub cash: Decimal,
    pub buying_power: Decimal,
    pub portfolio_value: Decimal,
}

// ---------------------------------------------------------------------------
// Execution record
// ---------------------------------------------------------------------------

/// Outcome of a period's execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// Order accepted by the broker, fill pending.
    Submitted,
    /// Order filled.
    Confirmed,
    /// All attempts failed; the period is eligible for retry.
    Failed,
}

impl ExecutionStatus {
    /// Whether this record forbids another submission for its period.
    /// Submitted and confirmed records both block; failed does not.
    pub fn blocks_reexecution(&self) -> bool {
        !matches!(self, ExecutionStatus::Failed)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Submitted => write!(f, "submitted"),
            ExecutionStatus::Confirmed => write!(f, "confirmed"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Durable record of the last execution attempt, keyed by period.
///
/// The only mutable entity in the system; written exclusively by the
/// execution engine through the store's compare-and-set commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub period_key: PeriodKey,
    pub order_id: Option<String>,
    pub symbol: String,
    pub amount: OrderAmount,
    pub status: ExecutionStatus,
    pub timestamp: DateTime<Utc>,
    /// Human-readable failure reason, set only for failed records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl ExecutionRecord {
    /// Record a successful submission. Filled orders are confirmed;
    /// accepted-but-unfilled orders stay submitted (both block re-runs).
    pub fn from_result(period_key: PeriodKey, plan: &InvestmentPlan, result: &OrderResult) -> Self {
        let status = match result.state {
            OrderState::Filled => ExecutionStatus::Confirmed,
            OrderState::Accepted => ExecutionStatus::Submitted,
        };
        Self {
            period_key,
            order_id: Some(result.order_id.clone()),
            symbol: plan.symbol.clone(),
            amount: plan.amount,
            status,
            timestamp: result.submitted_at,
            failure_reason: None,
        }
    }

    /// Record a failed period so the next scheduled tick retries it.
    pub fn failed(
        period_key: PeriodKey,
        plan: &InvestmentPlan,
        now: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            period_key,
            order_id: None,
            symbol: plan.symbol.clone(),
            amount: plan.amount,
            status: ExecutionStatus::Failed,
            timestamp: now,
            failure_reason: Some(reason.into()),
        }
    }
}

impl fmt::Display for ExecutionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} ({})",
            self.period_key,
            self.status,
            self.amount,
            self.symbol,
            self.order_id.as_deref().unwrap_or("no order"),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
