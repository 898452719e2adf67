//! Execution engine — one safe order attempt per period.
//!
//! Orchestrates the scheduler, broker gateway, and state store: decides
//! whether the current period's order is due, runs the market-hours and
//! buying-power preflights, submits with bounded exponential backoff, and
//! commits the outcome through the store's compare-and-set so that no
//! period is ever bought twice, even across restarts or racing instances.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broker::{BrokerError, BrokerGateway};
use crate::scheduler;
use crate::store::{CommitOutcome, ExecutionStore};
use crate::types::{ExecutionRecord, InvestmentPlan, OrderRequest, PeriodKey};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for transient broker failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based): doubles each
    /// time, capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by [`Engine::run_once`]. The period is left `failed`
/// in the store for both broker variants, so the next scheduled tick tries
/// again; `is_retryable` tells the caller whether that retry can succeed
/// without operator intervention.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("retryable failure for period {period} after {attempts} attempt(s): {source}")]
    Retryable {
        period: PeriodKey,
        attempts: u32,
        source: BrokerError,
    },

    #[error("non-retryable failure for period {period}: {source}")]
    Fatal {
        period: PeriodKey,
        source: BrokerError,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Retryable { .. })
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The recurring-order execution engine.
///
/// Owns all writes to the execution record; the scheduler only reads it
/// and the gateway holds no state at all.
pub struct Engine<B, S> {
    plan: InvestmentPlan,
    broker: B,
    store: S,
    retry: RetryPolicy,
}

impl<B: BrokerGateway, S: ExecutionStore> Engine<B, S> {
    pub fn new(plan: InvestmentPlan, broker: B, store: S, retry: RetryPolicy) -> Self {
        Self {
            plan,
            broker,
            store,
            retry,
        }
    }

    /// Perform at most one order submission for the period containing
    /// `now`. Idempotent: when the period is already covered, the existing
    /// record is returned with no broker traffic.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ExecutionRecord, EngineError> {
        let last = self.store.load()?;
        let period = PeriodKey::for_instant(now, self.plan.interval);

        if let Some(record) = last {
            if !scheduler::is_due(self.plan.interval, Some(&record), now) {
                debug!(
                    period = %period,
                    last = %record.period_key,
                    status = %record.status,
                    "Order not due, nothing to do"
                );
                return Ok(record);
            }
        }

        info!(period = %period, plan = %self.plan, "Order due, executing");

        // Market-hours preflight. A closed market is never worth
        // hammering with retries; the failed record makes the next tick
        // try again.
        match self.broker.is_market_open().await {
            Ok(true) => {}
            Ok(false) => return self.record_failure(period, 0, BrokerError::MarketClosed, now),
            Err(e) => return self.record_failure(period, 0, e, now),
        }

        // Buying-power preflight for notional plans.
        if let Some(needed) = self.plan.amount.notional() {
            match self.broker.account().await {
                Ok(account) if account.cash < needed => {
                    return self.record_failure(
                        period,
                        0,
                        BrokerError::InsufficientFunds {
                            needed,
                            available: account.cash,
                        },
                        now,
                    );
                }
                Ok(account) => {
                    debug!(
                        account_id = %account.account_id,
                        cash = %account.cash,
                        "Funds preflight passed"
                    );
                }
                Err(e) => return self.record_failure(period, 0, e, now),
            }
        }

        // Submission loop with bounded backoff.
        let request = OrderRequest::buy(&self.plan);
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.broker.submit_order(&request).await {
                Ok(result) => break result,
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient broker failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return self.record_failure(period, attempt, e, now),
            }
        };

        let record = ExecutionRecord::from_result(period, &self.plan, &result);
        match self.store.commit(&record)? {
            CommitOutcome::Stored => {
                info!(record = %record, attempts = attempt, "Order recorded");
                Ok(record)
            }
            CommitOutcome::Superseded(existing) => {
                // Lost the race to a concurrent writer that already covered
                // this period. Their record stands; our order id is logged
                // for reconciliation, not recorded.
                info!(
                    period = %existing.period_key,
                    winning_order = ?existing.order_id,
                    abandoned_order = %result.order_id,
                    "Period already executed by another writer"
                );
                Ok(existing)
            }
        }
    }

    /// Persist a `failed` record for the period and surface the error.
    /// If a concurrent writer confirmed the period in the meantime, that
    /// counts as success.
    fn record_failure(
        &self,
        period: PeriodKey,
        attempts: u32,
        error: BrokerError,
        now: DateTime<Utc>,
    ) -> Result<ExecutionRecord, EngineError> {
        let record = ExecutionRecord::failed(period.clone(), &self.plan, now, error.to_string());
        if let CommitOutcome::Superseded(existing) = self.store.commit(&record)? {
            info!(
                period = %existing.period_key,
                "Attempt failed but another writer already executed the period"
            );
            return Ok(existing);
        }

        if error.is_transient() {
            Err(EngineError::Retryable {
                period,
                attempts,
                source: error,
            })
        } else {
            Err(EngineError::Fatal {
                period,
                source: error,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
