//! Due-period scheduling.
//!
//! Pure period math with no side effects: computes the current recurrence
//! bucket and decides whether an order is due given the last durable
//! execution record. Safe to call at any cadence, including sub-period or
//! overlapping invocations; the store's compare-and-set commit is what
//! actually enforces at-most-once.

use chrono::{DateTime, Utc};

use crate::types::{ExecutionRecord, PeriodKey, RecurrenceInterval};

/// Whether an order is due for the period containing `now`.
///
/// Due when there is no record yet, when the recorded period is older than
/// the current one, or when the current period's record is `failed`
/// (same-period retry). A recorded period *newer* than the current one
/// means the wall clock moved backwards; that is treated as "not due"
/// rather than an error so a skewed clock can never double-buy.
pub fn is_due(
    interval: RecurrenceInterval,
    last: Option<&ExecutionRecord>,
    now: DateTime<Utc>,
) -> bool {
    let current = PeriodKey::for_instant(now, interval);
    match last {
        None => true,
        Some(record) if record.period_key == current => !record.status.blocks_reexecution(),
        Some(record) => current > record.period_key,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionStatus, InvestmentPlan, OrderAmount, TradeMode};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn plan() -> InvestmentPlan {
        InvestmentPlan::new(
            "VOO",
            OrderAmount::Notional(dec!(100)),
            RecurrenceInterval::Daily,
            TradeMode::Paper,
        )
        .unwrap()
    }

    fn record_for(now: DateTime<Utc>, status: ExecutionStatus) -> ExecutionRecord {
        let key = PeriodKey::for_instant(now, RecurrenceInterval::Daily);
        ExecutionRecord {
            period_key: key,
            order_id: Some("ord-1".to_string()),
            symbol: "VOO".to_string(),
            amount: plan().amount,
            status,
            timestamp: now,
            failure_reason: None,
        }
    }

    #[test]
    fn test_due_when_no_record() {
        let now = Utc.with_ymd_and_hms(2026, 2, 3, 15, 0, 0).unwrap();
        assert!(is_due(RecurrenceInterval::Daily, None, now));
    }

    #[test]
    fn test_not_due_same_period_confirmed() {
        let now = Utc.with_ymd_and_hms(2026, 2, 3, 9, 35, 0).unwrap();
        let record = record_for(now, ExecutionStatus::Confirmed);
        let later = Utc.with_ymd_and_hms(2026, 2, 3, 16, 0, 0).unwrap();
        assert!(!is_due(RecurrenceInterval::Daily, Some(&record), later));
    }

    #[test]
    fn test_not_due_same_period_submitted() {
        let now = Utc.with_ymd_and_hms(2026, 2, 3, 9, 35, 0).unwrap();
        let record = record_for(now, ExecutionStatus::Submitted);
        assert!(!is_due(RecurrenceInterval::Daily, Some(&record), now));
    }

    #[test]
    fn test_due_same_period_after_failure() {
        let now = Utc.with_ymd_and_hms(2026, 2, 3, 9, 35, 0).unwrap();
        let record = record_for(now, ExecutionStatus::Failed);
        let later = Utc.with_ymd_and_hms(2026, 2, 3, 10, 35, 0).unwrap();
        assert!(is_due(RecurrenceInterval::Daily, Some(&record), later));
    }

    #[test]
    fn test_due_next_day() {
        let day1 = Utc.with_ymd_and_hms(2026, 2, 3, 9, 35, 0).unwrap();
        let record = record_for(day1, ExecutionStatus::Confirmed);
        let day2 = Utc.with_ymd_and_hms(2026, 2, 4, 9, 35, 0).unwrap();
        assert!(is_due(RecurrenceInterval::Daily, Some(&record), day2));
    }

    #[test]
    fn test_clock_skew_not_due() {
        // Record confirmed for Feb 4, clock now reads Feb 3.
        let day2 = Utc.with_ymd_and_hms(2026, 2, 4, 9, 35, 0).unwrap();
        let record = record_for(day2, ExecutionStatus::Confirmed);
        let skewed = Utc.with_ymd_and_hms(2026, 2, 3, 9, 35, 0).unwrap();
        assert!(!is_due(RecurrenceInterval::Daily, Some(&record), skewed));
    }

    #[test]
    fn test_clock_skew_not_due_even_after_failure() {
        // A failed record for a future period still suppresses execution:
        // retrying it with an earlier clock would book the buy into the
        // wrong bucket.
        let day2 = Utc.with_ymd_and_hms(2026, 2, 4, 9, 35, 0).unwrap();
        let record = record_for(day2, ExecutionStatus::Failed);
        let skewed = Utc.with_ymd_and_hms(2026, 2, 3, 9, 35, 0).unwrap();
        assert!(!is_due(RecurrenceInterval::Daily, Some(&record), skewed));
    }

    #[test]
    fn test_weekly_interval_same_week_not_due() {
        let monday = Utc.with_ymd_and_hms(2026, 2, 2, 10, 0, 0).unwrap();
        let key = PeriodKey::for_instant(monday, RecurrenceInterval::Weekly);
        let record = ExecutionRecord {
            period_key: key,
            order_id: Some("ord-1".to_string()),
            symbol: "VOO".to_string(),
            amount: OrderAmount::Notional(dec!(100)),
            status: ExecutionStatus::Confirmed,
            timestamp: monday,
            failure_reason: None,
        };
        let friday = Utc.with_ymd_and_hms(2026, 2, 6, 10, 0, 0).unwrap();
        assert!(!is_due(RecurrenceInterval::Weekly, Some(&record), friday));

        let next_monday = Utc.with_ymd_and_hms(2026, 2, 9, 10, 0, 0).unwrap();
        assert!(is_due(RecurrenceInterval::Weekly, Some(&record), next_monday));
    }
}
