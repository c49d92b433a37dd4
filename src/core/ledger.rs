//! Per-day usage accounting with a bounded retention window.
//!
//! The ledger owns the daily history, the date it considers "today" and
//! today's running total. `history[current_date] == current_usage` holds after
//! every public mutation.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};

use crate::config;

/// Summary of a forward date transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollover {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Skipped days inserted with zero usage.
    pub filled: usize,
    /// Days dropped because they fell out of the retention window.
    pub evicted: usize,
}

/// Durable accounting state: daily totals plus today's running figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageLedger {
    history: BTreeMap<NaiveDate, u64>,
    current_date: NaiveDate,
    current_usage: u64,
}

impl UsageLedger {
    /// Fresh ledger: `today` with zero usage.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            history: BTreeMap::from([(today, 0)]),
            current_date: today,
            current_usage: 0,
        }
    }

    /// Rebuild a ledger from persisted parts and bring it up to `today`.
    ///
    /// A stored date before `today` is rolled forward. Otherwise the history
    /// entry for the stored date wins over the scalar `current_usage`, which is
    /// only used when that entry is missing.
    pub fn restore(
        history: BTreeMap<NaiveDate, u64>,
        current_date: NaiveDate,
        current_usage: u64,
        today: NaiveDate,
    ) -> (Self, Option<Rollover>) {
        let mut ledger = Self {
            history,
            current_date,
            current_usage,
        };

        if current_date < today {
            let rollover = ledger.roll_to_today(today);
            return (ledger, rollover);
        }

        let usage = *ledger.history.entry(current_date).or_insert(current_usage);
        ledger.current_usage = usage;
        ledger.trim();
        (ledger, None)
    }

    /// Move "today" forward to `now`, zero-filling skipped days and trimming
    /// history to the retention window.
    ///
    /// Returns `None` when `now` is not after the current date. A backwards
    /// clock is ignored rather than rewriting history.
    pub fn roll_to_today(&mut self, now: NaiveDate) -> Option<Rollover> {
        if now <= self.current_date {
            return None;
        }

        let from = self.current_date;
        // Days before the window start would be trimmed right away.
        let fill_start = from.succ_opt().unwrap_or(now).max(window_start(now));

        let mut filled = 0;
        for day in fill_start.iter_days().take_while(|d| *d < now) {
            if !self.history.contains_key(&day) {
                self.history.insert(day, 0);
                filled += 1;
            }
        }

        self.current_date = now;
        self.current_usage = 0;
        self.history.insert(now, 0);
        let evicted = self.trim();

        Some(Rollover {
            from,
            to: now,
            filled,
            evicted,
        })
    }

    /// Add `bytes` to today's total. Returns `false` (and changes nothing) for zero.
    pub fn apply_delta(&mut self, bytes: u64) -> bool {
        if bytes == 0 {
            return false;
        }
        self.current_usage = self.current_usage.saturating_add(bytes);
        self.history.insert(self.current_date, self.current_usage);
        true
    }

    /// Drop every history entry outside `[current_date - 29, current_date]`.
    fn trim(&mut self) -> usize {
        let start = window_start(self.current_date);
        let end = self.current_date;
        let before = self.history.len();
        self.history.retain(|day, _| *day >= start && *day <= end);
        before - self.history.len()
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn current_usage(&self) -> u64 {
        self.current_usage
    }

    pub fn history(&self) -> &BTreeMap<NaiveDate, u64> {
        &self.history
    }

    /// History entries, newest first.
    pub fn history_desc(&self) -> impl Iterator<Item = (NaiveDate, u64)> + '_ {
        self.history.iter().rev().map(|(d, b)| (*d, *b))
    }
}

/// First day of the retention window ending at `end`.
fn window_start(end: NaiveDate) -> NaiveDate {
    end.checked_sub_days(Days::new(u64::from(config::RETENTION_DAYS) - 1))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::test_support::date;

    fn days_after(d: NaiveDate, n: u64) -> NaiveDate {
        d.checked_add_days(Days::new(n)).unwrap()
    }

    #[test]
    fn test_new_ledger_has_today_at_zero() {
        let ledger = UsageLedger::new(date("2024-01-01"));
        assert_eq!(ledger.current_usage(), 0);
        assert_eq!(ledger.history().len(), 1);
        assert_eq!(ledger.history()[&date("2024-01-01")], 0);
    }

    #[test]
    fn test_deltas_accumulate_into_today() {
        let mut ledger = UsageLedger::new(date("2024-01-01"));
        let mut sum = 0;
        for delta in [1, 500, 300, 4096, 7] {
            assert!(ledger.apply_delta(delta));
            sum += delta;
            assert_eq!(ledger.current_usage(), sum);
            assert_eq!(ledger.history()[&ledger.current_date()], ledger.current_usage());
        }
    }

    #[test]
    fn test_zero_delta_is_noop() {
        let mut ledger = UsageLedger::new(date("2024-01-01"));
        ledger.apply_delta(10);
        let before = ledger.clone();
        assert!(!ledger.apply_delta(0));
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_delta_saturates() {
        let mut ledger = UsageLedger::new(date("2024-01-01"));
        ledger.apply_delta(u64::MAX - 1);
        ledger.apply_delta(10);
        assert_eq!(ledger.current_usage(), u64::MAX);
    }

    #[test]
    fn test_roll_same_day_is_noop() {
        let mut ledger = UsageLedger::new(date("2024-01-01"));
        ledger.apply_delta(42);
        assert!(ledger.roll_to_today(date("2024-01-01")).is_none());
        assert_eq!(ledger.current_usage(), 42);
    }

    #[test]
    fn test_roll_backwards_clock_is_noop() {
        let mut ledger = UsageLedger::new(date("2024-01-10"));
        ledger.apply_delta(42);
        let before = ledger.clone();
        assert!(ledger.roll_to_today(date("2024-01-05")).is_none());
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_roll_is_idempotent() {
        let mut ledger = UsageLedger::new(date("2024-01-01"));
        ledger.apply_delta(100);
        assert!(ledger.roll_to_today(date("2024-01-02")).is_some());
        let after_first = ledger.clone();
        assert!(ledger.roll_to_today(date("2024-01-02")).is_none());
        assert_eq!(ledger, after_first);
    }

    #[test]
    fn test_roll_fills_gap_with_zeros() {
        let d = date("2024-03-10");
        let mut ledger = UsageLedger::new(d);
        ledger.apply_delta(777);

        let rollover = ledger.roll_to_today(days_after(d, 5)).unwrap();
        assert_eq!(rollover.filled, 4);
        assert_eq!(rollover.evicted, 0);
        for n in 1..=5 {
            assert_eq!(ledger.history()[&days_after(d, n)], 0);
        }
        assert_eq!(ledger.history()[&d], 777);
        assert_eq!(ledger.current_usage(), 0);
        assert_eq!(ledger.current_date(), days_after(d, 5));
    }

    #[test]
    fn test_roll_keeps_existing_gap_entries() {
        let d = date("2024-03-10");
        let mut history = BTreeMap::new();
        history.insert(d, 10);
        history.insert(days_after(d, 2), 99);
        let (ledger, rollover) = UsageLedger::restore(history, d, 10, days_after(d, 3));

        assert_eq!(rollover.unwrap().filled, 1);
        assert_eq!(ledger.history()[&days_after(d, 2)], 99);
        assert_eq!(ledger.history()[&days_after(d, 1)], 0);
    }

    #[test]
    fn test_scenario_two_deltas_then_skip_a_day() {
        let mut ledger = UsageLedger::new(date("2024-01-01"));
        ledger.apply_delta(500);
        ledger.apply_delta(300);
        assert_eq!(ledger.history()[&date("2024-01-01")], 800);

        ledger.roll_to_today(date("2024-01-03"));
        let expected = BTreeMap::from([
            (date("2024-01-01"), 800),
            (date("2024-01-02"), 0),
            (date("2024-01-03"), 0),
        ]);
        assert_eq!(ledger.history(), &expected);
        assert_eq!(ledger.current_usage(), 0);
    }

    #[test]
    fn test_retention_window_after_long_run() {
        let start = date("2024-01-01");
        let mut ledger = UsageLedger::new(start);
        for n in 1..=45 {
            ledger.apply_delta(n);
            ledger.roll_to_today(days_after(start, n));
        }
        let today = ledger.current_date();
        assert_eq!(ledger.history().len(), 30);
        let oldest = *ledger.history().keys().next().unwrap();
        assert_eq!(oldest, window_start(today));
        assert!(ledger.history().keys().all(|d| *d <= today));
    }

    #[test]
    fn test_short_lifetime_keeps_fewer_than_window() {
        let start = date("2024-01-01");
        let mut ledger = UsageLedger::new(start);
        ledger.roll_to_today(days_after(start, 9));
        assert_eq!(ledger.history().len(), 10);
    }

    #[test]
    fn test_long_gap_evicts_everything_old() {
        let d = date("2024-01-01");
        let mut ledger = UsageLedger::new(d);
        ledger.apply_delta(12345);

        let now = days_after(d, 40);
        let rollover = ledger.roll_to_today(now).unwrap();
        assert_eq!(ledger.history().len(), 30);
        assert!(!ledger.history().contains_key(&d));
        assert!(ledger.history().values().all(|b| *b == 0));
        assert_eq!(rollover.evicted, 1);
        assert_eq!(rollover.filled, 29);
    }

    #[test]
    fn test_multi_year_gap_stays_bounded() {
        let d = date("2020-01-01");
        let mut ledger = UsageLedger::new(d);
        let rollover = ledger.roll_to_today(date("2024-06-30")).unwrap();
        assert_eq!(ledger.history().len(), 30);
        assert_eq!(rollover.filled, 29);
    }

    #[test]
    fn test_restore_same_day_prefers_history_entry() {
        let d = date("2024-05-05");
        let history = BTreeMap::from([(d, 900)]);
        let (ledger, rollover) = UsageLedger::restore(history, d, 400, d);
        assert!(rollover.is_none());
        assert_eq!(ledger.current_usage(), 900);
    }

    #[test]
    fn test_restore_same_day_missing_entry_uses_scalar() {
        let d = date("2024-05-05");
        let (ledger, _) = UsageLedger::restore(BTreeMap::new(), d, 400, d);
        assert_eq!(ledger.current_usage(), 400);
        assert_eq!(ledger.history()[&d], 400);
    }

    #[test]
    fn test_restore_past_date_rolls_forward() {
        let d = date("2024-05-05");
        let history = BTreeMap::from([(d, 900)]);
        let today = days_after(d, 2);
        let (ledger, rollover) = UsageLedger::restore(history, d, 900, today);
        assert_eq!(rollover.unwrap().filled, 1);
        assert_eq!(ledger.current_date(), today);
        assert_eq!(ledger.current_usage(), 0);
        assert_eq!(ledger.history()[&d], 900);
    }

    #[test]
    fn test_restore_trims_stale_entries() {
        let d = date("2024-05-05");
        let history = BTreeMap::from([
            (d, 1),
            (date("2024-01-01"), 5),
            (date("2024-06-01"), 7),
        ]);
        let (ledger, _) = UsageLedger::restore(history, d, 1, d);
        assert_eq!(ledger.history().len(), 1);
    }

    #[test]
    fn test_restore_future_date_is_kept() {
        let future = date("2024-05-10");
        let history = BTreeMap::from([(future, 50)]);
        let (ledger, rollover) = UsageLedger::restore(history, future, 50, date("2024-05-05"));
        assert!(rollover.is_none());
        assert_eq!(ledger.current_date(), future);
        assert_eq!(ledger.current_usage(), 50);
    }

    #[test]
    fn test_history_desc_is_newest_first() {
        let mut ledger = UsageLedger::new(date("2024-01-01"));
        ledger.roll_to_today(date("2024-01-03"));
        let dates: Vec<_> = ledger.history_desc().map(|(d, _)| d).collect();
        assert_eq!(
            dates,
            vec![
                date("2024-01-03"),
                date("2024-01-02"),
                date("2024-01-01")
            ]
        );
    }
}
