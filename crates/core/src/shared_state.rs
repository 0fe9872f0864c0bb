//! State shared by every worker: open positions, the pending-opportunity
//! queue and unread risk alerts.
//!
//! Each collection sits behind its own lock and every operation takes the
//! lock exactly once, so each call is one indivisible step. Nothing hands out
//! a reference into the collections; reads return copies. Locks are never
//! held across an `.await`.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::alert::RiskAlert;
use crate::opportunity::{Opportunity, OpportunityId};
use crate::position::{Position, PositionId, PositionValuation};

#[derive(Debug, Default)]
pub struct SharedState {
    positions: Mutex<BTreeMap<PositionId, Position>>,
    opportunities: Mutex<OpportunityQueue>,
    alerts: Mutex<Vec<RiskAlert>>,
}

/// Pending opportunities plus the scoring time of the scan that last
/// replaced them. Entries scored before `scan_floor` belong to a superseded
/// scan.
#[derive(Debug, Default)]
struct OpportunityQueue {
    entries: Vec<Opportunity>,
    scan_floor: Option<DateTime<Utc>>,
}

/// Collection sizes. Each count is read atomically on its own; the three are
/// not a single snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StateSummary {
    pub positions: usize,
    pub pending_opportunities: usize,
    pub pending_alerts: usize,
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Inserts or replaces a position, returning the previous value.
    pub fn upsert_position(&self, position: Position) -> Option<Position> {
        self.positions.lock().insert(position.id.clone(), position)
    }

    pub fn remove_position(&self, id: &PositionId) -> Option<Position> {
        self.positions.lock().remove(id)
    }

    /// Replaces the valuation of an existing position.
    ///
    /// Returns false (and changes nothing) if the position is gone, so a
    /// late refresh never resurrects a closed position.
    pub fn update_valuation(&self, id: &PositionId, valuation: PositionValuation) -> bool {
        match self.positions.lock().get_mut(id) {
            Some(position) => {
                position.valuation = Some(valuation);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn position(&self, id: &PositionId) -> Option<Position> {
        self.positions.lock().get(id).cloned()
    }

    /// Point-in-time copy of all positions, oldest first (ties by id).
    #[must_use]
    pub fn snapshot_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.lock().values().cloned().collect();
        positions.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        positions
    }

    // ========================================================================
    // Opportunities
    // ========================================================================

    /// Replaces the pending queue with the newest scored set.
    ///
    /// An empty set still replaces the queue and still supersedes every
    /// earlier scan. Returns the number of superseded entries.
    pub fn enqueue_opportunities(&self, opportunities: Vec<Opportunity>) -> usize {
        let floor = opportunities
            .iter()
            .map(Opportunity::scored_at)
            .min()
            .unwrap_or_else(Utc::now);
        let mut queue = self.opportunities.lock();
        let superseded = queue.entries.len();
        queue.entries = opportunities;
        queue.scan_floor = Some(floor);
        superseded
    }

    /// Atomically takes the whole pending queue.
    #[must_use]
    pub fn drain_opportunities(&self) -> Vec<Opportunity> {
        std::mem::take(&mut self.opportunities.lock().entries)
    }

    /// Puts back opportunities that were drained but not acted on.
    ///
    /// Restored entries go ahead of the current queue. An entry is dropped if
    /// its id is already queued or if it was scored before the latest scan.
    /// Returns the number restored.
    pub fn restore_opportunities(&self, batch: Vec<Opportunity>) -> usize {
        let mut queue = self.opportunities.lock();
        let queued: HashSet<OpportunityId> = queue.entries.iter().map(Opportunity::id).collect();
        let floor = queue.scan_floor;

        let mut restored: Vec<Opportunity> = batch
            .into_iter()
            .filter(|o| !queued.contains(&o.id()))
            .filter(|o| floor.map_or(true, |floor| o.scored_at() >= floor))
            .collect();
        let count = restored.len();
        restored.append(&mut queue.entries);
        queue.entries = restored;
        count
    }

    /// Copy of the pending queue without consuming it.
    #[must_use]
    pub fn peek_opportunities(&self) -> Vec<Opportunity> {
        self.opportunities.lock().entries.clone()
    }

    // ========================================================================
    // Alerts
    // ========================================================================

    pub fn push_alert(&self, alert: RiskAlert) {
        self.alerts.lock().push(alert);
    }

    /// Atomically takes every unread alert, oldest first.
    #[must_use]
    pub fn drain_alerts(&self) -> Vec<RiskAlert> {
        std::mem::take(&mut *self.alerts.lock())
    }

    #[must_use]
    pub fn summary(&self) -> StateSummary {
        StateSummary {
            positions: self.positions.lock().len(),
            pending_opportunities: self.opportunities.lock().entries.len(),
            pending_alerts: self.alerts.lock().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertSeverity;
    use crate::opportunity::{OpportunityCandidate, OpportunityMetrics};
    use crate::position::{LegSide, OptionLeg, OptionRight, ProviderId};
    use crate::strategy::StrategyTag;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn make_position(id: &str, minutes_ago: i64) -> Position {
        let expiry = NaiveDate::from_ymd_opt(2026, 12, 18).unwrap();
        Position {
            id: PositionId::new(id),
            provider: ProviderId::new("paper"),
            symbol: "SPY".to_string(),
            strategy: StrategyTag::PutCreditSpread,
            legs: vec![
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Short,
                    strike: dec!(450),
                    expiry,
                },
                OptionLeg {
                    right: OptionRight::Put,
                    side: LegSide::Long,
                    strike: dec!(445),
                    expiry,
                },
            ],
            quantity: 1,
            entry_price: dec!(1.25),
            opened_at: Utc::now() - Duration::minutes(minutes_ago),
            valuation: None,
        }
    }

    fn make_opportunity(symbol: &str) -> Opportunity {
        let expiry = NaiveDate::from_ymd_opt(2026, 12, 18).unwrap();
        let candidate = OpportunityCandidate {
            symbol: symbol.to_string(),
            strategy: StrategyTag::CallCreditSpread,
            legs: vec![
                OptionLeg {
                    right: OptionRight::Call,
                    side: LegSide::Short,
                    strike: dec!(100),
                    expiry,
                },
                OptionLeg {
                    right: OptionRight::Call,
                    side: LegSide::Long,
                    strike: dec!(105),
                    expiry,
                },
            ],
            premium: dec!(1.10),
            underlying_price: 95.0,
            implied_vol: 0.3,
            volume: 500,
            open_interest: 1000,
            bid_ask_spread: 0.05,
        };
        let metrics = OpportunityMetrics {
            probability_of_profit: 0.7,
            expected_value: 12.0,
            max_profit: 110.0,
            max_loss: 390.0,
            implied_vol: 0.3,
            underlying_price: 95.0,
            volume: 500,
            bid_ask_spread: 0.05,
            confidence: 0.6,
        };
        Opportunity::scored(candidate, 0.5, metrics, Utc::now())
    }

    #[test]
    fn test_snapshot_is_ordered_copy() {
        let state = SharedState::new();
        state.upsert_position(make_position("b", 10));
        state.upsert_position(make_position("a", 30));
        state.upsert_position(make_position("c", 20));

        let ids: Vec<String> = state
            .snapshot_positions()
            .into_iter()
            .map(|p| p.id.to_string())
            .collect();
        assert_eq!(ids, vec!["a", "c", "b"]);

        let mut snapshot = state.snapshot_positions();
        snapshot[0].quantity = 99;
        assert_eq!(state.position(&PositionId::new("a")).unwrap().quantity, 1);
    }

    #[test]
    fn test_update_valuation_never_resurrects() {
        let state = SharedState::new();
        state.upsert_position(make_position("a", 5));
        let valuation = PositionValuation {
            mark: dec!(0.80),
            underlying_price: 455.0,
            implied_vol: 0.18,
            as_of: Utc::now(),
        };
        assert!(state.update_valuation(&PositionId::new("a"), valuation.clone()));
        state.remove_position(&PositionId::new("a"));
        assert!(!state.update_valuation(&PositionId::new("a"), valuation));
        assert!(state.snapshot_positions().is_empty());
    }

    #[test]
    fn test_concurrent_upserts_and_removes_net_effect() {
        let state = Arc::new(SharedState::new());
        let threads: usize = 8;
        let per_thread: usize = 50;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let state = Arc::clone(&state);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..per_thread {
                        let id = format!("t{t}-{i}");
                        state.upsert_position(make_position(&id, i as i64));
                        if i % 2 == 0 {
                            state.remove_position(&PositionId::new(id));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = state.snapshot_positions();
        assert_eq!(snapshot.len(), threads * per_thread / 2);
        assert!(snapshot.iter().all(|p| {
            let index: usize = p.id.as_str().rsplit('-').next().unwrap().parse().unwrap();
            index % 2 == 1
        }));
    }

    #[test]
    fn test_enqueue_replaces_queue() {
        let state = SharedState::new();
        state.enqueue_opportunities(vec![make_opportunity("AAPL"), make_opportunity("MSFT")]);
        let superseded = state.enqueue_opportunities(vec![make_opportunity("NVDA")]);
        assert_eq!(superseded, 2);

        let drained = state.drain_opportunities();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].symbol(), "NVDA");
        assert!(state.drain_opportunities().is_empty());
    }

    #[test]
    fn test_concurrent_drains_split_one_batch_exactly() {
        for _ in 0..50 {
            let state = Arc::new(SharedState::new());
            let batch: Vec<Opportunity> = (0..20).map(|i| make_opportunity(&format!("S{i}"))).collect();
            let expected: HashSet<OpportunityId> = batch.iter().map(Opportunity::id).collect();
            state.enqueue_opportunities(batch);

            let barrier = Arc::new(Barrier::new(2));
            let readers: Vec<_> = (0..2)
                .map(|_| {
                    let state = Arc::clone(&state);
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        state.drain_opportunities()
                    })
                })
                .collect();
            let results: Vec<Vec<Opportunity>> =
                readers.into_iter().map(|h| h.join().unwrap()).collect();

            let total: usize = results.iter().map(Vec::len).sum();
            let union: HashSet<OpportunityId> =
                results.iter().flatten().map(Opportunity::id).collect();
            assert_eq!(total, expected.len());
            assert_eq!(union, expected);
            assert!(results.iter().any(Vec::is_empty));
        }
    }

    #[test]
    fn test_restore_goes_ahead_and_skips_duplicates() {
        let state = SharedState::new();
        let first = make_opportunity("AAPL");
        let second = make_opportunity("MSFT");
        state.enqueue_opportunities(vec![first.clone(), second.clone()]);

        let mut drained = state.drain_opportunities();
        let unsent = drained.split_off(1);
        assert_eq!(state.restore_opportunities(unsent.clone()), 1);
        assert_eq!(state.restore_opportunities(unsent), 0);

        let queue = state.peek_opportunities();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id(), second.id());
    }

    #[test]
    fn test_restore_yields_to_newer_scan() {
        let state = SharedState::new();
        let stale = make_opportunity("AAPL");
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.enqueue_opportunities(vec![make_opportunity("TSLA")]);

        assert_eq!(state.restore_opportunities(vec![stale]), 0);
        assert_eq!(state.peek_opportunities()[0].symbol(), "TSLA");
    }

    #[test]
    fn test_restore_yields_to_newer_empty_scan() {
        let state = SharedState::new();
        state.enqueue_opportunities(vec![make_opportunity("AAPL")]);
        let drained = state.drain_opportunities();
        std::thread::sleep(std::time::Duration::from_millis(5));
        state.enqueue_opportunities(Vec::new());

        assert_eq!(state.restore_opportunities(drained), 0);
        assert!(state.peek_opportunities().is_empty());
    }

    #[test]
    fn test_restore_accepts_entries_from_current_scan() {
        let state = SharedState::new();
        state.enqueue_opportunities(vec![make_opportunity("AAPL"), make_opportunity("MSFT")]);
        let drained = state.drain_opportunities();

        assert_eq!(state.restore_opportunities(drained), 2);
        assert_eq!(state.summary().pending_opportunities, 2);
    }

    #[test]
    fn test_alerts_drain_in_order_and_never_drop() {
        let state = SharedState::new();
        for i in 0..5 {
            state.push_alert(RiskAlert::new(
                AlertSeverity::Warning,
                "portfolio_delta",
                f64::from(i),
                100.0,
                format!("alert {i}"),
            ));
        }
        assert_eq!(state.summary().pending_alerts, 5);

        let alerts = state.drain_alerts();
        assert_eq!(alerts.len(), 5);
        assert_eq!(alerts[0].message, "alert 0");
        assert_eq!(alerts[4].message, "alert 4");
        assert!(state.drain_alerts().is_empty());
    }
}
