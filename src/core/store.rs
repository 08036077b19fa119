// ordertail - core/store.rs
//
// Order Store: the authoritative in-memory map from order identifier to
// its latest resolved state, enforcing the status-transition lattice and
// batch conflict resolution. Core layer: pure logic, no I/O; callers
// supply the Symbol Filter and drain notifications after each call.

use crate::core::filter::SymbolFilter;
use crate::core::model::{Order, Status};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of applying a single resolved event against the current
/// stored state: either a state change that must notify the Hub, or a
/// no-op ("keep") that must not.
enum Transition {
    Changed(Order),
    Unchanged,
}

/// The authoritative order map. Mutated only through `apply_batch` and
/// `evict_older_than`; readers needing a point-in-time view take
/// `snapshot`, which never mutates.
pub struct OrderStore {
    orders: HashMap<String, Order>,
    filter: Arc<SymbolFilter>,
}

impl OrderStore {
    pub fn new(filter: Arc<SymbolFilter>) -> Self {
        Self {
            orders: HashMap::new(),
            filter,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Read-only snapshot of every stored order, for metrics or search
    /// candidate evaluation. Never mutates.
    pub fn snapshot(&self) -> Vec<Order> {
        self.orders.values().cloned().collect()
    }

    /// Apply a batch of parsed orders, resolving same-identifier
    /// conflicts, enforcing the transition lattice, and returning the
    /// post-update orders that actually changed state (and therefore
    /// must be notified to the Hub). Warnings accumulated during
    /// resolution (e.g. a simultaneous filled+canceled conflict) are
    /// returned alongside for the caller to log.
    pub fn apply_batch(&mut self, batch: Vec<Order>) -> (Vec<Order>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut grouped: HashMap<String, Vec<Order>> = HashMap::new();
        for order in batch {
            grouped.entry(order.id.clone()).or_default().push(order);
        }

        let mut changed = Vec::new();
        for (id, events) in grouped {
            let Some(resolved) = resolve_conflicts(events, &mut warnings) else {
                tracing::error!(order_id = %id, "batch contained an empty event group");
                continue;
            };

            if !self.filter.admits(&resolved.symbol, resolved.price, resolved.size) {
                continue;
            }

            match self.apply_single(resolved) {
                Transition::Changed(order) => changed.push(order),
                Transition::Unchanged => {}
            }
        }

        (changed, warnings)
    }

    /// Apply one already-conflict-resolved order against the current
    /// stored state per the transition lattice (§4.5).
    fn apply_single(&mut self, incoming: Order) -> Transition {
        match self.orders.get(&incoming.id) {
            None => {
                self.orders.insert(incoming.id.clone(), incoming.clone());
                Transition::Changed(incoming)
            }
            Some(current) => {
                if current.status.is_terminal() {
                    return Transition::Unchanged;
                }
                if incoming.status.priority() <= current.status.priority() {
                    return Transition::Unchanged;
                }
                self.orders.insert(incoming.id.clone(), incoming.clone());
                Transition::Changed(incoming)
            }
        }
    }

    /// Remove every stored order whose timestamp precedes `now - age`.
    /// Invoked by external housekeeping; emits no notifications.
    pub fn evict_older_than(&mut self, age: Duration, now: DateTime<Utc>) {
        let cutoff = now - age;
        self.orders.retain(|_, order| order.timestamp >= cutoff);
    }
}

/// Resolve a group of same-identifier events from one batch into a
/// single incoming update, per §4.5's batch conflict resolution rule.
fn resolve_conflicts(mut events: Vec<Order>, warnings: &mut Vec<String>) -> Option<Order> {
    if events.is_empty() {
        return None;
    }
    if events.len() == 1 {
        return events.pop();
    }

    let has_filled = events.iter().any(|o| o.status == Status::Filled);
    let has_canceled = events.iter().any(|o| o.status == Status::Canceled);

    let resolved_status = if has_filled && has_canceled {
        warnings.push(format!(
            "order {} had simultaneous filled and canceled events in one batch; resolved to canceled",
            events[0].id
        ));
        Status::Canceled
    } else {
        events
            .iter()
            .map(|o| o.status)
            .max_by_key(|s| s.priority())
            .expect("non-empty events")
    };

    // The latest event in batch order supplies the non-status fields.
    let mut latest = events.pop().expect("non-empty events");
    latest.status = resolved_status;
    Some(latest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{RuleSet, SymbolFilter};
    use crate::core::model::Side;

    fn order(id: &str, status: Status) -> Order {
        Order {
            id: id.to_string(),
            symbol: "BTC".to_string(),
            side: Side::Bid,
            price: 50000.0,
            size: 1.0,
            owner: "0xAA".to_string(),
            timestamp: Utc::now(),
            status,
        }
    }

    fn store_with_btc_admitted() -> OrderStore {
        let filter = SymbolFilter::new(RuleSet::new([crate::core::filter::SymbolRule {
            symbol: "BTC".to_string(),
            minimum_liquidity: 0.0,
            price_deviation: 0.0,
        }]));
        OrderStore::new(Arc::new(filter))
    }

    #[test]
    fn first_admission_creates_order_and_notifies() {
        let mut store = store_with_btc_admitted();
        let (changed, warnings) = store.apply_batch(vec![order("1", Status::Open)]);
        assert_eq!(changed.len(), 1);
        assert!(warnings.is_empty());
        assert_eq!(store.get("1").unwrap().status, Status::Open);
    }

    #[test]
    fn open_to_filled_transitions_and_notifies() {
        let mut store = store_with_btc_admitted();
        store.apply_batch(vec![order("1", Status::Open)]);
        let (changed, _) = store.apply_batch(vec![order("1", Status::Filled)]);
        assert_eq!(changed.len(), 1);
        assert_eq!(store.get("1").unwrap().status, Status::Filled);
    }

    #[test]
    fn filled_is_terminal_and_further_updates_are_no_ops() {
        let mut store = store_with_btc_admitted();
        store.apply_batch(vec![order("1", Status::Filled)]);
        let (changed, _) = store.apply_batch(vec![order("1", Status::Canceled)]);
        assert!(changed.is_empty());
        assert_eq!(store.get("1").unwrap().status, Status::Filled);
    }

    #[test]
    fn batch_conflict_filled_and_canceled_resolves_to_canceled_with_warning() {
        let mut store = store_with_btc_admitted();
        let (changed, warnings) = store.apply_batch(vec![
            order("42", Status::Filled),
            order("42", Status::Canceled),
        ]);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].status, Status::Canceled);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn unadmitted_symbol_is_dropped_silently() {
        let filter = SymbolFilter::new(RuleSet::new([crate::core::filter::SymbolRule {
            symbol: "BTC".to_string(),
            minimum_liquidity: 1_000_000.0,
            price_deviation: 0.0,
        }]));
        let mut store = OrderStore::new(Arc::new(filter));
        let (changed, warnings) = store.apply_batch(vec![order("1", Status::Open)]);
        assert!(changed.is_empty());
        assert!(warnings.is_empty());
        assert!(store.get("1").is_none());
    }

    #[test]
    fn evict_older_than_removes_without_changed_list() {
        let mut store = store_with_btc_admitted();
        let mut old = order("1", Status::Open);
        old.timestamp = Utc::now() - Duration::hours(2);
        store.apply_batch(vec![old]);
        assert_eq!(store.len(), 1);
        store.evict_older_than(Duration::hours(1), Utc::now());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn replaying_identical_sequence_regardless_of_batch_boundaries_converges() {
        let mut store_one_batch = store_with_btc_admitted();
        store_one_batch.apply_batch(vec![
            order("1", Status::Open),
            order("1", Status::Triggered),
            order("1", Status::Filled),
        ]);

        let mut store_many_batches = store_with_btc_admitted();
        store_many_batches.apply_batch(vec![order("1", Status::Open)]);
        store_many_batches.apply_batch(vec![order("1", Status::Triggered)]);
        store_many_batches.apply_batch(vec![order("1", Status::Filled)]);

        assert_eq!(
            store_one_batch.get("1").unwrap().status,
            store_many_batches.get("1").unwrap().status
        );
    }
}
