// ordertail - metrics.rs
//
// Status counters (§6 "Status counters"): rejected lines by status, parse
// errors, pre-filter passes/rejects, admitted updates, tracked orders,
// cache hits/misses. Plain atomics behind a cheap snapshot; surfacing
// them externally (an HTTP endpoint, a metrics exporter) is out of scope.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct Counters {
    pre_filter_passed: AtomicU64,
    pre_filter_rejected: AtomicU64,
    parse_errors: AtomicU64,
    admitted_updates: AtomicU64,
    tracked_orders_active: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    rejected_by_status: Mutex<HashMap<String, u64>>,
}

/// Point-in-time read of every counter, cheap to construct and safe to
/// hand to an external caller (e.g. a log line or a health endpoint).
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub pre_filter_passed: u64,
    pub pre_filter_rejected: u64,
    pub parse_errors: u64,
    pub admitted_updates: u64,
    pub tracked_orders_active: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub rejected_by_status: HashMap<String, u64>,
}

impl Counters {
    pub fn record_pre_filter_passed(&self) {
        self.pre_filter_passed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pre_filter_rejected(&self) {
        self.pre_filter_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admitted(&self) {
        self.admitted_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_tracked_orders_active(&self, count: u64) {
        self.tracked_orders_active.store(count, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_status(&self, status: &str) {
        let mut map = self.rejected_by_status.lock().expect("counters lock poisoned");
        *map.entry(status.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pre_filter_passed: self.pre_filter_passed.load(Ordering::Relaxed),
            pre_filter_rejected: self.pre_filter_rejected.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            admitted_updates: self.admitted_updates.load(Ordering::Relaxed),
            tracked_orders_active: self.tracked_orders_active.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            rejected_by_status: self
                .rejected_by_status
                .lock()
                .expect("counters lock poisoned")
                .clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = Counters::default();
        counters.record_admitted();
        counters.record_admitted();
        counters.record_rejected_status("reduceOnlyRejected");
        counters.record_rejected_status("reduceOnlyRejected");
        counters.record_rejected_status("scheduledCancel");

        let snap = counters.snapshot();
        assert_eq!(snap.admitted_updates, 2);
        assert_eq!(snap.rejected_by_status["reduceOnlyRejected"], 2);
        assert_eq!(snap.rejected_by_status["scheduledCancel"], 1);
    }
}
