// ordertail - core/parser.rs
//
// Line Parser: converts one raw JSON line into an Order or a skip reason.
// Never panics on malformed input. Core layer: pure logic, no I/O.

use crate::core::model::{Order, OrderEvent, Side, Status};
use crate::util::constants::REJECTED_STATUSES;
use crate::util::error::LineSkipReason;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

/// Outcome produced by the parser for the caller's counters: whether the
/// line produced an `Order`, and if not, why, plus whether an unmapped
/// (but still-admitted) status should be logged.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The line produced a valid Order.
    Admitted(Order),
    /// The line was rejected; see the skip reason for why.
    Skipped(LineSkipReason),
    /// The line produced an Order but carried a status outside the
    /// canonical four-element set; it is still admitted, but the caller
    /// should log a warning.
    AdmittedWithWarning(Order, String),
}

/// Fast byte-level pre-filter. Rejects lines that plainly cannot be an
/// order-event object before paying for a JSON decode. Must have zero
/// false-reject rate for well-formed events.
pub fn pre_filter(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && trimmed.contains("\"order\"")
        && trimmed.contains("\"status\"")
}

/// Parse one raw line into an order-event outcome. Never panics.
pub fn parse_line(line: &str) -> ParseOutcome {
    if !pre_filter(line) {
        return ParseOutcome::Skipped(LineSkipReason::PreFiltered);
    }

    let event: OrderEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(_) => return ParseOutcome::Skipped(LineSkipReason::InvalidJson),
    };

    normalize(event)
}

/// Normalize a decoded `OrderEvent` into an `Order` or a skip reason,
/// applying the side mapping, status normalization, numeric conversion,
/// and timestamp parsing rules of the line grammar.
fn normalize(event: OrderEvent) -> ParseOutcome {
    let side = match Side::from_wire_code(&event.side) {
        Some(side) => side,
        None => return ParseOutcome::Skipped(LineSkipReason::UnknownSide(event.side)),
    };

    if REJECTED_STATUSES.contains(&event.status.as_str()) {
        return ParseOutcome::Skipped(LineSkipReason::RejectedStatus(event.status));
    }

    let (status, warning) = match normalize_status(&event.status) {
        Ok(s) => (s, None),
        Err(unmapped) => match canonical_fallback(&unmapped) {
            Some(s) => (s, Some(unmapped)),
            None => (Status::Open, Some(unmapped)),
        },
    };

    let price: f64 = match event.limit_px.parse() {
        Ok(p) if p > 0.0 => p,
        _ => return ParseOutcome::Skipped(LineSkipReason::NonPositivePrice),
    };

    let size: f64 = match event.orig_sz.parse() {
        Ok(s) if s >= 0.0 => s,
        _ => return ParseOutcome::Skipped(LineSkipReason::NegativeSize),
    };

    let timestamp: DateTime<Utc> = match parse_timestamp(&event.timestamp) {
        Some(ts) => ts,
        None => return ParseOutcome::Skipped(LineSkipReason::InvalidTimestamp(event.timestamp)),
    };

    let order = Order {
        id: event.oid,
        symbol: event.coin,
        side,
        price,
        size,
        owner: event.user,
        timestamp,
        status,
    };

    match warning {
        Some(raw_status) => ParseOutcome::AdmittedWithWarning(order, raw_status),
        None => ParseOutcome::Admitted(order),
    }
}

/// Map a raw status onto the canonical four-element set where the
/// mapping is well known. Returns `Err(raw)` for anything else, which the
/// caller treats as "pass through with a warning."
fn normalize_status(raw: &str) -> Result<Status, String> {
    match raw {
        "open" => Ok(Status::Open),
        "triggered" => Ok(Status::Triggered),
        "filled" => Ok(Status::Filled),
        "canceled" | "cancelled" | "vaultWithdrawalCanceled" => Ok(Status::Canceled),
        other => Err(other.to_string()),
    }
}

/// Best-effort fallback for an unmapped status that nonetheless signals a
/// terminal or open condition from its name. Anything not recognized
/// defaults to `Open` by the caller (still admitted, with a warning).
fn canonical_fallback(raw: &str) -> Option<Status> {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("cancel") {
        Some(Status::Canceled)
    } else if lower.contains("fill") {
        Some(Status::Filled)
    } else if lower.contains("trigger") {
        Some(Status::Triggered)
    } else {
        None
    }
}

/// Strict ISO-8601 parse with fractional seconds, interpreted as UTC when
/// no zone is present (per the line grammar, timestamps never carry one).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Bounded LRU cache memoizing parse outcomes by exact-line hash, to
/// amortize repeat lines. Optional per the parser's own contract;
/// correctness never depends on it being used.
pub struct ParseMemo {
    capacity: usize,
    order: VecDeque<u64>,
    entries: std::collections::HashMap<u64, ParseOutcome>,
}

impl ParseMemo {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: std::collections::HashMap::with_capacity(capacity),
        }
    }

    fn hash_line(line: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        line.hash(&mut hasher);
        hasher.finish()
    }

    /// Parse `line`, consulting and updating the memo.
    pub fn parse(&mut self, line: &str) -> ParseOutcome {
        let key = Self::hash_line(line);
        if let Some(cached) = self.entries.get(&key) {
            return cached.clone();
        }

        let outcome = parse_line(line);

        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key);
        self.entries.insert(key, outcome.clone());
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_1_line() -> &'static str {
        r#"{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"open","order":{"oid":1,"coin":"BTC","side":"B","limitPx":"50000","origSz":"1"}}"#
    }

    #[test]
    fn admits_well_formed_open_order() {
        match parse_line(scenario_1_line()) {
            ParseOutcome::Admitted(order) => {
                assert_eq!(order.id, "1");
                assert_eq!(order.symbol, "BTC");
                assert_eq!(order.side, Side::Bid);
                assert_eq!(order.price, 50000.0);
                assert_eq!(order.size, 1.0);
                assert_eq!(order.owner, "0xAA");
                assert_eq!(order.status, Status::Open);
            }
            other => panic!("expected Admitted, got {other:?}"),
        }
    }

    #[test]
    fn pre_filter_rejects_non_order_lines() {
        assert!(!pre_filter("heartbeat"));
        assert!(!pre_filter(r#"{"foo":"bar"}"#));
        assert!(matches!(
            parse_line("not json at all"),
            ParseOutcome::Skipped(LineSkipReason::PreFiltered)
        ));
    }

    #[test]
    fn invalid_json_is_skipped() {
        let line = r#"{"order":{"status":broken}"#;
        assert!(matches!(
            parse_line(line),
            ParseOutcome::Skipped(LineSkipReason::InvalidJson)
        ));
    }

    #[test]
    fn unknown_side_code_is_skipped() {
        let line = r#"{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"open","order":{"oid":1,"coin":"BTC","side":"X","limitPx":"50000","origSz":"1"}}"#;
        assert!(matches!(
            parse_line(line),
            ParseOutcome::Skipped(LineSkipReason::UnknownSide(_))
        ));
    }

    #[test]
    fn cancelled_variants_normalize_to_canceled() {
        for raw_status in ["cancelled", "vaultWithdrawalCanceled"] {
            let line = format!(
                r#"{{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"{raw_status}","order":{{"oid":1,"coin":"BTC","side":"B","limitPx":"50000","origSz":"1"}}}}"#
            );
            match parse_line(&line) {
                ParseOutcome::Admitted(order) => assert_eq!(order.status, Status::Canceled),
                other => panic!("expected Admitted for {raw_status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn documented_rejection_status_is_dropped() {
        let line = r#"{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"reduceOnlyRejected","order":{"oid":1,"coin":"BTC","side":"B","limitPx":"50000","origSz":"1"}}"#;
        assert!(matches!(
            parse_line(line),
            ParseOutcome::Skipped(LineSkipReason::RejectedStatus(_))
        ));
    }

    #[test]
    fn zero_or_negative_price_is_skipped() {
        for price in ["0", "-5"] {
            let line = format!(
                r#"{{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"open","order":{{"oid":1,"coin":"BTC","side":"B","limitPx":"{price}","origSz":"1"}}}}"#
            );
            assert!(matches!(
                parse_line(&line),
                ParseOutcome::Skipped(LineSkipReason::NonPositivePrice)
            ));
        }
    }

    #[test]
    fn zero_size_is_permitted() {
        let line = r#"{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"filled","order":{"oid":1,"coin":"BTC","side":"B","limitPx":"50000","origSz":"0"}}"#;
        assert!(matches!(parse_line(line), ParseOutcome::Admitted(_)));
    }

    #[test]
    fn negative_size_is_skipped() {
        let line = r#"{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"open","order":{"oid":1,"coin":"BTC","side":"B","limitPx":"50000","origSz":"-1"}}"#;
        assert!(matches!(
            parse_line(line),
            ParseOutcome::Skipped(LineSkipReason::NegativeSize)
        ));
    }

    #[test]
    fn malformed_timestamp_is_skipped() {
        let line = r#"{"time":"not-a-timestamp","user":"0xAA","status":"open","order":{"oid":1,"coin":"BTC","side":"B","limitPx":"50000","origSz":"1"}}"#;
        assert!(matches!(
            parse_line(line),
            ParseOutcome::Skipped(LineSkipReason::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn unmapped_status_is_admitted_with_warning() {
        let line = r#"{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"someUnknownStatus","order":{"oid":1,"coin":"BTC","side":"B","limitPx":"50000","origSz":"1"}}"#;
        match parse_line(line) {
            ParseOutcome::AdmittedWithWarning(_, raw) => assert_eq!(raw, "someUnknownStatus"),
            other => panic!("expected AdmittedWithWarning, got {other:?}"),
        }
    }

    #[test]
    fn memo_returns_same_outcome_for_repeated_line() {
        let mut memo = ParseMemo::new(8);
        let line = scenario_1_line();
        let first = memo.parse(line);
        let second = memo.parse(line);
        assert_eq!(first, second);
    }

    #[test]
    fn memo_evicts_oldest_entry_past_capacity() {
        let mut memo = ParseMemo::new(1);
        let line_a = scenario_1_line();
        let line_b = r#"{"time":"2025-09-02T08:26:36.877863946","user":"0xBB","status":"open","order":{"oid":2,"coin":"ETH","side":"A","limitPx":"3000","origSz":"2"}}"#;
        memo.parse(line_a);
        memo.parse(line_b);
        assert_eq!(memo.entries.len(), 1);
        assert!(memo.entries.contains_key(&ParseMemo::hash_line(line_b)));
    }
}
