// ordertail - app/search.rs
//
// Reactive Search Engine: given a caller's belief about an order (symbol,
// side, price, approximate time), scans backward through the tail
// history for the best matching candidate, promotes an open match into
// live tracking, and emits directly to the Subscriber Hub. Keeps its own
// read positions into the tail history; it never reads through the
// Order Store, so it stays independent of the Batch Processor's path.

use crate::config::Tuning;
use crate::core::filter::SymbolFilter;
use crate::core::locator::Locator;
use crate::core::model::{Order, SearchRequest, Side, Status, TrackedOrder, Update};
use crate::core::parser::{self, ParseOutcome};
use crate::metrics::Counters;
use crate::util::error::SearchError;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Key identifying a search request for the short-lived result cache.
/// Price is keyed by its raw bit pattern since `f64` has no `Eq`/`Hash`;
/// two requests for the "same" price only collide if they carry the
/// identical bit pattern, which holds for repeated calls with the same
/// literal input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    symbol: String,
    side: Side,
    price_bits: u64,
}

impl From<&SearchRequest> for CacheKey {
    fn from(request: &SearchRequest) -> Self {
        Self {
            symbol: request.symbol.clone(),
            side: request.side,
            price_bits: request.price.to_bits(),
        }
    }
}

struct CachedMatch {
    order: Order,
    cached_at: DateTime<Utc>,
}

/// The search engine's full state: the tail locator, the Symbol Filter
/// shared with the Order Store (a candidate must pass it too, or it's
/// discarded without emission), the Hub's input channel, and the
/// tracked-order/cache maps.
pub struct SearchEngine {
    locator: Locator,
    filter: Arc<SymbolFilter>,
    hub_tx: mpsc::Sender<Update>,
    metrics: Arc<Counters>,
    tuning: Tuning,
    tracked: Mutex<HashMap<String, TrackedOrder>>,
    cache: Mutex<HashMap<CacheKey, CachedMatch>>,
}

impl SearchEngine {
    pub fn new(
        locator: Locator,
        filter: Arc<SymbolFilter>,
        hub_tx: mpsc::Sender<Update>,
        metrics: Arc<Counters>,
        tuning: Tuning,
    ) -> Self {
        Self {
            locator,
            filter,
            hub_tx,
            metrics,
            tuning,
            tracked: Mutex::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a search request: serve from cache if fresh, otherwise
    /// scan the current tail file backward. A matching order still in
    /// `open` status is promoted into tracking; a match already terminal
    /// is emitted to the Hub immediately.
    pub async fn search(&self, request: SearchRequest) -> Option<Order> {
        let key = CacheKey::from(&request);
        if let Some(cached) = self.cache_lookup(&key) {
            self.metrics.record_cache_hit();
            return Some(cached);
        }
        self.metrics.record_cache_miss();

        let path = match self.locator.current_file() {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "search could not resolve a tail target");
                return None;
            }
        };

        let max_scan_lines = self.tuning.max_scan_lines;
        let chunk_bytes = crate::util::constants::DEFAULT_SEARCH_CHUNK_BYTES;
        let cutoff = request.timestamp - ChronoDuration::seconds(self.tuning.lookback_window_secs);
        let request_clone = request.clone();
        let filter = Arc::clone(&self.filter);

        let candidates = tokio::task::spawn_blocking(move || {
            scan_file(&path, max_scan_lines, cutoff, chunk_bytes, move |order| {
                matches(order, &request_clone) && filter.admits(&order.symbol, order.price, order.size)
            })
        })
        .await
        .ok()?;

        let candidates = match candidates {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "search scan failed");
                return None;
            }
        };

        let best = select_best_match(candidates)?;
        self.cache_insert(key, best.clone());

        if best.status.is_terminal() {
            let _ = self.hub_tx.send(Update::Search(best.clone())).await;
        } else {
            let mut tracked = self.tracked.lock().expect("tracked lock poisoned");
            tracked.insert(
                best.id.clone(),
                TrackedOrder {
                    order: best.clone(),
                    tracked_since: Utc::now(),
                },
            );
            self.metrics.set_tracked_orders_active(tracked.len() as u64);
        }

        Some(best)
    }

    fn cache_lookup(&self, key: &CacheKey) -> Option<Order> {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        let window = ChronoDuration::seconds(self.tuning.search_cache_window_secs);
        match cache.get(key) {
            Some(entry) if Utc::now() - entry.cached_at <= window => Some(entry.order.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_insert(&self, key: CacheKey, order: Order) {
        self.cache.lock().expect("cache lock poisoned").insert(
            key,
            CachedMatch {
                order,
                cached_at: Utc::now(),
            },
        );
    }

    /// One sweep of the tracked-order monitor: drop orders past
    /// `maxTrackingAge`, then independently read and parse recent lines
    /// from the current tail file (the same locator + mmap scan path
    /// `search` uses) to find any tracked order that has since resolved
    /// to a terminal status, emitting and dropping those.
    async fn sweep(&self) {
        let max_age = ChronoDuration::minutes(self.tuning.max_tracking_age_mins);
        let now = Utc::now();

        let ids: HashSet<String> = {
            let mut tracked = self.tracked.lock().expect("tracked lock poisoned");
            let expired: Vec<String> = tracked
                .iter()
                .filter(|(_, entry)| now - entry.tracked_since > max_age)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &expired {
                tracked.remove(id);
            }
            self.metrics.set_tracked_orders_active(tracked.len() as u64);
            tracked.keys().cloned().collect()
        };

        if ids.is_empty() {
            return;
        }

        let path = match self.locator.current_file() {
            Ok(Some(path)) => path,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "monitor sweep could not resolve a tail target");
                return;
            }
        };

        let max_scan_lines = self.tuning.max_scan_lines;
        let chunk_bytes = crate::util::constants::DEFAULT_SEARCH_CHUNK_BYTES;
        let cutoff = now - ChronoDuration::seconds(self.tuning.lookback_window_secs);
        let filter = Arc::clone(&self.filter);
        let ids_clone = ids.clone();

        let resolved = tokio::task::spawn_blocking(move || {
            scan_file(&path, max_scan_lines, cutoff, chunk_bytes, move |order| {
                ids_clone.contains(&order.id) && filter.admits(&order.symbol, order.price, order.size)
            })
        })
        .await
        .ok();

        let resolved = match resolved {
            Some(Ok(orders)) => orders,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "monitor sweep scan failed");
                return;
            }
            None => return,
        };

        let mut to_emit = Vec::new();
        {
            let mut tracked = self.tracked.lock().expect("tracked lock poisoned");
            for (_, order) in latest_by_id(resolved) {
                if order.status.is_terminal() && tracked.remove(&order.id).is_some() {
                    to_emit.push(order);
                }
            }
            self.metrics.set_tracked_orders_active(tracked.len() as u64);
        }

        for order in to_emit {
            let _ = self.hub_tx.send(Update::Search(order)).await;
        }
    }
}

/// Drive the tracked-order monitoring loop at the configured cadence
/// until `cancel` is set.
pub async fn run_monitor(engine: Arc<SearchEngine>, cadence_ms: u64, cancel: Arc<AtomicBool>) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_millis(cadence_ms.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        ticker.tick().await;
        engine.sweep().await;
    }
}

fn matches(order: &Order, request: &SearchRequest) -> bool {
    order.symbol == request.symbol
        && order.side == request.side
        && (order.price - request.price).abs() <= request.tolerance
}

/// Group candidates by order id down to each id's latest-timestamp state
/// (mirrors the Order Store's own notion of "current state").
fn latest_by_id(candidates: Vec<Order>) -> HashMap<String, Order> {
    let mut latest: HashMap<String, Order> = HashMap::new();
    for candidate in candidates {
        match latest.get(&candidate.id) {
            Some(existing) if existing.timestamp >= candidate.timestamp => {}
            _ => {
                latest.insert(candidate.id.clone(), candidate);
            }
        }
    }
    latest
}

/// Pick the single best match from the candidates a scan produced. An
/// order still `open` wins over anything terminal, since a caller
/// searching the tail is typically trying to find an order to track
/// going forward; among open candidates the highest-liquidity one wins.
/// If every candidate has already resolved, the highest-liquidity
/// terminal state is returned instead.
fn select_best_match(candidates: Vec<Order>) -> Option<Order> {
    let latest = latest_by_id(candidates);

    let by_liquidity = |a: &&Order, b: &&Order| {
        a.liquidity()
            .partial_cmp(&b.liquidity())
            .unwrap_or(std::cmp::Ordering::Equal)
    };

    latest
        .values()
        .filter(|o| o.status == Status::Open)
        .max_by(by_liquidity)
        .or_else(|| latest.values().max_by(by_liquidity))
        .cloned()
}

/// Scan `path` backward from end-of-file in `chunk_bytes` windows,
/// stopping once `max_scan_lines` have been examined or a line's
/// timestamp falls before `cutoff`. Returns every parsed line for which
/// `predicate` returns true.
fn scan_file(
    path: &std::path::Path,
    max_scan_lines: usize,
    cutoff: DateTime<Utc>,
    chunk_bytes: usize,
    predicate: impl Fn(&Order) -> bool,
) -> Result<Vec<Order>, SearchError> {
    let file = std::fs::File::open(path).map_err(|source| SearchError::Mmap {
        path: path.to_path_buf(),
        source,
    })?;
    let mmap = unsafe { memmap2::Mmap::map(&file) }.map_err(|source| SearchError::Mmap {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(scan_bytes_backward(&mmap, max_scan_lines, cutoff, chunk_bytes, predicate))
}

fn scan_bytes_backward(
    data: &[u8],
    max_scan_lines: usize,
    cutoff: DateTime<Utc>,
    chunk_bytes: usize,
    predicate: impl Fn(&Order) -> bool,
) -> Vec<Order> {
    let mut candidates = Vec::new();
    let mut lines_examined = 0usize;
    let mut window_end = data.len();
    let mut carry: Vec<u8> = Vec::new();

    while window_end > 0 && lines_examined < max_scan_lines {
        let window_start = window_end.saturating_sub(chunk_bytes);
        let mut buf = data[window_start..window_end].to_vec();
        buf.extend_from_slice(&carry);
        carry.clear();

        let boundary_clean = window_start == 0 || data[window_start - 1] == b'\n';

        let mut line_starts = vec![0usize];
        for (i, &b) in buf.iter().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }

        let mut lines: Vec<Vec<u8>> = Vec::new();
        for w in line_starts.windows(2) {
            lines.push(buf[w[0]..w[1]].to_vec());
        }

        if !boundary_clean && !lines.is_empty() {
            carry = lines.remove(0);
        }

        let mut stop = false;
        for line_bytes in lines.iter().rev() {
            if lines_examined >= max_scan_lines {
                stop = true;
                break;
            }
            lines_examined += 1;
            let text = String::from_utf8_lossy(line_bytes);
            let trimmed = text.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                continue;
            }
            match parser::parse_line(trimmed) {
                ParseOutcome::Admitted(order) | ParseOutcome::AdmittedWithWarning(order, _) => {
                    if order.timestamp < cutoff {
                        stop = true;
                        break;
                    }
                    if predicate(&order) {
                        candidates.push(order);
                    }
                }
                ParseOutcome::Skipped(_) => {}
            }
        }

        if stop {
            break;
        }
        window_end = window_start;
    }

    candidates
}
