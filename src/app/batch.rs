// ordertail - app/batch.rs
//
// Batch Processor: buffers raw lines from the Tail Reader, flushes on a
// size or timeout trigger, parses the snapshot (inline or across a
// parallel worker pool for large snapshots), and hands the resulting
// orders to the Order Store. Changed orders are forwarded to the
// Subscriber Hub.

use crate::config::Tuning;
use crate::core::model::Update;
use crate::core::parser::{self, ParseMemo, ParseOutcome};
use crate::core::store::OrderStore;
use crate::metrics::Counters;
use crate::util::constants::{DEFAULT_PARSE_MEMO_CAPACITY, PARALLEL_PARSE_CHUNK_TIMEOUT_SECS};
use crate::util::error::LineSkipReason;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Run the batch loop until `cancel` is set or the line channel closes.
pub async fn run(
    mut lines_rx: mpsc::Receiver<String>,
    store: Arc<Mutex<OrderStore>>,
    metrics: Arc<Counters>,
    tuning: Tuning,
    hub_tx: mpsc::Sender<Update>,
    cancel: Arc<AtomicBool>,
) {
    let mut buffer: Vec<String> = Vec::new();
    let mut memo = ParseMemo::new(DEFAULT_PARSE_MEMO_CAPACITY);
    let mut workers = ParseWorkers::new();
    let timeout_dur = Duration::from_millis(tuning.batch_timeout_ms.max(1));

    loop {
        if cancel.load(Ordering::Relaxed) {
            flush(&mut buffer, &mut memo, &mut workers, &tuning, &store, &metrics, &hub_tx).await;
            return;
        }

        tokio::select! {
            received = lines_rx.recv() => {
                match received {
                    Some(line) => {
                        buffer.push(line);
                        if buffer.len() >= tuning.batch_size {
                            flush(&mut buffer, &mut memo, &mut workers, &tuning, &store, &metrics, &hub_tx).await;
                        }
                    }
                    None => {
                        flush(&mut buffer, &mut memo, &mut workers, &tuning, &store, &metrics, &hub_tx).await;
                        return;
                    }
                }
            }
            _ = tokio::time::sleep(timeout_dur) => {
                flush(&mut buffer, &mut memo, &mut workers, &tuning, &store, &metrics, &hub_tx).await;
            }
        }
    }
}

/// Snapshot-and-clear one flush cycle: drain up to `maxFlushSize` lines,
/// parse them, apply the resulting orders to the store, and forward any
/// orders that changed state to the Hub.
async fn flush(
    buffer: &mut Vec<String>,
    memo: &mut ParseMemo,
    workers: &mut ParseWorkers,
    tuning: &Tuning,
    store: &Mutex<OrderStore>,
    metrics: &Counters,
    hub_tx: &mpsc::Sender<Update>,
) {
    if buffer.is_empty() {
        return;
    }

    let take = buffer.len().min(tuning.max_flush_size);
    let snapshot: Vec<String> = buffer.drain(0..take).collect();

    let outcomes = if snapshot.len() >= tuning.parallel_parse_threshold {
        parse_parallel(snapshot, workers).await
    } else {
        snapshot.iter().map(|line| memo.parse(line)).collect()
    };

    let mut orders = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            ParseOutcome::Admitted(order) => {
                metrics.record_pre_filter_passed();
                orders.push(order);
            }
            ParseOutcome::AdmittedWithWarning(order, warning) => {
                metrics.record_pre_filter_passed();
                tracing::warn!(warning = %warning, order_id = %order.id, "line admitted with warning");
                orders.push(order);
            }
            ParseOutcome::Skipped(reason) => {
                metrics.record_pre_filter_rejected();
                if let LineSkipReason::RejectedStatus(status) = &reason {
                    metrics.record_rejected_status(status);
                } else if !matches!(reason, LineSkipReason::PreFiltered) {
                    metrics.record_parse_error();
                }
                tracing::debug!(reason = %reason, "line skipped");
            }
        }
    }

    let (changed, warnings) = {
        let mut store = store.lock().expect("order store lock poisoned");
        store.apply_batch(orders)
    };

    for warning in warnings {
        tracing::warn!(warning = %warning, "batch conflict resolved");
    }

    for order in changed {
        metrics.record_admitted();
        if hub_tx.send(Update::Live(order)).await.is_err() {
            return; // hub shut down; nothing left to notify
        }
    }
}

/// Parse a snapshot across the worker pool, split into exactly as many
/// chunks as the pool has threads, each chunk dispatched to the pool
/// independently and awaited with its own timeout. A chunk that exceeds
/// `PARALLEL_PARSE_CHUNK_TIMEOUT_SECS` yields an empty result for that
/// cycle; every other chunk's lines still parse and are returned
/// normally. The pool is rebuilt afterward if any chunk timed out,
/// rather than risk a wedged worker stalling every future flush.
async fn parse_parallel(lines: Vec<String>, workers: &mut ParseWorkers) -> Vec<ParseOutcome> {
    let n = workers.num_threads();
    let chunks = split_into_n_chunks(lines, n);

    let mut receivers = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let (tx, rx) = tokio::sync::oneshot::channel();
        workers.pool.spawn(move || {
            let result: Vec<ParseOutcome> = chunk.iter().map(|line| parser::parse_line(line)).collect();
            let _ = tx.send(result);
        });
        receivers.push(rx);
    }

    let mut outcomes = Vec::new();
    let mut any_timed_out = false;
    for rx in receivers {
        match tokio::time::timeout(Duration::from_secs(PARALLEL_PARSE_CHUNK_TIMEOUT_SECS), rx).await
        {
            Ok(Ok(result)) => outcomes.extend(result),
            _ => any_timed_out = true,
        }
    }

    if any_timed_out {
        tracing::warn!("a parallel parse chunk timed out; recreating worker pool");
        workers.recreate();
    }

    outcomes
}

/// Split `lines` into exactly `n` chunks (n.max(1)) as evenly as
/// possible, preserving order.
fn split_into_n_chunks(lines: Vec<String>, n: usize) -> Vec<Vec<String>> {
    let n = n.max(1);
    let len = lines.len();
    let base = len / n;
    let rem = len % n;

    let mut out = Vec::with_capacity(n);
    let mut rest = lines;
    for i in 0..n {
        let take = base + usize::from(i < rem);
        if rest.len() <= take {
            out.push(std::mem::take(&mut rest));
        } else {
            out.push(rest.drain(0..take).collect());
        }
    }
    out
}

/// Owns the rayon pool used for the parallel parse path. Wrapped in an
/// `Arc` so a pool can be moved into the one-off thread that drives a
/// flush without borrowing across the timeout.
struct ParseWorkers {
    pool: Arc<rayon::ThreadPool>,
}

impl ParseWorkers {
    fn new() -> Self {
        Self {
            pool: Arc::new(build_pool()),
        }
    }

    fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    fn recreate(&mut self) {
        self.pool = Arc::new(build_pool());
    }
}

fn build_pool() -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("ordertail-parse-{i}"))
        .build()
        .expect("failed to build parse worker pool")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::{RuleSet, SymbolFilter, SymbolRule};

    fn store_with_btc_admitted() -> Arc<Mutex<OrderStore>> {
        let filter = SymbolFilter::new(RuleSet::new([SymbolRule {
            symbol: "BTC".to_string(),
            minimum_liquidity: 0.0,
            price_deviation: 0.0,
        }]));
        Arc::new(Mutex::new(OrderStore::new(Arc::new(filter))))
    }

    fn open_line(oid: u64) -> String {
        format!(
            r#"{{"time":"2025-09-02T08:26:36.877863946","user":"0xAA","status":"open","order":{{"oid":{oid},"coin":"BTC","side":"B","limitPx":"50000","origSz":"1"}}}}"#
        )
    }

    #[test]
    fn split_into_n_chunks_preserves_order_and_count() {
        let lines: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        let chunks = split_into_n_chunks(lines.clone(), 3);
        assert_eq!(chunks.len(), 3);
        let flattened: Vec<String> = chunks.into_iter().flatten().collect();
        assert_eq!(flattened, lines);
    }

    #[test]
    fn split_into_n_chunks_handles_fewer_lines_than_workers() {
        let lines: Vec<String> = vec!["a".into(), "b".into()];
        let chunks = split_into_n_chunks(lines, 8);
        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks.iter().flatten().count(), 2);
    }

    #[tokio::test]
    async fn flush_applies_admitted_orders_and_notifies_hub() {
        let store = store_with_btc_admitted();
        let metrics = Arc::new(Counters::default());
        let tuning = Tuning::default();
        let (hub_tx, mut hub_rx) = mpsc::channel(16);
        let mut memo = ParseMemo::new(16);
        let mut workers = ParseWorkers::new();

        let mut buffer = vec![open_line(1)];
        flush(&mut buffer, &mut memo, &mut workers, &tuning, &store, &metrics, &hub_tx).await;

        assert!(buffer.is_empty());
        let update = hub_rx.try_recv().unwrap();
        assert_eq!(update.order().id, "1");
        assert_eq!(metrics.snapshot().admitted_updates, 1);
    }

    #[tokio::test]
    async fn flush_respects_max_flush_size_and_retains_remainder() {
        let store = store_with_btc_admitted();
        let metrics = Arc::new(Counters::default());
        let mut tuning = Tuning::default();
        tuning.max_flush_size = 2;
        let (hub_tx, mut hub_rx) = mpsc::channel(16);
        let mut memo = ParseMemo::new(16);
        let mut workers = ParseWorkers::new();

        let mut buffer: Vec<String> = (1..=5).map(open_line).collect();
        flush(&mut buffer, &mut memo, &mut workers, &tuning, &store, &metrics, &hub_tx).await;

        assert_eq!(buffer.len(), 3); // 5 - max_flush_size(2) retained
        let mut seen = 0;
        while hub_rx.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn flush_uses_parallel_path_above_threshold() {
        let store = store_with_btc_admitted();
        let metrics = Arc::new(Counters::default());
        let mut tuning = Tuning::default();
        tuning.parallel_parse_threshold = 4;
        let (hub_tx, mut hub_rx) = mpsc::channel(64);
        let mut memo = ParseMemo::new(16);
        let mut workers = ParseWorkers::new();

        let mut buffer: Vec<String> = (1..=10).map(open_line).collect();
        flush(&mut buffer, &mut memo, &mut workers, &tuning, &store, &metrics, &hub_tx).await;

        assert!(buffer.is_empty());
        let mut seen = 0;
        while hub_rx.try_recv().is_ok() {
            seen += 1;
        }
        assert_eq!(seen, 10);
    }
}
