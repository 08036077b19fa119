// ordertail - app/pipeline.rs
//
// Wires the File Locator, Tail Reader, Batch Processor, Order Store,
// Symbol Filter, Subscriber Hub, and Reactive Search Engine together and
// drives them as cooperating tokio tasks. The single entry point the
// binary calls; also the seam integration tests drive against real
// temp-directory fixtures.

use crate::app::{batch, hub, search, tail};
use crate::config::Config;
use crate::core::filter::SymbolFilter;
use crate::core::locator::Locator;
use crate::core::model::TailEvent;
use crate::core::store::OrderStore;
use crate::metrics::Counters;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Handles to a running pipeline. Dropping this without calling
/// `cancel`/`join` leaves the background tasks running detached.
pub struct Pipeline {
    pub hub: Arc<hub::Hub>,
    pub search: Arc<search::SearchEngine>,
    pub metrics: Arc<Counters>,
    pub store: Arc<Mutex<OrderStore>>,
    cancel: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Request cooperative shutdown of every running task. Does not
    /// block; call `join` afterward to wait for completion.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait for every task to observe the cancel signal and exit.
    pub async fn join(self) {
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Construct every pipeline stage from `config` and start it running.
/// Returns immediately.
pub fn start(config: Config) -> Pipeline {
    let cancel = Arc::new(AtomicBool::new(false));
    let metrics = Arc::new(Counters::default());
    let filter = Arc::new(SymbolFilter::new(config.rules.clone()));
    let store = Arc::new(Mutex::new(OrderStore::new(filter.clone())));
    let locator = Locator::new(config.root.clone());
    let hub = Arc::new(hub::Hub::new());

    let tail_handle = tail::spawn(locator.clone(), config.tuning.clone(), cancel.clone());

    let (hub_tx, hub_rx) = mpsc::channel(crate::util::constants::INSTANT_CHANNEL_CAPACITY);

    let batch_task = tokio::spawn(batch::run(
        tail_handle.lines,
        store.clone(),
        metrics.clone(),
        config.tuning.clone(),
        hub_tx.clone(),
        cancel.clone(),
    ));

    let tail_events_task = tokio::spawn(log_tail_events(tail_handle.events, cancel.clone()));

    let hub_task = tokio::spawn(hub::run(
        hub.clone(),
        hub_rx,
        config.tuning.batched_channel_period_ms,
        cancel.clone(),
    ));

    let search_engine = Arc::new(search::SearchEngine::new(
        locator,
        filter,
        hub_tx,
        metrics.clone(),
        config.tuning.clone(),
    ));

    let monitor_task = tokio::spawn(search::run_monitor(
        search_engine.clone(),
        config.tuning.monitoring_cadence_ms,
        cancel.clone(),
    ));

    Pipeline {
        hub,
        search: search_engine,
        metrics,
        store,
        cancel,
        tasks: vec![
            tail_handle.join,
            batch_task,
            tail_events_task,
            hub_task,
            monitor_task,
        ],
    }
}

/// Drain the Tail Reader's diagnostic event stream into structured logs;
/// not part of the order data path.
async fn log_tail_events(mut events: mpsc::Receiver<TailEvent>, cancel: Arc<AtomicBool>) {
    loop {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        match events.recv().await {
            Some(TailEvent::Acquired { path, offset }) => {
                tracing::info!(path = %path.display(), offset, "tail acquired file")
            }
            Some(TailEvent::LinesRead { count }) => tracing::trace!(count, "tail read lines"),
            Some(TailEvent::Truncated { path }) => {
                tracing::warn!(path = %path.display(), "tail file truncated")
            }
            Some(TailEvent::Rotated { from, to }) => tracing::info!(
                from = %from.display(),
                to = %to.display(),
                "tail rotated to a new file"
            ),
            Some(TailEvent::TransientError { message }) => {
                tracing::warn!(message = %message, "tail transient error")
            }
            Some(TailEvent::DiskFull) => tracing::error!("tail reported disk full"),
            None => return,
        }
    }
}
