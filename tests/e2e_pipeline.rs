// End-to-end tests driving the full pipeline against real tempfile-backed
// hourly log fixtures: tail -> parse -> dedupe -> fan-out, and the
// reactive tail-history search engine, wired exactly as `main.rs` wires
// them via `app::pipeline::start`.

use async_trait::async_trait;
use ordertail::app::hub::{BatchedDelivery, SendOutcome, Subscriber};
use ordertail::app::pipeline;
use ordertail::config::{Config, Tuning};
use ordertail::core::filter::{RuleSet, SymbolRule};
use ordertail::core::model::{Side, Status, Update};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct RecordingSubscriber {
    name: String,
    instant: Mutex<Vec<Update>>,
    batched: Mutex<Vec<BatchedDelivery>>,
}

impl RecordingSubscriber {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            instant: Mutex::new(Vec::new()),
            batched: Mutex::new(Vec::new()),
        })
    }

    fn instant_snapshot(&self) -> Vec<Update> {
        self.instant.lock().unwrap().clone()
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_instant(&self, update: Update) -> SendOutcome {
        self.instant.lock().unwrap().push(update);
        SendOutcome::Ok
    }

    async fn send_batched(&self, batch: BatchedDelivery) -> SendOutcome {
        self.batched.lock().unwrap().push(batch);
        SendOutcome::Ok
    }
}

fn order_line(oid: u64, coin: &str, status: &str, price: &str, size: &str, time: &str) -> String {
    format!(
        r#"{{"time":"{time}","user":"0xAA","status":"{status}","order":{{"oid":{oid},"coin":"{coin}","side":"B","limitPx":"{price}","origSz":"{size}"}}}}"#
    )
}

async fn write_hour_file(root: &Path, date: &str, hour: &str, contents: &str) -> std::path::PathBuf {
    let dir = root.join("node_order_statuses/hourly").join(date);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join(hour);
    tokio::fs::write(&path, contents).await.unwrap();
    path
}

fn fast_config(root: std::path::PathBuf, rules: RuleSet) -> Config {
    Config {
        root,
        rules,
        tuning: Tuning {
            batch_size: 10,
            batch_timeout_ms: 5,
            tail_poll_interval_ms: 5,
            dir_watch_fallback_scan_secs: 1,
            batched_channel_period_ms: 20,
            monitoring_cadence_ms: 5,
            // The fixtures below carry a fixed historical timestamp; the
            // monitor sweep's own cutoff is anchored to wall-clock time, so
            // it needs a lookback window wide enough to still cover them.
            lookback_window_secs: 60 * 60 * 24 * 365 * 5,
            ..Tuning::default()
        },
    }
}

async fn wait_until(mut check: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn admitted_order_is_tailed_parsed_and_delivered_instantly() {
    let dir = tempfile::tempdir().unwrap();
    write_hour_file(dir.path(), "20250902", "8", "").await;

    let rules = RuleSet::new([SymbolRule {
        symbol: "BTC".to_string(),
        minimum_liquidity: 0.0,
        price_deviation: 0.0,
    }]);
    let config = fast_config(dir.path().to_path_buf(), rules);
    let pipeline = pipeline::start(config);

    let subscriber = RecordingSubscriber::new("test");
    pipeline.hub.subscribe(subscriber.clone());

    // Tail acquires at EOF with no catch-up read, so give it a moment to
    // settle onto the empty file before appending new content.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let path = dir
        .path()
        .join("node_order_statuses/hourly/20250902/8");
    let line = order_line(1, "BTC", "open", "50000", "2", "2025-09-02T08:26:36.877863946");
    tokio::fs::write(&path, format!("{line}\n")).await.unwrap();

    let delivered = wait_until(
        || !subscriber.instant_snapshot().is_empty(),
        Duration::from_secs(5),
    )
    .await;
    assert!(delivered, "expected an instant delivery for the admitted order");

    let updates = subscriber.instant_snapshot();
    assert_eq!(updates.len(), 1);
    let order = updates[0].order();
    assert_eq!(order.id, "1");
    assert_eq!(order.symbol, "BTC");
    assert_eq!(order.side, Side::Bid);
    assert_eq!(order.status, Status::Open);
    assert_eq!(order.liquidity(), 100_000.0);

    pipeline.cancel();
    pipeline.join().await;
}

#[tokio::test]
async fn order_for_symbol_without_a_rule_is_never_delivered() {
    let dir = tempfile::tempdir().unwrap();
    write_hour_file(dir.path(), "20250902", "8", "").await;

    let rules = RuleSet::new([SymbolRule {
        symbol: "BTC".to_string(),
        minimum_liquidity: 0.0,
        price_deviation: 0.0,
    }]);
    let config = fast_config(dir.path().to_path_buf(), rules);
    let pipeline = pipeline::start(config);

    let subscriber = RecordingSubscriber::new("test");
    pipeline.hub.subscribe(subscriber.clone());

    tokio::time::sleep(Duration::from_millis(50)).await;

    let path = dir
        .path()
        .join("node_order_statuses/hourly/20250902/8");
    let line = order_line(2, "ETH", "open", "3000", "1", "2025-09-02T08:26:36.877863946");
    tokio::fs::write(&path, format!("{line}\n")).await.unwrap();

    // Give the pipeline ample opportunity to (wrongly) deliver before
    // asserting it never did.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(subscriber.instant_snapshot().is_empty());
    assert_eq!(pipeline.metrics.snapshot().admitted_updates, 0);

    pipeline.cancel();
    pipeline.join().await;
}

#[tokio::test]
async fn search_finds_a_historical_open_order_and_tracks_it_until_filled() {
    let dir = tempfile::tempdir().unwrap();
    let history = order_line(7, "BTC", "open", "50000", "1", "2025-09-02T08:26:36.877863946");
    write_hour_file(dir.path(), "20250902", "8", &format!("{history}\n")).await;

    let rules = RuleSet::new([SymbolRule {
        symbol: "BTC".to_string(),
        minimum_liquidity: 0.0,
        price_deviation: 0.0,
    }]);
    let config = fast_config(dir.path().to_path_buf(), rules);
    let pipeline = pipeline::start(config);

    let subscriber = RecordingSubscriber::new("test");
    pipeline.hub.subscribe(subscriber.clone());

    let request = ordertail::core::model::SearchRequest {
        symbol: "BTC".to_string(),
        side: Side::Bid,
        price: 50000.0,
        timestamp: "2025-09-02T08:26:37.000000000Z".parse().unwrap(),
        tolerance: 0.000_001,
    };
    let found = pipeline.search.search(request).await;
    assert_eq!(found.unwrap().id, "7");

    // The order is still open, so it's tracked rather than emitted.
    assert!(subscriber.instant_snapshot().is_empty());

    // Appending a terminal state for the same id lets the monitor sweep's
    // own scan of the tail file notice the tracked order has resolved,
    // independently of whatever the tail/batch path does with it.
    let path = dir
        .path()
        .join("node_order_statuses/hourly/20250902/8");
    let mut contents = tokio::fs::read_to_string(&path).await.unwrap();
    contents.push_str(&order_line(
        7,
        "BTC",
        "filled",
        "50000",
        "1",
        "2025-09-02T08:26:38.000000000",
    ));
    contents.push('\n');
    tokio::fs::write(&path, contents).await.unwrap();

    let delivered = wait_until(
        || {
            subscriber
                .instant_snapshot()
                .iter()
                .any(|u| matches!(u, Update::Search(o) if o.status == Status::Filled))
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(delivered, "expected the resolved tracked order to be emitted");

    pipeline.cancel();
    pipeline.join().await;
}
