// ordertail - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Numeric defaults here are grounded in the original HyperNodeServer
// implementation's own constants (log_parser.py, reactive_order_watcher.py)
// where the specification left a default unstated.

// =============================================================================
// Application metadata
// =============================================================================

pub const APP_NAME: &str = "ordertail";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// File Locator
// =============================================================================

/// Directory layout segment joining the root to the hourly partitions:
/// `<root>/node_order_statuses/hourly/<YYYYMMDD>/<H>`.
pub const HOURLY_SUBPATH: &str = "node_order_statuses/hourly";

/// Valid hour file names, as plain decimal with no leading zero: 0..=23.
pub const MIN_HOUR: u32 = 0;
pub const MAX_HOUR: u32 = 23;

// =============================================================================
// Tail Reader
// =============================================================================

/// Default poll cadence when no rotation-notification event is pending (ms).
pub const DEFAULT_TAIL_POLL_INTERVAL_MS: u64 = 5;

/// Ultra-fast poll cadence used when the caller opts into sub-millisecond
/// responsiveness (microseconds). 500us keeps CPU use bounded while still
/// reacting to writes well under a millisecond after they land.
pub const FAST_TAIL_POLL_INTERVAL_US: u64 = 500;

/// Poll cadence used in rate-limited mode, driven by an external pacing
/// signal rather than a fixed timer (ms). This is the ceiling applied
/// between pacing signals so the loop never fully blocks.
pub const RATE_LIMITED_TAIL_POLL_INTERVAL_MS: u64 = 50;

/// Periodic fallback re-scan of the hourly directory in case a `notify`
/// rotation event is missed (seconds). Tens of seconds, per the design:
/// cheap insurance, not the primary detection path.
pub const DIR_WATCH_FALLBACK_SCAN_SECS: u64 = 30;

/// Maximum bytes read from the tail file in a single poll tick.
pub const MAX_TAIL_READ_BYTES_PER_TICK: usize = 1024 * 1024; // 1 MiB

/// Maximum size of the carried-over partial-line buffer before it is
/// treated as a malformed, unbounded line and discarded with a warning.
pub const MAX_TAIL_PARTIAL_BYTES: usize = 1024 * 1024; // 1 MiB

/// Backoff applied after a non-disk-full transient I/O error before the
/// next poll attempt (ms).
pub const TAIL_TRANSIENT_BACKOFF_MS: u64 = 200;

/// Backoff applied after an unexpected exception short-circuits one tail
/// iteration (ms). Brief, so the loop recovers quickly, but non-zero so a
/// persistent fault does not spin the CPU.
pub const TAIL_EXCEPTION_BACKOFF_MS: u64 = 100;

// =============================================================================
// Line Parser
// =============================================================================

/// Default streaming read chunk size in bytes, matching the original
/// implementation's `LogParser(chunk_size=8192)`.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Size of the bounded LRU used for optional line-hash memoization.
pub const DEFAULT_PARSE_MEMO_CAPACITY: usize = 4096;

/// Statuses that are always discarded by the Line Parser rather than
/// admitted to the Order Store, matching the original's `not_created_statuses`
/// list. `cancelled`/`vaultWithdrawalCanceled` are deliberately absent: those
/// normalize to `Canceled` and are admitted (see `normalize_status`).
pub const REJECTED_STATUSES: &[&str] = &[
    "badAloPxRejected",
    "iocCancelRejected",
    "insufficientSpotBalanceRejected",
    "marginCanceled",
    "minTradeNtlRejected",
    "perpMarginRejected",
    "perpMaxPositionRejected",
    "reduceOnlyCanceled",
    "reduceOnlyRejected",
    "scheduledCancel",
    "selfTradeCanceled",
    "siblingFilledCanceled",
    "positionIncreaseAtOpenInterestCapRejected",
    "positionFlipAtOpenInterestCapRejected",
];

// =============================================================================
// Batch Processor
// =============================================================================

/// Default flush trigger: number of buffered lines, matching the original
/// implementation's `LogParser(batch_size=1000)`.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default flush trigger: elapsed time since the buffer was last flushed,
/// even if `DEFAULT_BATCH_SIZE` has not been reached (ms).
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 25;

/// Hard cap on the number of lines parsed in one flush; any remainder
/// stays buffered for the next cycle rather than growing a single flush
/// without bound.
pub const MAX_FLUSH_SIZE: usize = 100_000;

/// Snapshot size at or above which the batch is split across the parallel
/// parse worker pool instead of parsed on the calling task.
pub const PARALLEL_PARSE_THRESHOLD: usize = 256;

/// Per-chunk parse timeout in the parallel path (seconds). A chunk that
/// exceeds this yields an empty result for that cycle rather than
/// stalling the whole flush.
pub const PARALLEL_PARSE_CHUNK_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Subscriber Hub
// =============================================================================

/// Default period of the batched-delivery channel (ms).
pub const DEFAULT_BATCHED_CHANNEL_PERIOD_MS: u64 = 500;

/// Bound on the instant-channel's internal mpsc queue per subscriber.
/// A slow subscriber beyond this is treated as failed and removed.
pub const INSTANT_CHANNEL_CAPACITY: usize = 4096;

// =============================================================================
// Reactive Search Engine
// =============================================================================

/// Default backward look-back window from the search request's timestamp
/// to the oldest event the scan will still consider (seconds).
pub const DEFAULT_LOOKBACK_WINDOW_SECS: i64 = 2;

/// Hard cap on the number of lines a single backward scan will examine,
/// regardless of the look-back window.
pub const DEFAULT_MAX_SCAN_LINES: usize = 10_000;

/// Chunk size used when reading the memory-mapped tail file backward.
pub const DEFAULT_SEARCH_CHUNK_BYTES: usize = 8192;

/// Default price-tolerance applied when matching a search request's price
/// against a candidate order, matching the original's
/// `tolerance: float = 0.000001`.
pub const DEFAULT_SEARCH_TOLERANCE: f64 = 0.000_001;

/// Default window a resolved match is kept in the short-lived search
/// cache, matching the original's `cache_duration_seconds = 10`.
pub const DEFAULT_SEARCH_CACHE_WINDOW_SECS: i64 = 10;

/// Default cadence of the tracked-order monitoring loop (ms), matching the
/// original's `monitoring_interval_ms: float = 10.0`.
pub const DEFAULT_MONITORING_CADENCE_MS: u64 = 10;

/// Default unconditional eviction age for a tracked order that never
/// reaches a terminal status (minutes).
pub const DEFAULT_MAX_TRACKING_AGE_MINS: i64 = 60;

// =============================================================================
// Symbol Filter
// =============================================================================

/// Default per-symbol minimum liquidity (`price * size`) when a rule does
/// not specify one explicitly.
pub const DEFAULT_MINIMUM_LIQUIDITY: f64 = 0.0;

// =============================================================================
// Logging
// =============================================================================

pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name, when loaded from disk by the binary.
pub const CONFIG_FILE_NAME: &str = "ordertail.toml";
