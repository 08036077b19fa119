// ordertail - config.rs
//
// Configuration snapshot: per-symbol rules plus global tuning parameters
// (§6). The crate does not own persistence — loading from disk is a
// convenience the binary uses, not a requirement of the library.

use crate::core::filter::{RuleSet, SymbolRule};
use crate::util::constants::*;
use crate::util::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Global tuning parameters, all defaulted from `util::constants` when a
/// TOML document omits them.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub max_flush_size: usize,
    pub parallel_parse_threshold: usize,
    pub tail_poll_interval_ms: u64,
    pub dir_watch_fallback_scan_secs: u64,
    pub batched_channel_period_ms: u64,
    pub lookback_window_secs: i64,
    pub max_scan_lines: usize,
    pub monitoring_cadence_ms: u64,
    pub max_tracking_age_mins: i64,
    pub search_cache_window_secs: i64,
    pub search_tolerance: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout_ms: DEFAULT_BATCH_TIMEOUT_MS,
            max_flush_size: MAX_FLUSH_SIZE,
            parallel_parse_threshold: PARALLEL_PARSE_THRESHOLD,
            tail_poll_interval_ms: DEFAULT_TAIL_POLL_INTERVAL_MS,
            dir_watch_fallback_scan_secs: DIR_WATCH_FALLBACK_SCAN_SECS,
            batched_channel_period_ms: DEFAULT_BATCHED_CHANNEL_PERIOD_MS,
            lookback_window_secs: DEFAULT_LOOKBACK_WINDOW_SECS,
            max_scan_lines: DEFAULT_MAX_SCAN_LINES,
            monitoring_cadence_ms: DEFAULT_MONITORING_CADENCE_MS,
            max_tracking_age_mins: DEFAULT_MAX_TRACKING_AGE_MINS,
            search_cache_window_secs: DEFAULT_SEARCH_CACHE_WINDOW_SECS,
            search_tolerance: DEFAULT_SEARCH_TOLERANCE,
        }
    }
}

/// A validated, in-memory configuration snapshot.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: std::path::PathBuf,
    pub rules: RuleSet,
    pub tuning: Tuning,
}

/// Raw TOML document shape, deserialized then validated into `Config`.
#[derive(Debug, Deserialize)]
struct ConfigDocument {
    root: std::path::PathBuf,
    #[serde(default)]
    symbol: Vec<SymbolRuleDoc>,
    #[serde(default)]
    tuning: TuningDoc,
}

#[derive(Debug, Deserialize)]
struct SymbolRuleDoc {
    symbol: String,
    minimum_liquidity: f64,
    #[serde(default)]
    price_deviation: f64,
}

#[derive(Debug, Deserialize, Default)]
struct TuningDoc {
    batch_size: Option<usize>,
    batch_timeout_ms: Option<u64>,
    max_flush_size: Option<usize>,
    parallel_parse_threshold: Option<usize>,
    tail_poll_interval_ms: Option<u64>,
    dir_watch_fallback_scan_secs: Option<u64>,
    batched_channel_period_ms: Option<u64>,
    lookback_window_secs: Option<i64>,
    max_scan_lines: Option<usize>,
    monitoring_cadence_ms: Option<u64>,
    max_tracking_age_mins: Option<i64>,
    search_cache_window_secs: Option<i64>,
    search_tolerance: Option<f64>,
}

impl TuningDoc {
    fn into_tuning(self) -> Result<Tuning, ConfigError> {
        let defaults = Tuning::default();
        let tuning = Tuning {
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            batch_timeout_ms: self.batch_timeout_ms.unwrap_or(defaults.batch_timeout_ms),
            max_flush_size: self.max_flush_size.unwrap_or(defaults.max_flush_size),
            parallel_parse_threshold: self
                .parallel_parse_threshold
                .unwrap_or(defaults.parallel_parse_threshold),
            tail_poll_interval_ms: self
                .tail_poll_interval_ms
                .unwrap_or(defaults.tail_poll_interval_ms),
            dir_watch_fallback_scan_secs: self
                .dir_watch_fallback_scan_secs
                .unwrap_or(defaults.dir_watch_fallback_scan_secs),
            batched_channel_period_ms: self
                .batched_channel_period_ms
                .unwrap_or(defaults.batched_channel_period_ms),
            lookback_window_secs: self
                .lookback_window_secs
                .unwrap_or(defaults.lookback_window_secs),
            max_scan_lines: self.max_scan_lines.unwrap_or(defaults.max_scan_lines),
            monitoring_cadence_ms: self
                .monitoring_cadence_ms
                .unwrap_or(defaults.monitoring_cadence_ms),
            max_tracking_age_mins: self
                .max_tracking_age_mins
                .unwrap_or(defaults.max_tracking_age_mins),
            search_cache_window_secs: self
                .search_cache_window_secs
                .unwrap_or(defaults.search_cache_window_secs),
            search_tolerance: self.search_tolerance.unwrap_or(defaults.search_tolerance),
        };

        if tuning.batch_size == 0 {
            return Err(ConfigError::ValueOutOfRange {
                field: "tuning.batch_size".to_string(),
                value: "0".to_string(),
                expected: "a positive integer".to_string(),
            });
        }
        Ok(tuning)
    }
}

impl Config {
    /// Parse and validate a configuration document from a TOML string.
    pub fn from_toml_str(text: &str) -> Result<Config, ConfigError> {
        let doc: ConfigDocument =
            toml::from_str(text).map_err(|source| ConfigError::TomlParse {
                path: std::path::PathBuf::from("<string>"),
                source,
            })?;
        Self::from_document(doc)
    }

    /// Parse and validate a configuration document from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: ConfigDocument = toml::from_str(&text).map_err(|source| ConfigError::TomlParse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_document(doc)
    }

    fn from_document(doc: ConfigDocument) -> Result<Config, ConfigError> {
        for rule in &doc.symbol {
            if rule.minimum_liquidity < 0.0 {
                return Err(ConfigError::ValueOutOfRange {
                    field: format!("symbol.{}.minimum_liquidity", rule.symbol),
                    value: rule.minimum_liquidity.to_string(),
                    expected: "a non-negative number".to_string(),
                });
            }
        }

        let rules = RuleSet::new(doc.symbol.into_iter().map(|r| SymbolRule {
            symbol: r.symbol,
            minimum_liquidity: r.minimum_liquidity,
            price_deviation: r.price_deviation,
        }));

        Ok(Config {
            root: doc.root,
            rules,
            tuning: doc.tuning.into_tuning()?,
        })
    }
}

/// Atomic runtime-replaceable handle to the current configuration
/// snapshot. Readers obtain a consistent `Arc<Config>` with one lock
/// acquisition; a writer installs a whole new snapshot, never a partial
/// update (§6).
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn get(&self) -> Arc<Config> {
        Arc::clone(&self.current.read().expect("config lock poisoned"))
    }

    pub fn replace(&self, config: Config) {
        let mut guard = self.current.write().expect("config lock poisoned");
        *guard = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document_with_defaults() {
        let text = r#"
            root = "/var/lib/node"

            [[symbol]]
            symbol = "BTC"
            minimum_liquidity = 1000.0
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.root, std::path::PathBuf::from("/var/lib/node"));
        assert_eq!(config.tuning.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(
            config.rules.get("BTC").unwrap().minimum_liquidity,
            1000.0
        );
    }

    #[test]
    fn overrides_tuning_values() {
        let text = r#"
            root = "/var/lib/node"

            [tuning]
            batch_size = 50
            monitoring_cadence_ms = 5
        "#;
        let config = Config::from_toml_str(text).unwrap();
        assert_eq!(config.tuning.batch_size, 50);
        assert_eq!(config.tuning.monitoring_cadence_ms, 5);
        assert_eq!(config.tuning.max_flush_size, MAX_FLUSH_SIZE);
    }

    #[test]
    fn rejects_negative_minimum_liquidity() {
        let text = r#"
            root = "/var/lib/node"

            [[symbol]]
            symbol = "BTC"
            minimum_liquidity = -1.0
        "#;
        assert!(Config::from_toml_str(text).is_err());
    }

    #[test]
    fn rejects_zero_batch_size() {
        let text = r#"
            root = "/var/lib/node"

            [tuning]
            batch_size = 0
        "#;
        assert!(Config::from_toml_str(text).is_err());
    }

    #[test]
    fn handle_replace_is_visible_to_new_reads() {
        let first = Config::from_toml_str(r#"root = "/a""#).unwrap();
        let handle = ConfigHandle::new(first);
        assert_eq!(handle.get().root, std::path::PathBuf::from("/a"));

        let second = Config::from_toml_str(r#"root = "/b""#).unwrap();
        handle.replace(second);
        assert_eq!(handle.get().root, std::path::PathBuf::from("/b"));
    }
}
