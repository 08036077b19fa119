// ordertail - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; every error preserves its causal chain
// for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all ordertail operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum OrderTailError {
    /// The File Locator failed to resolve a tail target.
    Locator(LocatorError),

    /// The Order Store rejected an operation.
    Store(StoreError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// The Reactive Search Engine hit an unrecoverable condition.
    Search(SearchError),

    /// I/O error with path context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for OrderTailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locator(e) => write!(f, "locator error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Search(e) => write!(f, "search error: {e}"),
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for OrderTailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Locator(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Search(e) => Some(e),
            Self::Io { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Locator errors
// ---------------------------------------------------------------------------

/// Errors related to resolving the current tail target under the root.
#[derive(Debug)]
pub enum LocatorError {
    /// The configured root directory does not exist or is not accessible.
    RootNotFound { path: PathBuf },

    /// The root path exists but is not a directory.
    NotADirectory { path: PathBuf },

    /// Permission denied while listing a directory.
    PermissionDenied { path: PathBuf, source: io::Error },
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "root '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "root '{}' is not a directory", path.display())
            }
            Self::PermissionDenied { path, source } => write!(
                f,
                "permission denied listing '{}': {source}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for LocatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PermissionDenied { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<LocatorError> for OrderTailError {
    fn from(e: LocatorError) -> Self {
        Self::Locator(e)
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors related to Order Store invariant violations. These indicate a bug
/// in an upstream component rather than a recoverable condition, and are
/// logged at error level rather than absorbed.
#[derive(Debug)]
pub enum StoreError {
    /// A batch referenced an order id with an empty event list.
    EmptyEventGroup { id: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyEventGroup { id } => {
                write!(f, "batch contained an empty event group for order '{id}'")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for OrderTailError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading and validation.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading the config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "config '{field}' = '{value}' is out of range, expected {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for OrderTailError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Search errors
// ---------------------------------------------------------------------------

/// Errors related to the reactive search engine's backward scan.
#[derive(Debug)]
pub enum SearchError {
    /// Memory-mapping the target file failed.
    Mmap { path: PathBuf, source: io::Error },
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mmap { path, source } => {
                write!(f, "failed to map '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Mmap { source, .. } => Some(source),
        }
    }
}

impl From<SearchError> for OrderTailError {
    fn from(e: SearchError) -> Self {
        Self::Search(e)
    }
}

/// Per-line skip reason produced by the Line Parser. Not an `Error` impl:
/// a rejected line is an expected, routine outcome, not a failure the
/// pipeline needs to propagate. See `core::parser`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSkipReason {
    /// The fast pre-filter rejected the line before JSON decode was attempted.
    PreFiltered,
    /// The line was not valid JSON.
    InvalidJson,
    /// A required field was missing or of the wrong type.
    MissingField(&'static str),
    /// The side code was neither `B` nor `A`.
    UnknownSide(String),
    /// `limitPx` was not a positive number.
    NonPositivePrice,
    /// `origSz` was negative.
    NegativeSize,
    /// The timestamp could not be parsed as ISO-8601 UTC.
    InvalidTimestamp(String),
    /// The status is on the documented rejection list.
    RejectedStatus(String),
}

impl fmt::Display for LineSkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreFiltered => write!(f, "pre-filtered"),
            Self::InvalidJson => write!(f, "invalid JSON"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::UnknownSide(s) => write!(f, "unknown side code '{s}'"),
            Self::NonPositivePrice => write!(f, "limitPx is not positive"),
            Self::NegativeSize => write!(f, "origSz is negative"),
            Self::InvalidTimestamp(raw) => write!(f, "invalid timestamp '{raw}'"),
            Self::RejectedStatus(s) => write!(f, "rejected status '{s}'"),
        }
    }
}

/// Convenience type alias for ordertail results.
pub type Result<T> = std::result::Result<T, OrderTailError>;
