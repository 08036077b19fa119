// ordertail - core/model.rs
//
// Core data types shared across the pipeline: the wire-level order event,
// the canonical in-memory Order, and the types the Reactive Search Engine
// and Subscriber Hub exchange.

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Which side of the book an order sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Map the single-letter wire code used by the log lines. Returns
    /// `None` for anything other than `B`/`A`.
    pub fn from_wire_code(code: &str) -> Option<Side> {
        match code {
            "B" => Some(Side::Bid),
            "A" => Some(Side::Ask),
            _ => None,
        }
    }
}

/// Canonical order lifecycle status, after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Open,
    Triggered,
    Filled,
    Canceled,
}

impl Status {
    /// Transition priority used when a batch contains conflicting status
    /// updates for the same order: higher wins. `canceled` and `filled`
    /// are both terminal; a batch asserting both is a conflict resolved
    /// in favor of `canceled` with a logged warning (see `core::store`).
    pub fn priority(self) -> u8 {
        match self {
            Status::Open => 0,
            Status::Triggered => 1,
            Status::Filled => 2,
            Status::Canceled => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Filled | Status::Canceled)
    }
}

/// Event as it appears on the wire, one per JSON line, flattened out of
/// the nested `{time, user, status, order: {oid, coin, side, limitPx,
/// origSz}}` grammar. Normalization into `Order` happens in
/// `core::parser`; this type carries the decoded-but-unvalidated fields.
#[derive(Debug, Clone)]
pub struct OrderEvent {
    pub oid: String,
    pub coin: String,
    pub side: String,
    pub limit_px: String,
    pub orig_sz: String,
    pub user: String,
    pub status: String,
    pub timestamp: String,
}

impl<'de> Deserialize<'de> for OrderEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawOrder {
            oid: serde_json::Value,
            coin: String,
            side: String,
            #[serde(rename = "limitPx")]
            limit_px: String,
            #[serde(rename = "origSz")]
            orig_sz: String,
        }

        #[derive(Deserialize)]
        struct RawLine {
            time: String,
            user: String,
            status: String,
            order: RawOrder,
        }

        let raw = RawLine::deserialize(deserializer)?;
        let oid = match raw.order.oid {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            _ => return Err(D::Error::custom("oid must be a string or number")),
        };

        Ok(OrderEvent {
            oid,
            coin: raw.order.coin,
            side: raw.order.side,
            limit_px: raw.order.limit_px,
            orig_sz: raw.order.orig_sz,
            user: raw.user,
            status: raw.status,
            timestamp: raw.time,
        })
    }
}

/// A normalized, canonical order as tracked by the Order Store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub owner: String,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
}

impl Order {
    /// Notional liquidity of this order, `price * size`, used both by the
    /// Symbol Filter's admission predicate and the search engine's
    /// best-match selection.
    pub fn liquidity(&self) -> f64 {
        self.price * self.size
    }
}

/// A caller-submitted request to locate a historical order in the tail.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub tolerance: f64,
}

/// An order promoted into live tracking by the search engine after a
/// match was found in `open` status. Monitored until it reaches a
/// terminal status or `maxTrackingAge` elapses.
#[derive(Debug, Clone)]
pub struct TrackedOrder {
    pub order: Order,
    pub tracked_since: DateTime<Utc>,
}

/// A change the Order Store or Search Engine hands to the Subscriber Hub.
/// Distinguishing the source lets the hub apply the right log level on
/// delivery failure and lets consumers tell a live update from a
/// search-originated one without inspecting the order itself.
#[derive(Debug, Clone)]
pub enum Update {
    Live(Order),
    Search(Order),
}

impl Update {
    pub fn order(&self) -> &Order {
        match self {
            Update::Live(o) | Update::Search(o) => o,
        }
    }
}

/// Progress/diagnostic events emitted by the Tail Reader as it runs. Not
/// part of the order data path; consumed by whatever surfaces operational
/// status (logs, an external metrics endpoint).
#[derive(Debug, Clone)]
pub enum TailEvent {
    /// A new target file was acquired; the cursor starts at the given
    /// byte offset (end-of-file at acquisition time; never a catch-up
    /// read of prior content).
    Acquired { path: PathBuf, offset: u64 },
    /// New lines were read and handed to the batch buffer.
    LinesRead { count: usize },
    /// The target file shrank below the last known offset; the cursor
    /// was reset to end-of-file rather than rewound.
    Truncated { path: PathBuf },
    /// The hourly directory produced a newer target and the tail moved
    /// to it.
    Rotated { from: PathBuf, to: PathBuf },
    /// A transient I/O error occurred and was retried.
    TransientError { message: String },
    /// The underlying device reported no space left; a housekeeping
    /// signal should be raised externally.
    DiskFull,
}
