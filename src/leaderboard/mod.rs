//! Race leaderboard
//!
//! Keeps each handle's best run in a sorted set keyed by a composite score
//! (higher score first, faster time breaking ties) plus a per-handle detail
//! hash. Two stores implement [`LeaderboardStore`]:
//!
//! - [`MemoryStore`]: process-local, used when no Redis URL is configured
//! - [`RedisStore`]: shared, survives restarts
//!
//! [`Leaderboard`] owns the namespacing and the request-level rules: payload
//! validation, paging bounds and rank lookup.

pub mod config;
pub mod redis;
pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::avatar::handle::Handle;

pub use self::config::{LeaderboardConfig, DEFAULT_NAMESPACE};
pub use self::redis::RedisStore;
pub use self::store::{LeaderboardStore, MemoryStore};

/// Weight of the score component; keeps any realistic `timeMs` from
/// overtaking a whole point of score.
pub const SCORE_WEIGHT: i64 = 1_000_000_000;

/// Default page size for reads.
pub const DEFAULT_PAGE_COUNT: u64 = 50;

/// Largest page a single read may request.
pub const MAX_PAGE_COUNT: u64 = 200;

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("Invalid payload")]
    InvalidPayload,

    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Store(String),
}

impl From<::redis::RedisError> for LeaderboardError {
    fn from(e: ::redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            LeaderboardError::Connection(e.to_string())
        } else {
            LeaderboardError::Store(e.to_string())
        }
    }
}

/// `floor(score) * 1e9 - floor(time_ms)`, saturating at the `i64` bounds.
pub fn composite_score(score: u64, time_ms: u64) -> i64 {
    let score = i64::try_from(score).unwrap_or(i64::MAX);
    let time_ms = i64::try_from(time_ms).unwrap_or(i64::MAX);
    score.saturating_mul(SCORE_WEIGHT).saturating_sub(time_ms)
}

/// Stored detail hash for one handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDetail {
    pub score: u64,
    pub time_ms: u64,
    pub updated_at: u64,
}

/// A validated submission ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRecord {
    pub handle: String,
    pub score: u64,
    pub time_ms: u64,
    pub composite: i64,
    /// Milliseconds since the Unix epoch.
    pub updated_at: u64,
}

impl ScoreRecord {
    pub fn new(handle: Handle, score: u64, time_ms: u64, updated_at: u64) -> Self {
        Self {
            composite: composite_score(score, time_ms),
            handle: handle.into_string(),
            score,
            time_ms,
            updated_at,
        }
    }

    /// Parse a submission body.
    ///
    /// `score` and `timeMs` may be JSON numbers or numeric strings; both are
    /// floored and clamped at zero. The handle is normalized and must not end
    /// up empty.
    pub fn from_json(body: &[u8], updated_at: u64) -> Result<Self, LeaderboardError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| LeaderboardError::InvalidPayload)?;
        let obj = value.as_object().ok_or(LeaderboardError::InvalidPayload)?;

        let handle = match obj.get("handle") {
            Some(Value::String(s)) => Handle::normalize(s),
            Some(Value::Number(n)) => Handle::normalize(&n.to_string()),
            _ => return Err(LeaderboardError::InvalidPayload),
        };
        if handle.is_empty() {
            return Err(LeaderboardError::InvalidPayload);
        }

        let score = obj
            .get("score")
            .and_then(coerce_count)
            .ok_or(LeaderboardError::InvalidPayload)?;
        let time_ms = obj
            .get("timeMs")
            .and_then(coerce_count)
            .ok_or(LeaderboardError::InvalidPayload)?;

        Ok(Self::new(handle, score, time_ms, updated_at))
    }

    pub fn detail(&self) -> EntryDetail {
        EntryDetail {
            score: self.score,
            time_ms: self.time_ms,
            updated_at: self.updated_at,
        }
    }
}

/// Finite number or numeric string, floored and clamped to `0..`.
fn coerce_count(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                0.0
            } else {
                s.parse::<f64>().ok()?
            }
        }
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    // Float-to-int `as` saturates.
    Some(n.floor().max(0.0) as u64)
}

/// Paging parameters for a read, already clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub start: u64,
    pub count: u64,
    pub rank_for: Option<Handle>,
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            start: 0,
            count: DEFAULT_PAGE_COUNT,
            rank_for: None,
        }
    }
}

impl PageQuery {
    /// Build from raw query values. Unparsable numbers fall back to defaults.
    pub fn from_raw(start: Option<&str>, count: Option<&str>, rank_for: Option<&str>) -> Self {
        let start = start
            .and_then(parse_leading_int)
            .map(|n| n.max(0) as u64)
            .unwrap_or(0);
        let count = count
            .and_then(parse_leading_int)
            .map(|n| n.clamp(1, MAX_PAGE_COUNT as i64) as u64)
            .unwrap_or(DEFAULT_PAGE_COUNT);
        let rank_for = rank_for
            .map(Handle::normalize)
            .filter(|h| !h.is_empty());
        Self {
            start,
            count,
            rank_for,
        }
    }
}

/// Leading optional sign and digits, like a lenient integer parse (`"12abc"` → 12).
fn parse_leading_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    // Overlong digit runs saturate rather than fall back.
    let n = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(sign * n)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardItem {
    pub handle: String,
    pub score: u64,
    pub time_ms: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardPage {
    pub items: Vec<LeaderboardItem>,
    pub start: u64,
    pub count: u64,
    pub total: u64,
    /// 1-based rank of the requested handle.
    pub rank: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub updated: bool,
}

/// Namespaced leaderboard over a store.
#[derive(Clone)]
pub struct Leaderboard {
    store: Arc<dyn LeaderboardStore>,
    namespace: String,
}

impl std::fmt::Debug for Leaderboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leaderboard")
            .field("backend", &self.store.backend())
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl Leaderboard {
    pub fn new(store: Arc<dyn LeaderboardStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Pick the store the configuration asks for.
    pub fn from_config(config: &LeaderboardConfig) -> Result<Self, LeaderboardError> {
        let store: Arc<dyn LeaderboardStore> = match config.redis_url.as_deref() {
            Some(url) => Arc::new(RedisStore::open(url)?),
            None => {
                warn!("no Redis URL configured, leaderboard is kept in memory and lost on restart");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::new(store, config.effective_namespace()))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn board_key(&self) -> String {
        format!("{}:board", self.namespace)
    }

    pub fn detail_key(&self, handle: &str) -> String {
        format!("{}:detail:{}", self.namespace, handle)
    }

    /// Store `record` if it beats the handle's current best.
    pub async fn submit(&self, record: &ScoreRecord) -> Result<SubmitOutcome, LeaderboardError> {
        let updated = self
            .store
            .submit_if_better(&self.board_key(), &self.detail_key(&record.handle), record)
            .await?;
        debug!(
            handle = %record.handle,
            composite = record.composite,
            updated,
            "score submitted"
        );
        Ok(SubmitOutcome { updated })
    }

    /// One page of the board, best first.
    pub async fn page(&self, query: &PageQuery) -> Result<LeaderboardPage, LeaderboardError> {
        let board = self.board_key();
        let stop = query
            .start
            .saturating_add(query.count.max(1) - 1);

        let handles = self.store.range_desc(&board, query.start, stop).await?;
        let total = self.store.count(&board).await?;
        let rank = match &query.rank_for {
            Some(handle) => self
                .store
                .rank_desc(&board, handle.as_str())
                .await?
                .map(|r| r + 1),
            None => None,
        };

        let detail_keys: Vec<String> = handles.iter().map(|h| self.detail_key(h)).collect();
        let details = if detail_keys.is_empty() {
            Vec::new()
        } else {
            self.store.details(&detail_keys).await?
        };

        let items = handles
            .into_iter()
            .zip(details.into_iter().chain(std::iter::repeat(EntryDetail::default())))
            .map(|(handle, d)| LeaderboardItem {
                handle,
                score: d.score,
                time_ms: d.time_ms,
                updated_at: d.updated_at,
            })
            .collect();

        Ok(LeaderboardPage {
            items,
            start: query.start,
            count: query.count,
            total,
            rank,
        })
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
