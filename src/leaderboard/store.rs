//! Sorted-set storage behind the leaderboard.
//!
//! The leaderboard only needs a handful of operations from its store: a
//! score-ordered range read, a rank lookup, a cardinality, detail-hash reads
//! and one atomic write-if-better. [`LeaderboardStore`] is that surface;
//! [`MemoryStore`] implements it in process, the Redis store in
//! [`super::redis`].

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{EntryDetail, LeaderboardError, ScoreRecord};

/// Storage operations the leaderboard relies on. Keys are fully namespaced.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Backend name for logs.
    fn backend(&self) -> &'static str;

    /// Atomically store `record` when `member` has no score yet or `record`
    /// beats it. Returns whether anything was written.
    async fn submit_if_better(
        &self,
        board_key: &str,
        detail_key: &str,
        record: &ScoreRecord,
    ) -> Result<bool, LeaderboardError>;

    /// Number of members on the board.
    async fn count(&self, board_key: &str) -> Result<u64, LeaderboardError>;

    /// Members ranked `start..=stop` by descending score.
    async fn range_desc(
        &self,
        board_key: &str,
        start: u64,
        stop: u64,
    ) -> Result<Vec<String>, LeaderboardError>;

    /// Zero-based descending rank of `member`.
    async fn rank_desc(&self, board_key: &str, member: &str) -> Result<Option<u64>, LeaderboardError>;

    /// Detail hashes, index-aligned with `detail_keys`. Missing hashes read as zeroes.
    async fn details(&self, detail_keys: &[String]) -> Result<Vec<EntryDetail>, LeaderboardError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    /// board key -> member -> composite score
    boards: HashMap<String, HashMap<String, i64>>,
    details: HashMap<String, EntryDetail>,
}

/// In-process store for local runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Members sorted like `ZREVRANGE`: score descending, then member descending.
    fn sorted_members(state: &MemoryState, board_key: &str) -> Vec<(String, i64)> {
        let mut members: Vec<(String, i64)> = state
            .boards
            .get(board_key)
            .map(|b| b.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        members
    }
}

#[async_trait]
impl LeaderboardStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn submit_if_better(
        &self,
        board_key: &str,
        detail_key: &str,
        record: &ScoreRecord,
    ) -> Result<bool, LeaderboardError> {
        let mut state = self.state.write();
        let board = state.boards.entry(board_key.to_string()).or_default();
        if let Some(current) = board.get(&record.handle) {
            if *current >= record.composite {
                return Ok(false);
            }
        }
        board.insert(record.handle.clone(), record.composite);
        state
            .details
            .insert(detail_key.to_string(), record.detail());
        Ok(true)
    }

    async fn count(&self, board_key: &str) -> Result<u64, LeaderboardError> {
        let state = self.state.read();
        Ok(state.boards.get(board_key).map(|b| b.len() as u64).unwrap_or(0))
    }

    async fn range_desc(
        &self,
        board_key: &str,
        start: u64,
        stop: u64,
    ) -> Result<Vec<String>, LeaderboardError> {
        if stop < start {
            return Ok(Vec::new());
        }
        let state = self.state.read();
        Ok(Self::sorted_members(&state, board_key)
            .into_iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .map(|(member, _)| member)
            .collect())
    }

    async fn rank_desc(&self, board_key: &str, member: &str) -> Result<Option<u64>, LeaderboardError> {
        let state = self.state.read();
        Ok(Self::sorted_members(&state, board_key)
            .iter()
            .position(|(m, _)| m == member)
            .map(|i| i as u64))
    }

    async fn details(&self, detail_keys: &[String]) -> Result<Vec<EntryDetail>, LeaderboardError> {
        let state = self.state.read();
        Ok(detail_keys
            .iter()
            .map(|k| state.details.get(k).cloned().unwrap_or_default())
            .collect())
    }
}
