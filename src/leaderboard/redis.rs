//! Redis-backed leaderboard store.
//!
//! The board is a sorted set (member = handle, score = composite) and each
//! handle has a detail hash. The conditional write runs as a Lua script so a
//! concurrent submission can never overwrite a better score.

use std::future::Future;
use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, RedisError, RedisResult, Script};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::store::LeaderboardStore;
use super::{EntryDetail, LeaderboardError, ScoreRecord};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// KEYS[1] board, KEYS[2] detail hash.
/// ARGV: member, composite, score, timeMs, updatedAt.
const SUBMIT_IF_BETTER: &str = r#"
local current = redis.call('ZSCORE', KEYS[1], ARGV[1])
if current and tonumber(current) >= tonumber(ARGV[2]) then
  return 0
end
redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
redis.call('HSET', KEYS[2], 'score', ARGV[3], 'timeMs', ARGV[4], 'updatedAt', ARGV[5])
return 1
"#;

/// The cached connection and a counter bumped on every (re)connect.
#[derive(Default)]
struct ConnSlot {
    generation: u64,
    current: Option<MultiplexedConnection>,
}

/// Store on a shared Redis. Connects on first use and shares one multiplexed
/// connection; a dropped connection is discarded and replaced on the next call.
pub struct RedisStore {
    client: Client,
    slot: Mutex<ConnSlot>,
    submit_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connected = self
            .slot
            .try_lock()
            .map(|slot| slot.current.is_some())
            .unwrap_or(true);
        f.debug_struct("RedisStore")
            .field("connected", &connected)
            .finish_non_exhaustive()
    }
}

/// Errors after which the multiplexed connection is unusable.
fn is_broken(e: &RedisError) -> bool {
    e.is_connection_dropped() || e.is_io_error() || e.is_connection_refusal()
}

impl RedisStore {
    /// Validate `url` without connecting. `rediss://` enables TLS.
    pub fn open(url: &str) -> Result<Self, LeaderboardError> {
        let client = Client::open(url)
            .map_err(|e| LeaderboardError::Connection(format!("invalid Redis URL: {e}")))?;
        Ok(Self {
            client,
            slot: Mutex::new(ConnSlot::default()),
            submit_script: Script::new(SUBMIT_IF_BETTER),
        })
    }

    async fn connection(&self) -> Result<(u64, MultiplexedConnection), LeaderboardError> {
        let mut slot = self.slot.lock().await;
        if let Some(conn) = &slot.current {
            return Ok((slot.generation, conn.clone()));
        }

        let conn = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| LeaderboardError::Connection("connect timed out".to_string()))??;
        slot.generation += 1;
        slot.current = Some(conn.clone());
        info!(generation = slot.generation, "connected to Redis");
        Ok((slot.generation, conn))
    }

    /// Forget the connection of `generation` unless it was already replaced.
    async fn invalidate(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.generation == generation {
            slot.current = None;
        }
    }

    /// Run `op` on the shared connection. When the connection turns out to be
    /// dead it is dropped; `idempotent` operations are then retried once on a
    /// fresh one.
    async fn run<T, F, Fut>(&self, idempotent: bool, op: F) -> Result<T, LeaderboardError>
    where
        F: Fn(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let (generation, conn) = self.connection().await?;
        match op(conn).await {
            Ok(value) => Ok(value),
            Err(e) if is_broken(&e) => {
                warn!(error = %e, "Redis connection lost, reconnecting");
                self.invalidate(generation).await;
                if !idempotent {
                    return Err(e.into());
                }
                let (_, conn) = self.connection().await?;
                Ok(op(conn).await?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn parse_field(raw: Option<String>) -> u64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .map(|n| n.floor().max(0.0) as u64)
        .unwrap_or(0)
}

#[async_trait]
impl LeaderboardStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn submit_if_better(
        &self,
        board_key: &str,
        detail_key: &str,
        record: &ScoreRecord,
    ) -> Result<bool, LeaderboardError> {
        let script = &self.submit_script;
        // Not retried: the first attempt may have been applied.
        let written: i64 = self
            .run(false, move |mut conn| async move {
                script
                    .key(board_key)
                    .key(detail_key)
                    .arg(&record.handle)
                    .arg(record.composite)
                    .arg(record.score)
                    .arg(record.time_ms)
                    .arg(record.updated_at)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(written == 1)
    }

    async fn count(&self, board_key: &str) -> Result<u64, LeaderboardError> {
        let total: u64 = self
            .run(true, move |mut conn| async move { conn.zcard(board_key).await })
            .await?;
        Ok(total)
    }

    async fn range_desc(
        &self,
        board_key: &str,
        start: u64,
        stop: u64,
    ) -> Result<Vec<String>, LeaderboardError> {
        let start = isize::try_from(start).unwrap_or(isize::MAX);
        let stop = isize::try_from(stop).unwrap_or(isize::MAX);
        let members: Vec<String> = self
            .run(true, move |mut conn| async move {
                conn.zrevrange(board_key, start, stop).await
            })
            .await?;
        Ok(members)
    }

    async fn rank_desc(&self, board_key: &str, member: &str) -> Result<Option<u64>, LeaderboardError> {
        let rank: Option<u64> = self
            .run(true, move |mut conn| async move {
                conn.zrevrank(board_key, member).await
            })
            .await?;
        Ok(rank)
    }

    async fn details(&self, detail_keys: &[String]) -> Result<Vec<EntryDetail>, LeaderboardError> {
        let mut pipe = ::redis::pipe();
        for key in detail_keys {
            pipe.cmd("HMGET")
                .arg(key)
                .arg("score")
                .arg("timeMs")
                .arg("updatedAt");
        }
        let pipe = &pipe;
        let rows: Vec<(Option<String>, Option<String>, Option<String>)> = self
            .run(true, move |mut conn| async move { pipe.query_async(&mut conn).await })
            .await?;
        Ok(rows
            .into_iter()
            .map(|(score, time_ms, updated_at)| EntryDetail {
                score: parse_field(score),
                time_ms: parse_field(time_ms),
                updated_at: parse_field(updated_at),
            })
            .collect())
    }
}
