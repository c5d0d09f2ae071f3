//! Append-only outcome history per room
//!
//! Used for the "last results" display and to audit the anti-streak rule.

use crate::errors::StorageError;
use crate::roulette::outcome::longest_color_run;
use crate::roulette::SpinOutcome;
use crate::storage::{KvBatch, KvStore};
use crate::types::RoomId;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

const GAME_LOG_PREFIX: &str = "gamelog:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameLogEntry {
    pub spin_id: String,
    pub room: RoomId,
    pub outcome: SpinOutcome,
    pub recorded_at: u64,
}

#[async_trait]
pub trait GameLog: Send + Sync {
    async fn append(&self, entry: GameLogEntry) -> Result<(), StorageError>;

    /// Newest first, at most `limit` entries
    async fn recent(&self, room: RoomId, limit: usize) -> Result<Vec<GameLogEntry>, StorageError>;
}

/// Longest same-color run in a slice of log entries
pub fn longest_color_streak(entries: &[GameLogEntry]) -> usize {
    longest_color_run(entries.iter().map(|e| e.outcome.color))
}

/// Ring buffer per room
pub struct InMemoryGameLog {
    capacity: usize,
    rooms: DashMap<RoomId, VecDeque<GameLogEntry>>,
}

impl InMemoryGameLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: DashMap::new(),
        }
    }
}

#[async_trait]
impl GameLog for InMemoryGameLog {
    async fn append(&self, entry: GameLogEntry) -> Result<(), StorageError> {
        let mut history = self.rooms.entry(entry.room).or_default();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(entry);
        Ok(())
    }

    async fn recent(&self, room: RoomId, limit: usize) -> Result<Vec<GameLogEntry>, StorageError> {
        Ok(self
            .rooms
            .get(&room)
            .map(|history| history.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

/// RocksDB log keyed newest-first: prefix | room | inverted time | inverted sequence
pub struct RocksGameLog {
    store: KvStore,
    sequence: AtomicU64,
}

impl RocksGameLog {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            sequence: AtomicU64::new(0),
        }
    }

    fn room_prefix(room: RoomId) -> Vec<u8> {
        format!("{}{}:", GAME_LOG_PREFIX, room.0).into_bytes()
    }

    fn entry_key(room: RoomId, recorded_at: u64, sequence: u64) -> Vec<u8> {
        let mut key = Self::room_prefix(room);
        key.extend_from_slice(&(u64::MAX - recorded_at).to_be_bytes());
        key.extend_from_slice(&(u64::MAX - sequence).to_be_bytes());
        key
    }
}

#[async_trait]
impl GameLog for RocksGameLog {
    async fn append(&self, entry: GameLogEntry) -> Result<(), StorageError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let key = Self::entry_key(entry.room, entry.recorded_at, sequence);

        let mut batch = KvBatch::new();
        batch.put_json(&key, &entry)?;
        self.store.write(batch)
    }

    async fn recent(&self, room: RoomId, limit: usize) -> Result<Vec<GameLogEntry>, StorageError> {
        self.store
            .scan_prefix(&Self::room_prefix(room), limit)?
            .into_iter()
            .map(|(_, value)| serde_json::from_slice(&value).map_err(StorageError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(room: i64, number: u8, recorded_at: u64) -> GameLogEntry {
        GameLogEntry {
            spin_id: format!("spin-{}-{}", room, recorded_at),
            room: RoomId(room),
            outcome: SpinOutcome::new(number),
            recorded_at,
        }
    }

    #[tokio::test]
    async fn test_in_memory_ring() {
        let log = InMemoryGameLog::new(3);
        for (i, n) in [1u8, 2, 3, 4].into_iter().enumerate() {
            log.append(entry(1, n, i as u64)).await.unwrap();
        }

        let recent = log.recent(RoomId(1), 10).await.unwrap();
        let numbers: Vec<u8> = recent.iter().map(|e| e.outcome.number).collect();
        assert_eq!(numbers, vec![4, 3, 2]);
        assert!(log.recent(RoomId(2), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rocks_newest_first_and_room_isolation() {
        let dir = tempfile::tempdir().unwrap();
        let log = RocksGameLog::new(KvStore::open(dir.path()).unwrap());

        log.append(entry(-100, 5, 1_000)).await.unwrap();
        log.append(entry(-100, 6, 2_000)).await.unwrap();
        log.append(entry(-100, 7, 2_000)).await.unwrap();
        log.append(entry(-1000, 0, 3_000)).await.unwrap();

        let recent = log.recent(RoomId(-100), 50).await.unwrap();
        let numbers: Vec<u8> = recent.iter().map(|e| e.outcome.number).collect();
        assert_eq!(numbers, vec![7, 6, 5]);

        assert_eq!(log.recent(RoomId(-100), 2).await.unwrap().len(), 2);
        assert_eq!(log.recent(RoomId(-1000), 50).await.unwrap().len(), 1);
    }

    #[test]
    fn test_longest_color_streak() {
        let entries = vec![entry(1, 1, 0), entry(1, 3, 1), entry(1, 2, 2), entry(1, 0, 3)];
        assert_eq!(longest_color_streak(&entries), 2);
    }
}
