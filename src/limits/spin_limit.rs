//! Daily spin quota per (user, room)
//!
//! Counters are durable and keyed by calendar date. A spin is only counted
//! once it has actually been settled. Users holding the unlimited entitlement
//! skip both the check and the counting.

use crate::config::SpinLimitConfig;
use crate::errors::StorageError;
use crate::storage::{KvBatch, KvStore};
use crate::types::{RoomId, UserId};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

const SPIN_COUNT_PREFIX: &str = "spinlimit:";
const UNLIMITED_PREFIX: &str = "entitlement:unlimited:";

/// Persistence for spin counters and the unlimited entitlement
#[async_trait]
pub trait SpinLimitStore: Send + Sync {
    async fn count(&self, user: UserId, room: RoomId, date: NaiveDate) -> Result<u32, StorageError>;

    /// Increment and return the new count
    async fn increment(&self, user: UserId, room: RoomId, date: NaiveDate) -> Result<u32, StorageError>;

    async fn is_unlimited(&self, user: UserId) -> Result<bool, StorageError>;

    async fn set_unlimited(&self, user: UserId, unlimited: bool) -> Result<(), StorageError>;

    /// Remove counters dated before `cutoff`; returns how many were removed
    async fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, StorageError>;
}

/// Answer of the daily quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinAllowance {
    pub allowed: bool,
    pub used: u32,
    /// `None` when the user is not limited
    pub remaining: Option<u32>,
}

impl SpinAllowance {
    fn unlimited(used: u32) -> Self {
        Self {
            allowed: true,
            used,
            remaining: None,
        }
    }
}

pub struct SpinLimiter {
    store: Arc<dyn SpinLimitStore>,
    config: SpinLimitConfig,
}

impl SpinLimiter {
    pub fn new(store: Arc<dyn SpinLimitStore>, config: SpinLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn daily_limit(&self) -> u32 {
        self.config.daily_limit
    }

    pub fn store(&self) -> &Arc<dyn SpinLimitStore> {
        &self.store
    }

    pub async fn can_spin(&self, user: UserId, room: RoomId, today: NaiveDate) -> Result<SpinAllowance, StorageError> {
        let used = self.store.count(user, room, today).await?;
        if self.config.daily_limit == 0 || self.store.is_unlimited(user).await? {
            return Ok(SpinAllowance::unlimited(used));
        }

        let remaining = self.config.daily_limit.saturating_sub(used);
        Ok(SpinAllowance {
            allowed: remaining > 0,
            used,
            remaining: Some(remaining),
        })
    }

    pub async fn record_spin(&self, user: UserId, room: RoomId, today: NaiveDate) -> Result<(), StorageError> {
        if self.config.daily_limit == 0 || self.store.is_unlimited(user).await? {
            return Ok(());
        }
        self.store.increment(user, room, today).await?;
        Ok(())
    }

    /// Drop counters that fell out of the retention window
    pub async fn purge_expired(&self, today: NaiveDate) -> Result<usize, StorageError> {
        let cutoff = today - ChronoDuration::days(i64::from(self.config.retention_days));
        self.store.purge_before(cutoff).await
    }

    pub fn start_purge_task(limiter: Arc<SpinLimiter>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = limiter.config.purge_interval();
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                match limiter.purge_expired(Utc::now().date_naive()).await {
                    Ok(0) => {}
                    Ok(purged) => info!(purged, "Purged expired spin limit records"),
                    Err(e) => error!(error = %e, "Spin limit purge failed"),
                }
            }
        })
    }
}

#[derive(Default)]
pub struct InMemorySpinLimitStore {
    counts: DashMap<(UserId, RoomId, NaiveDate), u32>,
    unlimited: DashSet<UserId>,
}

impl InMemorySpinLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SpinLimitStore for InMemorySpinLimitStore {
    async fn count(&self, user: UserId, room: RoomId, date: NaiveDate) -> Result<u32, StorageError> {
        Ok(self.counts.get(&(user, room, date)).map(|c| *c).unwrap_or(0))
    }

    async fn increment(&self, user: UserId, room: RoomId, date: NaiveDate) -> Result<u32, StorageError> {
        let mut count = self.counts.entry((user, room, date)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn is_unlimited(&self, user: UserId) -> Result<bool, StorageError> {
        Ok(self.unlimited.contains(&user))
    }

    async fn set_unlimited(&self, user: UserId, unlimited: bool) -> Result<(), StorageError> {
        if unlimited {
            self.unlimited.insert(user);
        } else {
            self.unlimited.remove(&user);
        }
        Ok(())
    }

    async fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, StorageError> {
        let before = self.counts.len();
        self.counts.retain(|(_, _, date), _| *date >= cutoff);
        Ok(before.saturating_sub(self.counts.len()))
    }
}

/// Counters keyed `spinlimit:<date>:<room>:<user>` so purging is a range scan
pub struct RocksSpinLimitStore {
    store: KvStore,
    write_lock: Mutex<()>,
}

impl RocksSpinLimitStore {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn count_key(user: UserId, room: RoomId, date: NaiveDate) -> Vec<u8> {
        format!("{}{}:{}:{}", SPIN_COUNT_PREFIX, date.format("%Y-%m-%d"), room.0, user.0).into_bytes()
    }

    fn unlimited_key(user: UserId) -> Vec<u8> {
        format!("{}{}", UNLIMITED_PREFIX, user.0).into_bytes()
    }

    fn read_count(&self, key: &[u8]) -> Result<u32, StorageError> {
        Ok(self.store.get_json::<u32>(key)?.unwrap_or(0))
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
        self.write_lock
            .lock()
            .map_err(|_| StorageError::WriteFailed("spin limit lock poisoned".to_string()))
    }
}

#[async_trait]
impl SpinLimitStore for RocksSpinLimitStore {
    async fn count(&self, user: UserId, room: RoomId, date: NaiveDate) -> Result<u32, StorageError> {
        self.read_count(&Self::count_key(user, room, date))
    }

    async fn increment(&self, user: UserId, room: RoomId, date: NaiveDate) -> Result<u32, StorageError> {
        let _guard = self.guard()?;
        let key = Self::count_key(user, room, date);
        let count = self.read_count(&key)? + 1;

        let mut batch = KvBatch::new();
        batch.put_json(&key, &count)?;
        self.store.write(batch)?;
        Ok(count)
    }

    async fn is_unlimited(&self, user: UserId) -> Result<bool, StorageError> {
        Ok(self.store.get(&Self::unlimited_key(user))?.is_some())
    }

    async fn set_unlimited(&self, user: UserId, unlimited: bool) -> Result<(), StorageError> {
        let mut batch = KvBatch::new();
        if unlimited {
            batch.put(&Self::unlimited_key(user), b"1");
        } else {
            batch.delete(&Self::unlimited_key(user));
        }
        self.store.write(batch)
    }

    async fn purge_before(&self, cutoff: NaiveDate) -> Result<usize, StorageError> {
        let _guard = self.guard()?;
        let end = format!("{}{}", SPIN_COUNT_PREFIX, cutoff.format("%Y-%m-%d")).into_bytes();
        let expired = self.store.keys_before(SPIN_COUNT_PREFIX.as_bytes(), &end)?;
        if expired.is_empty() {
            return Ok(0);
        }

        let mut batch = KvBatch::new();
        for key in &expired {
            batch.delete(key);
        }
        self.store.write(batch)?;
        Ok(expired.len())
    }
}
