//! Anti-flood gate for spin triggers
//!
//! Two independent in-memory gates per (user, room): a minimum interval
//! between successive triggers and a rolling one-minute cap. Best effort only;
//! bet volume is bounded by the session cap, not here.

use crate::config::AntiFloodConfig;
use crate::types::{RoomId, UserId};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Answer of the anti-flood gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinGate {
    pub allowed: bool,
    pub wait_seconds: u64,
}

impl SpinGate {
    fn allow() -> Self {
        Self {
            allowed: true,
            wait_seconds: 0,
        }
    }

    fn deny(wait: Duration) -> Self {
        let millis = wait.as_millis() as u64;
        Self {
            allowed: false,
            wait_seconds: ((millis + 999) / 1_000).max(1),
        }
    }
}

#[derive(Debug)]
struct FloodEntry {
    last_trigger: Option<Instant>,
    recent: VecDeque<Instant>,
    last_seen: Instant,
}

impl FloodEntry {
    fn new(now: Instant) -> Self {
        Self {
            last_trigger: None,
            recent: VecDeque::new(),
            last_seen: now,
        }
    }
}

pub struct AntiFlood {
    config: AntiFloodConfig,
    entries: DashMap<(UserId, RoomId), FloodEntry>,
}

impl AntiFlood {
    pub fn new(config: AntiFloodConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    /// Check the gates and record the trigger when it passes
    pub fn can_spin(&self, user: UserId, room: RoomId) -> SpinGate {
        self.check_at(user, room, Instant::now())
    }

    pub fn check_at(&self, user: UserId, room: RoomId, now: Instant) -> SpinGate {
        let mut entry = self
            .entries
            .entry((user, room))
            .or_insert_with(|| FloodEntry::new(now));
        entry.last_seen = now;

        let gate = self.evaluate(&mut entry, now);
        if gate.allowed {
            entry.last_trigger = Some(now);
            entry.recent.push_back(now);
        } else {
            debug!(user = %user, room = %room, wait_seconds = gate.wait_seconds, "Spin trigger throttled");
        }
        gate
    }

    /// Same answer as `can_spin` without recording anything
    pub fn status(&self, user: UserId, room: RoomId) -> SpinGate {
        self.status_at(user, room, Instant::now())
    }

    pub fn status_at(&self, user: UserId, room: RoomId, now: Instant) -> SpinGate {
        match self.entries.get_mut(&(user, room)) {
            Some(mut entry) => self.evaluate(&mut entry, now),
            None => SpinGate::allow(),
        }
    }

    fn evaluate(&self, entry: &mut FloodEntry, now: Instant) -> SpinGate {
        let min_interval = self.config.min_interval();
        if let Some(last) = entry.last_trigger {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < min_interval {
                return SpinGate::deny(min_interval - elapsed);
            }
        }

        entry
            .recent
            .retain(|t| now.saturating_duration_since(*t) < WINDOW);

        let cap = self.config.max_spins_per_minute as usize;
        if cap > 0 && entry.recent.len() >= cap {
            let oldest = entry.recent.front().copied().unwrap_or(now);
            return SpinGate::deny(WINDOW.saturating_sub(now.saturating_duration_since(oldest)));
        }

        SpinGate::allow()
    }

    /// Drop entries untouched for longer than `horizon`
    pub fn evict_stale(&self, horizon: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < horizon);
        before.saturating_sub(self.entries.len())
    }

    pub fn tracked_entries(&self) -> usize {
        self.entries.len()
    }

    /// Periodically evict stale entries
    pub fn start_cleanup_task(limiter: Arc<AntiFlood>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = limiter.config.cleanup_interval();
            let horizon = limiter.config.eviction_horizon();
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                let evicted = limiter.evict_stale(horizon, Instant::now());
                if evicted > 0 {
                    debug!(evicted, "Evicted stale anti-flood entries");
                }
            }
        })
    }
}
