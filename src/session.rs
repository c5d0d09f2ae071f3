//! Per-room bet aggregation and the spin lock
//!
//! Each room owns its pending bets (one `UserBetSession` per user), a cache of
//! every user's last settled bets for "repeat", and its own outcome generator.
//! The generator sits inside the spin lock, so only the holder of a
//! `SpinGuard` can draw an outcome for the room. Empty user sessions are
//! pruned after each spin and stale repeat entries by the GC pass.

use crate::config::SessionConfig;
use crate::errors::EngineError;
use crate::roulette::{Bet, Color, SpinOutcome, Wheel};
use crate::types::{now_millis, Coins, RoomId, UserId};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Builds the outcome generator of a newly created room
pub type WheelFactory = Arc<dyn Fn(RoomId) -> Box<dyn Wheel> + Send + Sync>;

/// Pending bets of one user in one room
#[derive(Debug, Clone, Default)]
pub struct UserBetSession {
    bets: Vec<Bet>,
    total_amount: Coins,
}

impl UserBetSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bet, merging it into an existing bet on the same target
    pub fn add(&mut self, bet: Bet) {
        self.total_amount += bet.amount;
        match self.bets.iter_mut().find(|b| b.target == bet.target) {
            Some(existing) => existing.amount += bet.amount,
            None => self.bets.push(bet),
        }
    }

    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    pub fn total_amount(&self) -> Coins {
        self.total_amount
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Remove and return every pending bet
    pub fn take(&mut self) -> Vec<Bet> {
        self.total_amount = 0;
        std::mem::take(&mut self.bets)
    }

    /// Put previously taken bets back ahead of anything placed since
    pub fn restore(&mut self, earlier: Vec<Bet>) {
        let newer = self.take();
        for bet in earlier.into_iter().chain(newer) {
            self.add(bet);
        }
    }
}

/// Exclusive right to spin a room; released on drop
///
/// The guard owns its room, so a settlement task can carry it past the
/// caller that started the spin.
pub struct SpinGuard {
    wheel: OwnedMutexGuard<Box<dyn Wheel>>,
    room: Arc<RoomSession>,
}

impl SpinGuard {
    pub fn room(&self) -> &Arc<RoomSession> {
        &self.room
    }

    /// True until the wheel has been seeded from the persisted outcomes
    pub fn needs_history(&self) -> bool {
        !self.room.primed.load(Ordering::Acquire)
    }

    pub fn prime(&mut self, history: &[Color]) {
        self.wheel.prime(history);
        self.room.primed.store(true, Ordering::Release);
    }

    pub fn draw(&mut self) -> SpinOutcome {
        self.wheel.spin()
    }
}

impl Drop for SpinGuard {
    fn drop(&mut self) {
        self.room.spinning.store(false, Ordering::Release);
    }
}

/// Last settled bets of one user, kept for "repeat"
#[derive(Debug, Clone)]
struct RepeatEntry {
    bets: Vec<Bet>,
    settled_at: u64,
}

pub struct RoomSession {
    room: RoomId,
    users: DashMap<UserId, Arc<Mutex<UserBetSession>>>,
    last_bets: DashMap<UserId, RepeatEntry>,
    wheel: Arc<Mutex<Box<dyn Wheel>>>,
    spinning: AtomicBool,
    primed: AtomicBool,
    last_activity: AtomicU64,
}

impl RoomSession {
    pub fn new(room: RoomId, wheel: Box<dyn Wheel>) -> Self {
        Self {
            room,
            users: DashMap::new(),
            last_bets: DashMap::new(),
            wheel: Arc::new(Mutex::new(wheel)),
            spinning: AtomicBool::new(false),
            primed: AtomicBool::new(false),
            last_activity: AtomicU64::new(now_millis()),
        }
    }

    pub fn room(&self) -> RoomId {
        self.room
    }

    /// Session of `user`, created on first use
    pub fn user_session(&self, user: UserId) -> Arc<Mutex<UserBetSession>> {
        self.users.entry(user).or_default().clone()
    }

    /// Session of `user` if one exists; never creates
    pub fn existing_session(&self, user: UserId) -> Option<Arc<Mutex<UserBetSession>>> {
        self.users.get(&user).map(|session| session.clone())
    }

    pub fn session_count(&self) -> usize {
        self.users.len()
    }

    fn sessions(&self) -> Vec<(UserId, Arc<Mutex<UserBetSession>>)> {
        self.users
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Drop empty sessions nobody else holds; returns how many went
    pub fn prune_empty_sessions(&self) -> usize {
        let mut pruned = 0;
        self.users.retain(|_, session| {
            // A clone outside the map may be about to add bets
            if Arc::strong_count(session) > 1 {
                return true;
            }
            let empty = matches!(session.try_lock(), Ok(s) if s.is_empty());
            if empty {
                pruned += 1;
            }
            !empty
        });
        pruned
    }

    pub fn touch(&self) {
        self.last_activity.store(now_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> u64 {
        self.last_activity.load(Ordering::Relaxed)
    }

    pub fn is_spinning(&self) -> bool {
        self.spinning.load(Ordering::Acquire)
    }

    /// Take the spin lock without waiting
    pub fn try_begin_spin(self: &Arc<Self>) -> Result<SpinGuard, EngineError> {
        let wheel = self
            .wheel
            .clone()
            .try_lock_owned()
            .map_err(|_| EngineError::AlreadySpinning { room: self.room })?;
        self.spinning.store(true, Ordering::Release);
        Ok(SpinGuard {
            wheel,
            room: self.clone(),
        })
    }

    pub async fn has_pending_bets(&self) -> bool {
        for (_, session) in self.sessions() {
            if !session.lock().await.is_empty() {
                return true;
            }
        }
        false
    }

    /// Empty every non-empty user session; bets placed afterwards go to the next round
    pub async fn take_all_bets(&self) -> BTreeMap<UserId, Vec<Bet>> {
        let mut taken = BTreeMap::new();
        for (user, session) in self.sessions() {
            let mut session = session.lock().await;
            if !session.is_empty() {
                taken.insert(user, session.take());
            }
        }
        let pruned = self.prune_empty_sessions();
        if pruned > 0 {
            debug!(room = %self.room, pruned, "Pruned empty bet sessions");
        }
        taken
    }

    pub async fn restore_bets(&self, taken: BTreeMap<UserId, Vec<Bet>>) {
        for (user, bets) in taken {
            self.user_session(user).lock().await.restore(bets);
        }
    }

    pub fn remember_last_bets(&self, user: UserId, bets: Vec<Bet>) {
        self.last_bets.insert(
            user,
            RepeatEntry {
                bets,
                settled_at: now_millis(),
            },
        );
    }

    pub fn last_bets(&self, user: UserId) -> Option<Vec<Bet>> {
        self.last_bets.get(&user).map(|entry| entry.bets.clone())
    }

    /// Forget repeat entries settled more than `horizon` ago
    pub fn evict_stale_repeats(&self, horizon: Duration, now: u64) -> usize {
        let horizon = horizon.as_millis() as u64;
        let before = self.last_bets.len();
        self.last_bets
            .retain(|_, entry| now.saturating_sub(entry.settled_at) < horizon);
        before.saturating_sub(self.last_bets.len())
    }

    /// Idle past `timeout`, not spinning and holding no pending bets
    fn is_collectable(&self, timeout: Duration, now: u64) -> bool {
        if self.is_spinning() {
            return false;
        }
        if now.saturating_sub(self.last_activity()) < timeout.as_millis() as u64 {
            return false;
        }
        self.users.iter().all(|entry| match entry.value().try_lock() {
            Ok(session) => session.is_empty(),
            Err(_) => false,
        })
    }
}

/// All live rooms, created lazily on first touch
pub struct SessionRegistry {
    rooms: DashMap<RoomId, Arc<RoomSession>>,
    wheels: WheelFactory,
}

impl SessionRegistry {
    pub fn new(wheels: WheelFactory) -> Self {
        Self {
            rooms: DashMap::new(),
            wheels,
        }
    }

    pub fn room(&self, room: RoomId) -> Arc<RoomSession> {
        let session = self
            .rooms
            .entry(room)
            .or_insert_with(|| Arc::new(RoomSession::new(room, (self.wheels)(room))))
            .clone();
        session.touch();
        session
    }

    pub fn get(&self, room: RoomId) -> Option<Arc<RoomSession>> {
        self.rooms.get(&room).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Drop idle rooms; returns how many were removed
    pub fn collect_idle(&self, timeout: Duration) -> usize {
        self.collect_idle_at(timeout, now_millis())
    }

    /// Drop idle rooms and trim the repeat caches of the rooms that stay
    pub fn collect_idle_at(&self, timeout: Duration, now: u64) -> usize {
        let candidates: Vec<RoomId> = self.rooms.iter().map(|r| *r.key()).collect();
        let mut dropped = 0;
        for room in candidates {
            if self
                .rooms
                .remove_if(&room, |_, session| session.is_collectable(timeout, now))
                .is_some()
            {
                debug!(room = %room, "Dropped idle room session");
                dropped += 1;
            } else if let Some(session) = self.get(room) {
                session.prune_empty_sessions();
                session.evict_stale_repeats(timeout, now);
            }
        }
        dropped
    }

    pub fn start_gc_task(registry: Arc<SessionRegistry>, config: SessionConfig) -> JoinHandle<()> {
        tokio::spawn(async move {
            let timeout = config.idle_timeout();
            let mut interval = tokio::time::interval(config.gc_interval());

            loop {
                interval.tick().await;
                let dropped = registry.collect_idle(timeout);
                if dropped > 0 {
                    info!(dropped, remaining = registry.len(), "Session garbage collection");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roulette::{BetTarget, Color, FixedWheel};

    fn bet(amount: Coins, target: BetTarget) -> Bet {
        Bet {
            amount,
            target,
            owner: UserId(1),
            placed_at: 0,
        }
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(|_: RoomId| Box::new(FixedWheel(7)) as Box<dyn Wheel>))
    }

    #[test]
    fn test_identical_targets_merge() {
        let red = BetTarget::color(Color::Red);
        let seven = BetTarget::number(7).unwrap();

        let mut session = UserBetSession::new();
        session.add(bet(100, red));
        session.add(bet(50, seven));
        session.add(bet(25, red));

        assert_eq!(session.bets().len(), 2);
        assert_eq!(session.bets()[0].amount, 125);
        assert_eq!(session.total_amount(), 175);
    }

    #[test]
    fn test_take_and_restore_keep_total() {
        let red = BetTarget::color(Color::Red);
        let black = BetTarget::color(Color::Black);

        let mut session = UserBetSession::new();
        session.add(bet(100, red));
        let taken = session.take();
        assert!(session.is_empty());
        assert_eq!(session.total_amount(), 0);

        session.add(bet(30, black));
        session.add(bet(20, red));
        session.restore(taken);

        assert_eq!(session.bets()[0].target, red);
        assert_eq!(session.bets()[0].amount, 120);
        assert_eq!(session.total_amount(), 150);
        assert_eq!(session.total_amount(), session.bets().iter().map(|b| b.amount).sum::<Coins>());
    }

    #[tokio::test]
    async fn test_spin_lock_is_exclusive_and_released() {
        let registry = registry();
        let room = registry.room(RoomId(1));

        let mut guard = room.try_begin_spin().unwrap();
        assert!(room.is_spinning());
        assert!(matches!(
            room.try_begin_spin(),
            Err(EngineError::AlreadySpinning { room: RoomId(1) })
        ));
        assert_eq!(guard.draw().number, 7);

        drop(guard);
        assert!(!room.is_spinning());
        assert!(room.try_begin_spin().is_ok());
    }

    #[tokio::test]
    async fn test_take_all_skips_empty_sessions() {
        let registry = registry();
        let room = registry.room(RoomId(1));
        room.user_session(UserId(1))
            .lock()
            .await
            .add(bet(10, BetTarget::color(Color::Red)));
        room.user_session(UserId(2));

        assert!(room.has_pending_bets().await);
        let taken = room.take_all_bets().await;
        assert_eq!(taken.keys().copied().collect::<Vec<_>>(), vec![UserId(1)]);
        assert!(!room.has_pending_bets().await);
        assert_eq!(room.session_count(), 0);

        room.restore_bets(taken).await;
        assert_eq!(room.user_session(UserId(1)).lock().await.total_amount(), 10);
    }

    #[tokio::test]
    async fn test_prune_keeps_held_and_funded_sessions() {
        let registry = registry();
        let room = registry.room(RoomId(1));
        room.user_session(UserId(1))
            .lock()
            .await
            .add(bet(10, BetTarget::color(Color::Red)));
        let held = room.user_session(UserId(2));
        room.user_session(UserId(3));

        assert_eq!(room.prune_empty_sessions(), 1);
        assert!(room.existing_session(UserId(3)).is_none());
        assert!(room.existing_session(UserId(2)).is_some());

        drop(held);
        assert_eq!(room.prune_empty_sessions(), 1);
        assert_eq!(room.session_count(), 1);
    }

    #[tokio::test]
    async fn test_gc_evicts_stale_repeat_entries() {
        let registry = registry();
        let room = registry.room(RoomId(1));
        room.remember_last_bets(UserId(1), vec![bet(10, BetTarget::color(Color::Red))]);
        room.user_session(UserId(2))
            .lock()
            .await
            .add(bet(10, BetTarget::color(Color::Black)));

        let later = now_millis() + 120_000;
        assert_eq!(registry.collect_idle_at(Duration::from_secs(60), later), 0);
        assert!(room.last_bets(UserId(1)).is_none());
    }

    #[tokio::test]
    async fn test_gc_keeps_rooms_with_pending_bets() {
        let registry = registry();
        registry.room(RoomId(1));
        let busy = registry.room(RoomId(2));
        busy.user_session(UserId(1))
            .lock()
            .await
            .add(bet(10, BetTarget::color(Color::Red)));

        let later = now_millis() + 10_000;
        assert_eq!(registry.collect_idle_at(Duration::from_secs(60), later), 0);

        let much_later = now_millis() + 120_000;
        assert_eq!(registry.collect_idle_at(Duration::from_secs(60), much_later), 1);
        assert!(registry.get(RoomId(1)).is_none());
        assert!(registry.get(RoomId(2)).is_some());
    }
}
