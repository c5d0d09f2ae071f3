//! Spin coordination: bet placement, settlement and the per-room lifecycle
//!
//! `SpinCoordinator` is the in-process API handed to the chat layer. Stakes
//! are debited when bets are placed. A spin takes every pending bet in the
//! room, draws one outcome and credits winners through a single ledger batch.
//! If that batch fails nothing is credited and the bets go back into their
//! sessions, so the round can simply be spun again. Everything after the bets
//! are taken runs on its own task: dropping the `spin` future cannot strand
//! them.

use crate::config::EngineConfig;
use crate::errors::{EngineError, EngineResult, LimitKind};
use crate::game_log::{GameLog, GameLogEntry};
use crate::ledger::{Ledger, LedgerBatch, LedgerError, StatsDelta, UserStats};
use crate::limits::{AntiFlood, SpinAllowance, SpinGate, SpinLimitStore, SpinLimiter};
use crate::roulette::{
    parser, Bet, BetRequest, BetValidator, Color, OutcomeGenerator, PayoutCalculator, SpinReport,
    Stake, UserSettlement, Wheel,
};
use crate::session::{RoomSession, SessionRegistry, SpinGuard, UserBetSession, WheelFactory};
use crate::types::{now_millis, Coins, RoomId, UserId};
use chrono::{NaiveDate, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of a bet placement that did not fail
#[derive(Debug, Clone)]
pub enum Placement {
    /// The text did not contain a well-formed bet; nothing happened
    NothingParsed,
    Accepted(PlacementReceipt),
}

#[derive(Debug, Clone)]
pub struct PlacementReceipt {
    pub bets: Vec<Bet>,
    /// Debited by this placement
    pub staked: Coins,
    /// Everything the user has pending in the room afterwards
    pub pending_total: Coins,
    pub balance: Coins,
}

impl fmt::Display for PlacementReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.bets.iter().map(|b| b.to_string()).collect();
        write!(
            f,
            "Bet accepted: {} (pending {}, balance {})",
            lines.join(", "),
            self.pending_total,
            self.balance
        )
    }
}

#[derive(Debug, Clone)]
pub enum ClearOutcome {
    NothingToClear,
    Refunded {
        bets: Vec<Bet>,
        refunded: Coins,
        balance: Coins,
    },
}

/// Pending bets of one user in one room
#[derive(Debug, Clone, Default)]
pub struct PendingBets {
    pub bets: Vec<Bet>,
    pub total: Coins,
}

impl fmt::Display for PendingBets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bets.is_empty() {
            return write!(f, "No pending bets");
        }
        write!(f, "Pending bets (total {}):", self.total)?;
        for bet in &self.bets {
            write!(f, "\n  {}", bet)?;
        }
        Ok(())
    }
}

/// Daily quota and anti-flood state for one (user, room)
#[derive(Debug, Clone, Copy)]
pub struct LimitStatus {
    pub daily: SpinAllowance,
    pub daily_limit: u32,
    pub flood: SpinGate,
}

impl fmt::Display for LimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.daily.remaining {
            Some(remaining) => write!(
                f,
                "Spins today: {}/{} ({} left)",
                self.daily.used, self.daily_limit, remaining
            )?,
            None => write!(f, "Spins today: {} (unlimited)", self.daily.used)?,
        }
        if !self.flood.allowed {
            write!(f, ", next spin in {}s", self.flood.wait_seconds)?;
        }
        Ok(())
    }
}

pub struct SpinCoordinator {
    config: EngineConfig,
    validator: BetValidator,
    payouts: PayoutCalculator,
    ledger: Arc<dyn Ledger>,
    game_log: Arc<dyn GameLog>,
    anti_flood: Arc<AntiFlood>,
    spin_limiter: Arc<SpinLimiter>,
    sessions: Arc<SessionRegistry>,
}

impl SpinCoordinator {
    /// Coordinator whose rooms draw from entropy-seeded generators
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn Ledger>,
        game_log: Arc<dyn GameLog>,
        spin_store: Arc<dyn SpinLimitStore>,
    ) -> Self {
        let wheel_config = config.wheel.clone();
        let wheels: WheelFactory =
            Arc::new(move |_: RoomId| Box::new(OutcomeGenerator::new(&wheel_config)) as Box<dyn Wheel>);
        Self::with_wheels(config, ledger, game_log, spin_store, wheels)
    }

    pub fn with_wheels(
        config: EngineConfig,
        ledger: Arc<dyn Ledger>,
        game_log: Arc<dyn GameLog>,
        spin_store: Arc<dyn SpinLimitStore>,
        wheels: WheelFactory,
    ) -> Self {
        Self {
            validator: BetValidator::new(config.bets.clone()),
            payouts: PayoutCalculator::new(config.payouts.clone()),
            anti_flood: Arc::new(AntiFlood::new(config.anti_flood.clone())),
            spin_limiter: Arc::new(SpinLimiter::new(spin_store, config.spin_limit.clone())),
            sessions: Arc::new(SessionRegistry::new(wheels)),
            ledger,
            game_log,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn spin_limiter(&self) -> &Arc<SpinLimiter> {
        &self.spin_limiter
    }

    pub async fn balance(&self, user: UserId) -> EngineResult<Coins> {
        Ok(self.ledger.balance(user).await?)
    }

    pub async fn stats(&self, user: UserId) -> EngineResult<UserStats> {
        Ok(self.ledger.stats(user).await?)
    }

    /// Parse `text` and place every bet in it, or none of them
    pub async fn place_bets(&self, user: UserId, room: RoomId, text: &str) -> EngineResult<Placement> {
        let requests = parser::parse(text);
        if requests.is_empty() {
            debug!(user = %user, room = %room, "Bet text not understood");
            return Ok(Placement::NothingParsed);
        }

        let room_session = self.sessions.room(room);
        let user_session = room_session.user_session(user);
        let mut session = user_session.lock().await;
        self.place_locked(user, &room_session, &mut session, &requests)
            .await
            .map(Placement::Accepted)
    }

    /// Place the user's last settled bets in this room again
    pub async fn repeat_bets(&self, user: UserId, room: RoomId) -> EngineResult<PlacementReceipt> {
        let room_session = self.sessions.room(room);
        let last = room_session
            .last_bets(user)
            .filter(|bets| !bets.is_empty())
            .ok_or(EngineError::NothingToRepeat)?;
        let requests = to_requests(&last);

        let user_session = room_session.user_session(user);
        let mut session = user_session.lock().await;
        self.place_locked(user, &room_session, &mut session, &requests).await
    }

    /// Double every pending bet by placing the same stakes once more
    pub async fn double_bets(&self, user: UserId, room: RoomId) -> EngineResult<PlacementReceipt> {
        let room_session = self.sessions.room(room);
        let user_session = room_session
            .existing_session(user)
            .ok_or(EngineError::NoPendingBets)?;
        let mut session = user_session.lock().await;
        if session.is_empty() {
            return Err(EngineError::NoPendingBets);
        }

        let requests = to_requests(session.bets());
        self.place_locked(user, &room_session, &mut session, &requests).await
    }

    /// Validate against the latest balance, debit the total once, then add to the session
    async fn place_locked(
        &self,
        user: UserId,
        room_session: &RoomSession,
        session: &mut UserBetSession,
        requests: &[BetRequest],
    ) -> EngineResult<PlacementReceipt> {
        let balance = self.ledger.balance(user).await?;
        let amounts = self.resolve_stakes(requests, balance);
        let staked = self
            .validator
            .validate_all(&amounts, balance, session.total_amount())?;

        let new_balance = self
            .ledger
            .debit(user, staked)
            .await
            .map_err(debit_error)?;

        let placed_at = now_millis();
        let bets: Vec<Bet> = requests
            .iter()
            .zip(&amounts)
            .map(|(request, &amount)| Bet {
                amount,
                target: request.target,
                owner: user,
                placed_at,
            })
            .collect();
        for bet in &bets {
            session.add(bet.clone());
        }
        room_session.touch();

        info!(
            user = %user,
            room = %room_session.room(),
            bets = bets.len(),
            staked,
            pending = session.total_amount(),
            "Bets placed"
        );

        Ok(PlacementReceipt {
            bets,
            staked,
            pending_total: session.total_amount(),
            balance: new_balance,
        })
    }

    /// All-in takes whatever is left after the earlier stakes, capped at the maximum bet
    fn resolve_stakes(&self, requests: &[BetRequest], balance: Coins) -> Vec<Coins> {
        let mut committed: Coins = 0;
        requests
            .iter()
            .map(|request| {
                let amount = match request.stake {
                    Stake::Fixed(amount) => amount,
                    Stake::AllIn => (balance - committed).min(self.validator.limits().max_bet),
                };
                committed = committed.saturating_add(amount);
                amount
            })
            .collect()
    }

    /// Spin the wheel for every pending bet in `room`
    pub async fn spin(&self, user: UserId, room: RoomId) -> EngineResult<SpinReport> {
        let room_session = self.sessions.room(room);
        let guard = room_session.try_begin_spin()?;

        let gate = self.anti_flood.can_spin(user, room);
        if !gate.allowed {
            return Err(EngineError::RateLimited {
                wait_seconds: gate.wait_seconds,
            });
        }

        if !room_session.has_pending_bets().await {
            return Err(EngineError::NoPendingBets);
        }

        let today = Utc::now().date_naive();
        let allowance = self.spin_limiter.can_spin(user, room, today).await?;
        if !allowance.allowed {
            return Err(EngineError::LimitExceeded(LimitKind::DailySpins {
                limit: self.spin_limiter.daily_limit(),
            }));
        }

        let round = SpinRound {
            trigger: user,
            today,
            guard,
            history_len: self.config.wheel.history_len,
            payouts: self.payouts.clone(),
            ledger: self.ledger.clone(),
            game_log: self.game_log.clone(),
            spin_limiter: self.spin_limiter.clone(),
        };
        // Once bets leave their sessions the round runs to the end even if the caller goes away
        tokio::spawn(round.settle())
            .await
            .map_err(|e| EngineError::Internal(format!("spin task for room {} failed: {}", room, e)))?
    }

    /// Refund and drop every pending bet of the user in this room
    pub async fn clear_bets(&self, user: UserId, room: RoomId) -> EngineResult<ClearOutcome> {
        let Some(room_session) = self.sessions.get(room) else {
            return Ok(ClearOutcome::NothingToClear);
        };
        let Some(user_session) = room_session.existing_session(user) else {
            return Ok(ClearOutcome::NothingToClear);
        };
        let mut session = user_session.lock().await;
        if session.is_empty() {
            return Ok(ClearOutcome::NothingToClear);
        }

        let refunded = session.total_amount();
        let bets = session.take();
        match self.ledger.credit(user, refunded).await {
            Ok(balance) => {
                room_session.touch();
                info!(user = %user, room = %room, refunded, "Pending bets cleared");
                Ok(ClearOutcome::Refunded {
                    bets,
                    refunded,
                    balance,
                })
            }
            Err(e) => {
                session.restore(bets);
                Err(e.into())
            }
        }
    }

    pub async fn pending_bets(&self, user: UserId, room: RoomId) -> PendingBets {
        let Some(room_session) = self.sessions.get(room) else {
            return PendingBets::default();
        };
        let Some(user_session) = room_session.existing_session(user) else {
            return PendingBets::default();
        };
        let session = user_session.lock().await;
        PendingBets {
            bets: session.bets().to_vec(),
            total: session.total_amount(),
        }
    }

    pub async fn limit_status(&self, user: UserId, room: RoomId) -> EngineResult<LimitStatus> {
        let today = Utc::now().date_naive();
        Ok(LimitStatus {
            daily: self.spin_limiter.can_spin(user, room, today).await?,
            daily_limit: self.spin_limiter.daily_limit(),
            flood: self.anti_flood.status(user, room),
        })
    }

    /// Latest outcomes in the room, newest first
    pub async fn recent_outcomes(&self, room: RoomId, limit: usize) -> EngineResult<Vec<GameLogEntry>> {
        let limit = limit.min(self.config.session.history_window);
        Ok(self.game_log.recent(room, limit).await?)
    }

    /// Spawn anti-flood eviction, spin-limit purge and session GC
    pub fn start_maintenance(&self) -> Vec<JoinHandle<()>> {
        info!("Starting maintenance tasks");
        vec![
            AntiFlood::start_cleanup_task(self.anti_flood.clone()),
            SpinLimiter::start_purge_task(self.spin_limiter.clone()),
            SessionRegistry::start_gc_task(self.sessions.clone(), self.config.session.clone()),
        ]
    }
}

/// Everything a spin needs after its bets have been taken
struct SpinRound {
    trigger: UserId,
    today: NaiveDate,
    guard: SpinGuard,
    history_len: usize,
    payouts: PayoutCalculator,
    ledger: Arc<dyn Ledger>,
    game_log: Arc<dyn GameLog>,
    spin_limiter: Arc<SpinLimiter>,
}

impl SpinRound {
    async fn settle(mut self) -> EngineResult<SpinReport> {
        let room_session = self.guard.room().clone();
        let room = room_session.room();
        let user = self.trigger;

        let taken = room_session.take_all_bets().await;
        if taken.is_empty() {
            return Err(EngineError::NoPendingBets);
        }

        if self.guard.needs_history() {
            self.prime_wheel(room).await;
        }
        let outcome = self.guard.draw();
        let spin_id = Uuid::new_v4().to_string();

        let mut batch = LedgerBatch::new();
        let mut settlements = Vec::with_capacity(taken.len());
        for (&player, bets) in &taken {
            let lines: Vec<_> = bets
                .iter()
                .cloned()
                .map(|bet| self.payouts.settle_line(bet, &outcome))
                .collect();

            let mut stats = StatsDelta::default();
            for line in &lines {
                stats.record(line.net_profit);
            }

            let settlement = UserSettlement::from_lines(player, lines);
            batch.add_delta(player, settlement.credited);
            batch.add_stats(player, stats);
            settlements.push(settlement);
        }

        if let Err(source) = self.ledger.apply_batch(&batch).await {
            let users: Vec<UserId> = taken.keys().copied().collect();
            error!(
                spin_id = %spin_id,
                room = %room,
                outcome = %outcome,
                users = users.len(),
                error = %source,
                "Settlement failed, restoring pending bets"
            );
            room_session.restore_bets(taken).await;
            return Err(EngineError::SettlementFailure { room, users, source });
        }

        let entry = GameLogEntry {
            spin_id: spin_id.clone(),
            room,
            outcome,
            recorded_at: now_millis(),
        };
        if let Err(e) = self.game_log.append(entry).await {
            error!(spin_id = %spin_id, room = %room, error = %e, "Failed to append game log");
        }

        if let Err(e) = self.spin_limiter.record_spin(user, room, self.today).await {
            warn!(user = %user, room = %room, error = %e, "Failed to record spin against daily limit");
        }

        for (player, bets) in taken {
            room_session.remember_last_bets(player, bets);
        }
        room_session.touch();

        let credited: Coins = settlements.iter().map(|s| s.credited).sum();
        info!(
            spin_id = %spin_id,
            room = %room,
            trigger = %user,
            outcome = %outcome,
            players = settlements.len(),
            credited,
            "Spin settled"
        );

        Ok(SpinReport {
            spin_id,
            room,
            outcome,
            settlements,
        })
    }

    /// Carry the logged color run into a wheel that was created after a restart or GC
    async fn prime_wheel(&mut self, room: RoomId) {
        match self.game_log.recent(room, self.history_len).await {
            Ok(entries) => {
                let colors: Vec<Color> = entries.iter().rev().map(|e| e.outcome.color).collect();
                debug!(room = %room, outcomes = colors.len(), "Seeding wheel history from game log");
                self.guard.prime(&colors);
            }
            Err(e) => warn!(room = %room, error = %e, "Could not read game log to seed wheel history"),
        }
    }
}

fn to_requests(bets: &[Bet]) -> Vec<BetRequest> {
    bets.iter()
        .map(|bet| BetRequest::fixed(bet.amount, bet.target))
        .collect()
}

fn debit_error(e: LedgerError) -> EngineError {
    match e {
        LedgerError::InsufficientFunds { needed, available, .. } => {
            EngineError::InsufficientFunds { needed, available }
        }
        other => other.into(),
    }
}
