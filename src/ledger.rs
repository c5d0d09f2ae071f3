//! Coin ledger consumed by the engine
//!
//! The engine only needs balances, an atomic check-and-debit for stakes and an
//! all-or-nothing batch for spin settlement. `InMemoryLedger` serves tests and
//! single-process deployments; `RocksLedger` persists accounts in RocksDB.

use crate::errors::StorageError;
use crate::storage::{KvBatch, KvStore};
use crate::types::{Coins, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

const ACCOUNT_PREFIX: &str = "ledger:account:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("insufficient funds for user {user}: need {needed}, have {available}")]
    InsufficientFunds {
        user: UserId,
        needed: Coins,
        available: Coins,
    },
    #[error("invalid amount: {0}")]
    InvalidAmount(Coins),
    #[error("balance overflow for user {0}")]
    Overflow(UserId),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for LedgerError {
    fn from(e: StorageError) -> Self {
        LedgerError::Unavailable(e.to_string())
    }
}

/// Per-spin statistics change for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsDelta {
    /// Best single-bet net profit (0 when nothing won)
    pub max_win: Coins,
    /// Worst single-bet net result (0 when nothing lost)
    pub min_win: Coins,
    pub total_won: Coins,
    pub total_lost: Coins,
}

impl StatsDelta {
    pub fn record(&mut self, net_profit: Coins) {
        self.max_win = self.max_win.max(net_profit);
        self.min_win = self.min_win.min(net_profit);
        if net_profit >= 0 {
            self.total_won = self.total_won.saturating_add(net_profit);
        } else {
            self.total_lost = self.total_lost.saturating_add(-net_profit);
        }
    }
}

/// Running statistics kept with the balance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub max_win: Coins,
    pub min_win: Coins,
    pub total_won: Coins,
    pub total_lost: Coins,
    pub spins_played: u64,
}

impl UserStats {
    fn apply(&mut self, delta: &StatsDelta) {
        self.max_win = self.max_win.max(delta.max_win);
        self.min_win = self.min_win.min(delta.min_win);
        self.total_won = self.total_won.saturating_add(delta.total_won);
        self.total_lost = self.total_lost.saturating_add(delta.total_lost);
        self.spins_played += 1;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Coins,
    pub stats: UserStats,
}

/// Balance deltas and statistics applied together or not at all
#[derive(Debug, Clone, Default)]
pub struct LedgerBatch {
    deltas: BTreeMap<UserId, Coins>,
    stats: BTreeMap<UserId, StatsDelta>,
}

impl LedgerBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_delta(&mut self, user: UserId, delta: Coins) {
        let entry = self.deltas.entry(user).or_insert(0);
        *entry = entry.saturating_add(delta);
    }

    pub fn add_stats(&mut self, user: UserId, delta: StatsDelta) {
        self.stats.insert(user, delta);
    }

    pub fn delta(&self, user: UserId) -> Coins {
        self.deltas.get(&user).copied().unwrap_or(0)
    }

    pub fn users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.deltas.keys().chain(self.stats.keys()).copied().collect();
        users.sort();
        users.dedup();
        users
    }

    /// Compute the post-batch accounts without committing anything
    fn plan<F>(&self, mut load: F) -> Result<Vec<(UserId, Account)>, LedgerError>
    where
        F: FnMut(UserId) -> Result<Account, LedgerError>,
    {
        let mut planned = Vec::new();
        for user in self.users() {
            let mut account = load(user)?;
            let delta = self.delta(user);
            let balance = account
                .balance
                .checked_add(delta)
                .ok_or(LedgerError::Overflow(user))?;
            if balance < 0 {
                return Err(LedgerError::InsufficientFunds {
                    user,
                    needed: -delta,
                    available: account.balance,
                });
            }
            account.balance = balance;
            if let Some(stats) = self.stats.get(&user) {
                account.stats.apply(stats);
            }
            planned.push((user, account));
        }
        Ok(planned)
    }
}

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn balance(&self, user: UserId) -> Result<Coins, LedgerError>;

    async fn stats(&self, user: UserId) -> Result<UserStats, LedgerError>;

    /// Atomically check the latest balance and take `amount`; returns the new balance
    async fn debit(&self, user: UserId, amount: Coins) -> Result<Coins, LedgerError>;

    /// Apply every delta and statistics entry, or none of them
    async fn apply_batch(&self, batch: &LedgerBatch) -> Result<(), LedgerError>;

    /// Add coins to a balance; returns the balance this credit produced
    async fn credit(&self, user: UserId, amount: Coins) -> Result<Coins, LedgerError>;
}

fn checked_debit(user: UserId, account: &mut Account, amount: Coins) -> Result<Coins, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    if account.balance < amount {
        return Err(LedgerError::InsufficientFunds {
            user,
            needed: amount,
            available: account.balance,
        });
    }
    account.balance -= amount;
    Ok(account.balance)
}

fn checked_credit(user: UserId, account: &mut Account, amount: Coins) -> Result<Coins, LedgerError> {
    if amount < 0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    account.balance = account
        .balance
        .checked_add(amount)
        .ok_or(LedgerError::Overflow(user))?;
    Ok(account.balance)
}

/// Process-local ledger behind a single mutex
#[derive(Default)]
pub struct InMemoryLedger {
    accounts: Mutex<HashMap<UserId, Account>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balances<I: IntoIterator<Item = (UserId, Coins)>>(balances: I) -> Self {
        let accounts = balances
            .into_iter()
            .map(|(user, balance)| (user, Account { balance, ..Account::default() }))
            .collect();
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, Account>>, LedgerError> {
        self.accounts
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn balance(&self, user: UserId) -> Result<Coins, LedgerError> {
        Ok(self.lock()?.get(&user).map(|a| a.balance).unwrap_or(0))
    }

    async fn stats(&self, user: UserId) -> Result<UserStats, LedgerError> {
        Ok(self.lock()?.get(&user).map(|a| a.stats).unwrap_or_default())
    }

    async fn debit(&self, user: UserId, amount: Coins) -> Result<Coins, LedgerError> {
        let mut accounts = self.lock()?;
        let account = accounts.entry(user).or_default();
        checked_debit(user, account, amount)
    }

    async fn credit(&self, user: UserId, amount: Coins) -> Result<Coins, LedgerError> {
        let mut accounts = self.lock()?;
        let account = accounts.entry(user).or_default();
        checked_credit(user, account, amount)
    }

    async fn apply_batch(&self, batch: &LedgerBatch) -> Result<(), LedgerError> {
        let mut accounts = self.lock()?;
        let planned = batch.plan(|user| Ok(accounts.get(&user).copied().unwrap_or_default()))?;
        for (user, account) in planned {
            accounts.insert(user, account);
        }
        Ok(())
    }
}

/// RocksDB-backed ledger; read-modify-write cycles are serialized by `write_lock`
pub struct RocksLedger {
    store: KvStore,
    write_lock: Mutex<()>,
}

impl RocksLedger {
    pub fn new(store: KvStore) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    fn account_key(user: UserId) -> Vec<u8> {
        format!("{}{}", ACCOUNT_PREFIX, user.0).into_bytes()
    }

    fn load(&self, user: UserId) -> Result<Account, LedgerError> {
        Ok(self
            .store
            .get_json::<Account>(&Self::account_key(user))?
            .unwrap_or_default())
    }

    fn save(&self, user: UserId, account: &Account) -> Result<(), LedgerError> {
        let mut batch = KvBatch::new();
        batch.put_json(&Self::account_key(user), account)?;
        self.store.write(batch)?;
        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, LedgerError> {
        self.write_lock
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger lock poisoned".to_string()))
    }
}

#[async_trait]
impl Ledger for RocksLedger {
    async fn balance(&self, user: UserId) -> Result<Coins, LedgerError> {
        Ok(self.load(user)?.balance)
    }

    async fn stats(&self, user: UserId) -> Result<UserStats, LedgerError> {
        Ok(self.load(user)?.stats)
    }

    async fn debit(&self, user: UserId, amount: Coins) -> Result<Coins, LedgerError> {
        let _guard = self.guard()?;
        let mut account = self.load(user)?;
        let balance = checked_debit(user, &mut account, amount)?;
        self.save(user, &account)?;
        Ok(balance)
    }

    async fn credit(&self, user: UserId, amount: Coins) -> Result<Coins, LedgerError> {
        let _guard = self.guard()?;
        let mut account = self.load(user)?;
        let balance = checked_credit(user, &mut account, amount)?;
        self.save(user, &account)?;
        Ok(balance)
    }

    async fn apply_batch(&self, batch: &LedgerBatch) -> Result<(), LedgerError> {
        let _guard = self.guard()?;
        let planned = batch.plan(|user| self.load(user))?;

        let mut writes = KvBatch::new();
        for (user, account) in &planned {
            writes.put_json(&Self::account_key(*user), account)?;
        }
        self.store.write(writes)?;
        Ok(())
    }
}
