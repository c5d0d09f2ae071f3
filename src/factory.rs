//! Engine construction
//!
//! Wires a `SpinCoordinator` to either in-memory stores or one RocksDB
//! database shared by the ledger, the game log and the spin-limit counters.

use crate::config::EngineConfig;
use crate::coordinator::SpinCoordinator;
use crate::errors::EngineResult;
use crate::game_log::{InMemoryGameLog, RocksGameLog};
use crate::ledger::{InMemoryLedger, RocksLedger};
use crate::limits::{InMemorySpinLimitStore, RocksSpinLimitStore};
use crate::storage::KvStore;
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

/// Data directory value that selects the in-memory stores
pub const IN_MEMORY: &str = ":memory:";

pub struct EngineFactory;

impl EngineFactory {
    /// Build an engine for `config`, persistent unless the data dir is `:memory:`
    pub fn create_engine(config: EngineConfig) -> EngineResult<Arc<SpinCoordinator>> {
        config.validate()?;
        if config.storage.data_dir == IN_MEMORY {
            Ok(Self::in_memory(config))
        } else {
            Self::persistent(config)
        }
    }

    pub fn in_memory(config: EngineConfig) -> Arc<SpinCoordinator> {
        info!("Creating in-memory roulette engine");
        let history = config.session.history_window;
        Arc::new(SpinCoordinator::new(
            config,
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryGameLog::new(history)),
            Arc::new(InMemorySpinLimitStore::new()),
        ))
    }

    pub fn persistent(config: EngineConfig) -> EngineResult<Arc<SpinCoordinator>> {
        let data_dir = config.storage.data_dir.clone();
        if config.storage.clear_on_start {
            warn!(data_dir = %data_dir, "Clearing engine data before start");
            let _ = fs::remove_dir_all(&data_dir);
        } else {
            info!(data_dir = %data_dir, "Preserving existing engine data");
        }

        let store = KvStore::open(&data_dir)?;
        Ok(Arc::new(SpinCoordinator::new(
            config,
            Arc::new(RocksLedger::new(store.clone())),
            Arc::new(RocksGameLog::new(store.clone())),
            Arc::new(RocksSpinLimitStore::new(store)),
        )))
    }

    /// In-memory engine with relaxed limits
    pub fn create_testing() -> Arc<SpinCoordinator> {
        Self::in_memory(EngineConfig::testing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::types::{RoomId, UserId};

    fn persistent_config(dir: &std::path::Path) -> EngineConfig {
        let mut config = EngineConfig::testing();
        config.storage.data_dir = dir.to_string_lossy().into_owned();
        config
    }

    #[tokio::test]
    async fn test_in_memory_selected_by_data_dir() {
        let mut config = EngineConfig::testing();
        config.storage.data_dir = IN_MEMORY.to_string();
        let engine = EngineFactory::create_engine(config).unwrap();
        assert_eq!(engine.balance(UserId(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_persistent_engine_keeps_balances_and_history() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = EngineFactory::persistent(persistent_config(dir.path())).unwrap();
            engine.ledger().credit(UserId(1), 5_000).await.unwrap();
            engine.place_bets(UserId(1), RoomId(1), "1000 red").await.unwrap();
            engine.spin(UserId(1), RoomId(1)).await.unwrap();
        }

        let engine = EngineFactory::persistent(persistent_config(dir.path())).unwrap();
        let balance = engine.balance(UserId(1)).await.unwrap();
        assert!(balance == 4_000 || balance == 7_000);
        assert_eq!(engine.recent_outcomes(RoomId(1), 10).await.unwrap().len(), 1);
        assert_eq!(engine.stats(UserId(1)).await.unwrap().spins_played, 1);
    }

    #[tokio::test]
    async fn test_clear_on_start_wipes_data() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = EngineFactory::persistent(persistent_config(dir.path())).unwrap();
            engine.ledger().credit(UserId(1), 5_000).await.unwrap();
        }

        let mut config = persistent_config(dir.path());
        config.storage.clear_on_start = true;
        let engine = EngineFactory::persistent(config).unwrap();
        assert_eq!(engine.balance(UserId(1)).await.unwrap(), 0);
    }
}
