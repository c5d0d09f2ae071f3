//! Test to verify engine state persistence across restarts
//! Balances, statistics, the game log and spin counters must survive a reopen

use roulette_engine::{
    config::EngineConfig, factory::EngineFactory, ledger::Ledger, limits::SpinLimitStore,
    EngineError, LimitKind, RoomId, UserId,
};

fn config_for(dir: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::testing();
    config.storage.data_dir = dir.to_string_lossy().into_owned();
    config.storage.clear_on_start = false;
    config.spin_limit.daily_limit = 3;
    config
}

#[tokio::test]
async fn test_db_persistence_across_restarts() {
    let dir = tempfile::tempdir().expect("create temp db dir");
    let room = RoomId(-42);

    // === PHASE 1: fund, bet and spin, then drop the engine ===
    let (balance_before, stats_before) = {
        let engine = EngineFactory::persistent(config_for(dir.path())).expect("Failed to create engine");
        engine.ledger().credit(UserId(1), 50_000).await.expect("credit");

        for _ in 0..3 {
            engine.place_bets(UserId(1), room, "1k red, 500 q3").await.expect("place");
            engine.spin(UserId(1), room).await.expect("spin");
        }

        (
            engine.balance(UserId(1)).await.unwrap(),
            engine.stats(UserId(1)).await.unwrap(),
        )
    };

    // === PHASE 2: reopen and verify ===
    let engine = EngineFactory::persistent(config_for(dir.path())).expect("Failed to reopen engine");

    assert_eq!(engine.balance(UserId(1)).await.unwrap(), balance_before);
    assert_eq!(engine.stats(UserId(1)).await.unwrap(), stats_before);
    assert_eq!(stats_before.spins_played, 3);

    let history = engine.recent_outcomes(room, 50).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].recorded_at >= w[1].recorded_at));

    // The daily quota was used up before the restart
    engine.place_bets(UserId(1), room, "100 black").await.expect("place after restart");
    let err = engine.spin(UserId(1), room).await.unwrap_err();
    assert!(matches!(err, EngineError::LimitExceeded(LimitKind::DailySpins { limit: 3 })));

    let status = engine.limit_status(UserId(1), room).await.unwrap();
    assert_eq!(status.daily.used, 3);
}

#[tokio::test]
async fn test_unlimited_entitlement_persists() {
    let dir = tempfile::tempdir().expect("create temp db dir");
    {
        let engine = EngineFactory::persistent(config_for(dir.path())).unwrap();
        engine
            .spin_limiter()
            .store()
            .set_unlimited(UserId(7), true)
            .await
            .unwrap();
    }

    let engine = EngineFactory::persistent(config_for(dir.path())).unwrap();
    engine.ledger().credit(UserId(7), 10_000).await.unwrap();
    for _ in 0..5 {
        engine.place_bets(UserId(7), RoomId(1), "10 green").await.unwrap();
        engine.spin(UserId(7), RoomId(1)).await.expect("unlimited user spins");
    }
    assert_eq!(engine.limit_status(UserId(7), RoomId(1)).await.unwrap().daily.remaining, None);
}
