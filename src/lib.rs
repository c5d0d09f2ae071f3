//! Roulette engine for chat rooms
//!
//! Collects bets from concurrent users per room, enforces rate and stake
//! limits, draws one outcome per spin on a 13-pocket wheel and settles every
//! bet through a single atomic ledger batch.

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod factory;
pub mod game_log;
pub mod ledger;
pub mod limits;
pub mod roulette;
pub mod session;
pub mod storage;
pub mod types;

pub use config::{ConfigBuilder, ConfigLoader, EngineConfig};
pub use coordinator::{ClearOutcome, LimitStatus, PendingBets, Placement, PlacementReceipt, SpinCoordinator};
pub use errors::{EngineError, EngineResult, LimitKind};
pub use factory::EngineFactory;
pub use game_log::{GameLog, GameLogEntry};
pub use ledger::{Ledger, LedgerBatch, LedgerError};
pub use roulette::{BetTarget, Color, SpinOutcome, SpinReport};
pub use types::{Coins, RoomId, UserId};
