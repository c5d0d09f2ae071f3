//! Error types for the roulette engine
//!
//! One root error (`EngineError`) that the coordinator returns to the chat layer,
//! with storage and configuration failures kept in their own enums.

use crate::ledger::LedgerError;
use crate::roulette::validator::BetRejection;
use crate::types::{RoomId, UserId};
use std::fmt;

/// Root error type for all engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Bad amount or target; reported to the placing user only
    #[error("Invalid bet: {0}")]
    Validation(String),

    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: i64, available: i64 },

    #[error("Limit exceeded: {0}")]
    LimitExceeded(LimitKind),

    #[error("Room {room} is already spinning")]
    AlreadySpinning { room: RoomId },

    #[error("Too many spins, wait {wait_seconds}s")]
    RateLimited { wait_seconds: u64 },

    #[error("No pending bets")]
    NoPendingBets,

    #[error("No previous bets to repeat")]
    NothingToRepeat,

    /// Ledger batch write failed; the round was halted and sessions kept
    #[error("Settlement failed in room {room} for {} user(s): {source}", .users.len())]
    SettlementFailure {
        room: RoomId,
        users: Vec<UserId>,
        #[source]
        source: LedgerError,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A settlement task panicked or was aborted by runtime shutdown
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which limit rejected the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Single bet above the configured ceiling
    MaxBet { max: i64 },
    /// Pending total for the user in this room would exceed the cap
    SessionTotal { cap: i64, current: i64 },
    /// Daily spin quota for (user, room) used up
    DailySpins { limit: u32 },
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::MaxBet { max } => write!(f, "bet above maximum of {}", max),
            LimitKind::SessionTotal { cap, current } => {
                write!(f, "pending bets {} would exceed the cap of {}", current, cap)
            }
            LimitKind::DailySpins { limit } => write!(f, "daily limit of {} spins reached", limit),
        }
    }
}

/// Storage system errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),
    #[error("Read failed: {0}")]
    ReadFailed(String),
    #[error("Write failed: {0}")]
    WriteFailed(String),
    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

/// Configuration and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
    #[error("Missing required field: {0}")]
    MissingRequired(String),
    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),
    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

impl From<BetRejection> for EngineError {
    fn from(rejection: BetRejection) -> Self {
        match rejection {
            BetRejection::InsufficientFunds { needed, available } => {
                EngineError::InsufficientFunds { needed, available }
            }
            BetRejection::AboveMaximum { max } => EngineError::LimitExceeded(LimitKind::MaxBet { max }),
            BetRejection::SessionCapExceeded { cap, current } => {
                EngineError::LimitExceeded(LimitKind::SessionTotal { cap, current })
            }
            other => EngineError::Validation(other.to_string()),
        }
    }
}

// External error conversions
impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::WriteFailed(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::CorruptedData(e.to_string())
    }
}

impl From<std::io::Error> for ConfigurationError {
    fn from(e: std::io::Error) -> Self {
        ConfigurationError::LoadFailed(e.to_string())
    }
}

/// Convenience type alias for Results
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Errors the placing user can simply retry after fixing their input
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::InsufficientFunds { .. }
                | EngineError::LimitExceeded(_)
                | EngineError::AlreadySpinning { .. }
                | EngineError::RateLimited { .. }
                | EngineError::NoPendingBets
                | EngineError::NothingToRepeat
        )
    }
}
