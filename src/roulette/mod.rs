//! Roulette rules: bet text parsing, validation, outcome drawing and payouts

pub mod types;
pub mod parser;
pub mod validator;
pub mod outcome;
pub mod payout;

pub use types::*;
pub use validator::{BetRejection, BetValidator};
pub use outcome::{FixedWheel, OutcomeGenerator, Wheel};
pub use payout::PayoutCalculator;
