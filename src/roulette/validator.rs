use crate::config::BetLimits;
use crate::types::Coins;

/// Why a bet was refused. Rules are checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BetRejection {
    #[error("bet amount must be positive")]
    NonPositive,
    #[error("minimum bet is {min}")]
    BelowMinimum { min: Coins },
    #[error("maximum bet is {max}")]
    AboveMaximum { max: Coins },
    #[error("not enough coins: need {needed}, have {available}")]
    InsufficientFunds { needed: Coins, available: Coins },
    #[error("pending bets {current} plus this bet exceed the cap of {cap}")]
    SessionCapExceeded { cap: Coins, current: Coins },
}

/// Stateless bet checks against a balance snapshot and the pending total
#[derive(Debug, Clone)]
pub struct BetValidator {
    limits: BetLimits,
}

impl BetValidator {
    pub fn new(limits: BetLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &BetLimits {
        &self.limits
    }

    pub fn validate(
        &self,
        amount: Coins,
        current_balance: Coins,
        session_total: Coins,
    ) -> Result<(), BetRejection> {
        if amount <= 0 {
            return Err(BetRejection::NonPositive);
        }
        if amount < self.limits.min_bet {
            return Err(BetRejection::BelowMinimum { min: self.limits.min_bet });
        }
        if amount > self.limits.max_bet {
            return Err(BetRejection::AboveMaximum { max: self.limits.max_bet });
        }
        if amount > current_balance {
            return Err(BetRejection::InsufficientFunds {
                needed: amount,
                available: current_balance.max(0),
            });
        }
        match session_total.checked_add(amount) {
            Some(total) if total <= self.limits.max_total_per_user => Ok(()),
            _ => Err(BetRejection::SessionCapExceeded {
                cap: self.limits.max_total_per_user,
                current: session_total,
            }),
        }
    }

    /// Validate several stakes in order as if each were debited before the next
    pub fn validate_all(
        &self,
        amounts: &[Coins],
        current_balance: Coins,
        session_total: Coins,
    ) -> Result<Coins, BetRejection> {
        let mut committed: Coins = 0;
        for &amount in amounts {
            self.validate(amount, current_balance - committed, session_total + committed)?;
            committed += amount;
        }
        Ok(committed)
    }
}
