use crate::config::PayoutTable;
use crate::roulette::types::{Bet, BetTarget, Color, SettledBet, SpinOutcome};
use crate::types::Coins;

/// Maps a bet and an outcome to net profit. Pure; never touches balances.
#[derive(Debug, Clone)]
pub struct PayoutCalculator {
    table: PayoutTable,
}

impl PayoutCalculator {
    pub fn new(table: PayoutTable) -> Self {
        Self { table }
    }

    /// Profit multiplier for a winning target, in thousandths
    pub fn multiplier_milli(&self, target: &BetTarget) -> Coins {
        match *target {
            BetTarget::Number { .. } => self.table.number_multiplier * 1_000,
            BetTarget::Color { color: Color::Green } => self.table.green_multiplier * 1_000,
            BetTarget::Color { .. } => self.table.red_black_multiplier * 1_000,
            BetTarget::Range { .. } if target.is_canonical_quarter() => self.table.quarter_multiplier_milli,
            BetTarget::Range { start, end } => {
                let width = Coins::from(end - start) + 1;
                // Integer division truncates the multiplier to three decimals
                self.table.range_base * 1_000 / width
            }
        }
    }

    /// Net profit: positive profit beyond the stake on a win, `-amount` on a loss
    pub fn settle(&self, bet: &Bet, outcome: &SpinOutcome) -> Coins {
        if !bet.target.covers(outcome.number) {
            return -bet.amount;
        }
        let profit = i128::from(bet.amount) * i128::from(self.multiplier_milli(&bet.target)) / 1_000;
        Coins::try_from(profit).unwrap_or(Coins::MAX)
    }

    pub fn settle_line(&self, bet: Bet, outcome: &SpinOutcome) -> SettledBet {
        let net_profit = self.settle(&bet, outcome);
        let payout = if bet.target.covers(outcome.number) {
            bet.amount.saturating_add(net_profit)
        } else {
            0
        };
        SettledBet { bet, net_profit, payout }
    }
}

impl Default for PayoutCalculator {
    fn default() -> Self {
        Self::new(PayoutTable::default())
    }
}
