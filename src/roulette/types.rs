use crate::types::{Coins, RoomId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest pocket on the wheel; pockets are 0..=MAX_NUMBER
pub const MAX_NUMBER: u8 = 12;

/// The four fixed three-number ranges with their own payout
pub const CANONICAL_QUARTERS: [(u8, u8); 4] = [(1, 3), (4, 6), (7, 9), (10, 12)];

/// Pocket color
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Black,
    Green,
}

impl Color {
    /// Fixed partition: 0 is green, odd numbers red, even numbers black
    pub fn of(number: u8) -> Self {
        match number {
            0 => Color::Green,
            n if n % 2 == 1 => Color::Red,
            _ => Color::Black,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Red => write!(f, "red"),
            Color::Black => write!(f, "black"),
            Color::Green => write!(f, "green"),
        }
    }
}

/// What a bet is placed on
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BetTarget {
    Number { value: u8 },
    Color { color: Color },
    /// Inclusive range with `start < end <= MAX_NUMBER`
    Range { start: u8, end: u8 },
}

impl BetTarget {
    pub fn number(value: u8) -> Option<Self> {
        (value <= MAX_NUMBER).then_some(BetTarget::Number { value })
    }

    pub fn color(color: Color) -> Self {
        BetTarget::Color { color }
    }

    /// Build a range target; a single-number range becomes a number bet
    pub fn range(start: u8, end: u8) -> Option<Self> {
        if start > end || end > MAX_NUMBER {
            return None;
        }
        if start == end {
            return Self::number(start);
        }
        Some(BetTarget::Range { start, end })
    }

    pub fn covers(&self, number: u8) -> bool {
        match *self {
            BetTarget::Number { value } => value == number,
            BetTarget::Color { color } => Color::of(number) == color,
            BetTarget::Range { start, end } => (start..=end).contains(&number),
        }
    }

    pub fn is_canonical_quarter(&self) -> bool {
        match *self {
            BetTarget::Range { start, end } => CANONICAL_QUARTERS.contains(&(start, end)),
            _ => false,
        }
    }
}

impl fmt::Display for BetTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetTarget::Number { value } => write!(f, "{}", value),
            BetTarget::Color { color } => write!(f, "{}", color),
            BetTarget::Range { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}

/// Stake as written by the user, before it is resolved against a balance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Stake {
    Fixed(Coins),
    /// Vabank: everything left on the balance
    AllIn,
}

/// One parsed bet, not yet validated or debited
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BetRequest {
    pub stake: Stake,
    pub target: BetTarget,
}

impl BetRequest {
    pub fn fixed(amount: Coins, target: BetTarget) -> Self {
        Self {
            stake: Stake::Fixed(amount),
            target,
        }
    }
}

/// A placed bet whose stake has already been debited
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bet {
    pub amount: Coins,
    pub target: BetTarget,
    pub owner: UserId,
    pub placed_at: u64,
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.amount, self.target)
    }
}

/// Result of one spin of the wheel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpinOutcome {
    pub number: u8,
    pub color: Color,
}

impl SpinOutcome {
    pub fn new(number: u8) -> Self {
        Self {
            number,
            color: Color::of(number),
        }
    }
}

impl fmt::Display for SpinOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.color)
    }
}

/// A bet together with its settled result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledBet {
    pub bet: Bet,
    /// Profit beyond the stake on a win, minus the stake on a loss
    pub net_profit: Coins,
    /// Amount credited back: stake + profit on a win, 0 on a loss
    pub payout: Coins,
}

impl SettledBet {
    pub fn won(&self) -> bool {
        self.payout > 0
    }
}

/// Everything one user got out of a spin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettlement {
    pub user: UserId,
    pub lines: Vec<SettledBet>,
    pub total_staked: Coins,
    pub total_net: Coins,
    /// Balance delta applied by the ledger batch
    pub credited: Coins,
}

impl UserSettlement {
    pub fn from_lines(user: UserId, lines: Vec<SettledBet>) -> Self {
        let total_staked = lines.iter().map(|l| l.bet.amount).sum();
        let total_net = lines.iter().map(|l| l.net_profit).sum();
        let credited = lines.iter().map(|l| l.payout).sum();
        Self {
            user,
            lines,
            total_staked,
            total_net,
            credited,
        }
    }
}

impl fmt::Display for UserSettlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.total_net >= 0 { "won" } else { "lost" };
        write!(f, "user {} {} {}", self.user, verdict, self.total_net.abs())?;
        for line in &self.lines {
            write!(f, "\n  {} -> {:+}", line.bet, line.net_profit)?;
        }
        Ok(())
    }
}

/// Full settlement breakdown of one spin, handed to the messaging layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinReport {
    pub spin_id: String,
    pub room: RoomId,
    pub outcome: SpinOutcome,
    pub settlements: Vec<UserSettlement>,
}

impl SpinReport {
    pub fn settlement_for(&self, user: UserId) -> Option<&UserSettlement> {
        self.settlements.iter().find(|s| s.user == user)
    }
}

impl fmt::Display for SpinReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ball landed on {}", self.outcome)?;
        for settlement in &self.settlements {
            write!(f, "\n{}", settlement)?;
        }
        Ok(())
    }
}
