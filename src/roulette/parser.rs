//! Bet text parser
//!
//! Turns free-form chat text such as `"1k red, 500 7 and 200 q2"` into bet
//! requests. Parsing is all-or-nothing: a single malformed segment makes the
//! whole message yield no bets, so callers can treat it as a plain no-op.

use crate::roulette::types::{BetRequest, BetTarget, Color, Stake, CANONICAL_QUARTERS};

const ALL_IN_WORDS: &[&str] = &["all", "allin", "all-in", "vabank", "вабанк", "ва-банк"];
const SEGMENT_WORDS: &[&str] = &["and", "и", "&"];

const RED_WORDS: &[&str] = &["red", "r", "к", "кр", "красное", "красный"];
const BLACK_WORDS: &[&str] = &["black", "b", "ч", "чер", "черное", "чёрное", "черный", "чёрный"];
const GREEN_WORDS: &[&str] = &["green", "g", "zero", "z", "з", "зеро", "зеленое", "зелёное"];

/// Parse a chat message into bet requests; empty when nothing valid was found
pub fn parse(text: &str) -> Vec<BetRequest> {
    let normalized = text.to_lowercase().replace([',', ';'], " , ");

    let mut bets = Vec::new();
    let mut segment: Vec<&str> = Vec::new();

    for token in normalized.split_whitespace() {
        if token == "," || SEGMENT_WORDS.contains(&token) {
            if !segment.is_empty() {
                match parse_segment(&segment) {
                    Some(bet) => bets.push(bet),
                    None => return Vec::new(),
                }
                segment.clear();
            }
            continue;
        }
        segment.push(token);
    }

    if !segment.is_empty() {
        match parse_segment(&segment) {
            Some(bet) => bets.push(bet),
            None => return Vec::new(),
        }
    }

    bets
}

fn parse_segment(tokens: &[&str]) -> Option<BetRequest> {
    let [amount, target] = tokens else {
        return None;
    };
    Some(BetRequest {
        stake: parse_stake(amount)?,
        target: parse_target(target)?,
    })
}

/// `500`, `2k`, `1.5k`, `3kk`, `all`
pub fn parse_stake(token: &str) -> Option<Stake> {
    if ALL_IN_WORDS.contains(&token) {
        return Some(Stake::AllIn);
    }

    let (digits, multiplier, scale) = if let Some(d) = strip_any(token, &["kk", "кк", "m"]) {
        (d, 1_000_000i64, 6usize)
    } else if let Some(d) = strip_any(token, &["k", "к"]) {
        (d, 1_000i64, 3usize)
    } else {
        (token, 1i64, 0usize)
    };

    let amount = match digits.split_once('.') {
        Some((whole, frac)) => {
            if scale == 0 || frac.is_empty() || frac.len() > scale || !is_digits(whole) || !is_digits(frac) {
                return None;
            }
            let whole: i64 = whole.parse().ok()?;
            let frac_value: i64 = frac.parse().ok()?;
            let frac_unit = 10i64.pow((scale - frac.len()) as u32);
            whole.checked_mul(multiplier)?.checked_add(frac_value * frac_unit)?
        }
        None => {
            if !is_digits(digits) {
                return None;
            }
            digits.parse::<i64>().ok()?.checked_mul(multiplier)?
        }
    };

    Some(Stake::Fixed(amount))
}

/// `red`, `b`, `0`, `7`, `4-6`, `q3`
pub fn parse_target(token: &str) -> Option<BetTarget> {
    if RED_WORDS.contains(&token) {
        return Some(BetTarget::color(Color::Red));
    }
    if BLACK_WORDS.contains(&token) {
        return Some(BetTarget::color(Color::Black));
    }
    if GREEN_WORDS.contains(&token) {
        return Some(BetTarget::color(Color::Green));
    }

    if let Some(index) = token.strip_prefix('q') {
        let index: usize = index.parse().ok()?;
        let (start, end) = *CANONICAL_QUARTERS.get(index.checked_sub(1)?)?;
        return BetTarget::range(start, end);
    }

    if let Some((start, end)) = token.split_once('-') {
        if !is_digits(start) || !is_digits(end) {
            return None;
        }
        return BetTarget::range(start.parse().ok()?, end.parse().ok()?);
    }

    if is_digits(token) {
        return BetTarget::number(token.parse().ok()?);
    }

    None
}

fn strip_any<'a>(token: &'a str, suffixes: &[&str]) -> Option<&'a str> {
    suffixes.iter().find_map(|s| token.strip_suffix(s))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
