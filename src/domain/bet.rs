//! Bets, roll outcomes and the round state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolDecodeError;

/// Side of the odd/even wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Choice {
    /// Wins on 1, 3, 5.
    Odd,
    /// Wins on 2, 4, 6.
    Even,
}

impl Choice {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Odd => "ODD",
            Self::Even => "EVEN",
        }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Choice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ODD" => Ok(Self::Odd),
            "EVEN" => Ok(Self::Even),
            other => Err(format!("invalid choice {other:?} (ODD or EVEN)")),
        }
    }
}

/// Server verdict for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundResult {
    /// The bet is credited.
    Win,
    /// The bet is debited.
    Lose,
}

impl RoundResult {
    /// Signed balance delta for a bet of `amount`.
    #[must_use]
    pub const fn delta(&self, amount: i64) -> i64 {
        match self {
            Self::Win => amount,
            Self::Lose => -amount,
        }
    }
}

impl fmt::Display for RoundResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Win => f.write_str("WIN"),
            Self::Lose => f.write_str("LOSE"),
        }
    }
}

/// A validated server roll: die face 1..=6 plus the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollOutcome {
    roll: u8,
    result: RoundResult,
}

impl RollOutcome {
    /// Validates a raw roll value.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolDecodeError::RollOutOfRange`] unless `roll` is a
    /// die face.
    pub fn new(roll: i64, result: RoundResult) -> Result<Self, ProtocolDecodeError> {
        match u8::try_from(roll) {
            Ok(face @ 1..=6) => Ok(Self { roll: face, result }),
            _ => Err(ProtocolDecodeError::RollOutOfRange(roll)),
        }
    }

    /// Die face.
    #[must_use]
    pub const fn roll(&self) -> u8 {
        self.roll
    }

    /// Verdict.
    #[must_use]
    pub const fn result(&self) -> RoundResult {
        self.result
    }
}

/// Lifecycle of a single bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    /// Sent, waiting for `ROLL`.
    Pending,
    /// `ROLL` received and applied.
    Resolved,
    /// Dropped without resolution (connection closed or timed out).
    Abandoned,
}

/// One wager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bet {
    /// Points at stake.
    pub amount: i64,
    /// Side chosen.
    pub choice: Choice,
    /// Current status.
    pub status: BetStatus,
}

impl Bet {
    /// Creates a pending bet.
    #[must_use]
    pub const fn pending(amount: i64, choice: Choice) -> Self {
        Self {
            amount,
            choice,
            status: BetStatus::Pending,
        }
    }
}

/// Clamps `requested` into `1..=balance`, or `None` when `balance < 1`.
#[must_use]
pub fn clamp_bet(requested: i64, balance: i64) -> Option<i64> {
    (balance >= 1).then(|| requested.clamp(1, balance))
}

/// Round state of the bet controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BetState {
    /// Ready to accept a bet.
    #[default]
    Idle,
    /// `PLAY` sent, waiting for the matching `ROLL`.
    AwaitingResult,
}

impl fmt::Display for BetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::AwaitingResult => f.write_str("awaiting_result"),
        }
    }
}
