//! Signals and class labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Categorical trading recommendation emitted by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Hold,
    Sell,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Buy, Signal::Hold, Signal::Sell];

    /// Canonical storage form (`BUY`, `HOLD`, `SELL`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown signal '{0}' (expected BUY, HOLD or SELL)")]
pub struct ParseSignalError(pub String);

impl FromStr for Signal {
    type Err = ParseSignalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "HOLD" => Ok(Self::Hold),
            "SELL" => Ok(Self::Sell),
            other => Err(ParseSignalError(other.to_string())),
        }
    }
}

/// Training class label derived from a forward return.
///
/// Encoded as `SELL=0`, `HOLD=1`, `BUY=2` in the trainer contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Sell = 0,
    Hold = 1,
    Buy = 2,
}

impl Label {
    /// Classify a forward return. Ties with either threshold resolve to `Hold`.
    pub fn from_forward_return(forward_return: f64, buy_threshold: f64, sell_threshold: f64) -> Self {
        if forward_return > buy_threshold {
            Self::Buy
        } else if forward_return < sell_threshold {
            Self::Sell
        } else {
            Self::Hold
        }
    }

    pub fn as_index(self) -> u8 {
        self as u8
    }
}
