use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading call shared by the technical signal and the final recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "STRONG BUY")]
    StrongBuy,
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "HOLD")]
    Hold,
    #[serde(rename = "SELL")]
    Sell,
    #[serde(rename = "STRONG SELL")]
    StrongSell,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StrongBuy => "STRONG BUY",
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
            Self::StrongSell => "STRONG SELL",
        }
    }

    /// Lenient label parsing: case-insensitive, `_`/`-` accepted as separators.
    /// Anything unrecognized is HOLD.
    pub fn parse_lenient(label: &str) -> Self {
        let normalized = label
            .trim()
            .to_ascii_uppercase()
            .replace(['_', '-'], " ");
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "STRONG BUY" => Self::StrongBuy,
            "BUY" => Self::Buy,
            "SELL" => Self::Sell,
            "STRONG SELL" => Self::StrongSell,
            _ => Self::Hold,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Uncertain,
}

impl Trend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Uncertain => "UNCERTAIN",
        }
    }
}

/// Model verdict for one symbol-day, expressed as a trading call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSignal {
    pub label: Action,
    pub trend: Trend,
    pub pct_change: f64,
    pub current_price: f64,
    pub predicted_price: f64,
    /// Probability of the called direction (max of both when uncertain).
    pub confidence: f64,
    #[serde(default = "default_rsi")]
    pub rsi: f64,
}

pub fn default_rsi() -> f64 {
    50.0
}
