use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    Neutral,
}

impl SentimentLabel {
    /// Unknown labels read as NEUTRAL.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "BULLISH" => Self::Bullish,
            "BEARISH" => Self::Bearish,
            _ => Self::Neutral,
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bullish => "BULLISH",
            Self::Bearish => "BEARISH",
            Self::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// News sentiment for one asset, score already on the -100..=100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentVerdict {
    pub label: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
    pub key_factors: Vec<String>,
    pub reasoning: String,
}

impl SentimentVerdict {
    pub fn neutral(confidence: f64, key_factors: Vec<String>, reasoning: impl Into<String>) -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
            confidence,
            key_factors,
            reasoning: reasoning.into(),
        }
    }
}
