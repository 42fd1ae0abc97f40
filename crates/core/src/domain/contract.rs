use crate::domain::sentiment::{SentimentLabel, SentimentVerdict};
use crate::error::SignalError;
use serde::{Deserialize, Serialize};

/// Sentiment verdict as emitted by the language model. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSentimentVerdict {
    #[serde(default, alias = "label")]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub key_factors: Option<Vec<String>>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl LlmSentimentVerdict {
    /// Fills missing keys with neutral defaults and clamps out-of-range numbers.
    pub fn validate_and_into_verdict(
        self,
        default_confidence: f64,
    ) -> Result<SentimentVerdict, SignalError> {
        let label = self
            .sentiment
            .as_deref()
            .map(SentimentLabel::parse_lenient)
            .unwrap_or(SentimentLabel::Neutral);

        let score = self.score.unwrap_or(0.0);
        let confidence = self.confidence.unwrap_or(default_confidence);

        let key_factors = self
            .key_factors
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let reasoning = self
            .reasoning
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No reasoning provided".to_string());

        validate_verdict(SentimentVerdict {
            label,
            score,
            confidence,
            key_factors,
            reasoning,
        })
    }
}

/// Range check shared by every sentiment source.
///
/// Non-finite numbers are malformed; finite out-of-range numbers are clamped.
pub fn validate_verdict(mut verdict: SentimentVerdict) -> Result<SentimentVerdict, SignalError> {
    if !verdict.score.is_finite() || !verdict.confidence.is_finite() {
        return Err(SignalError::MalformedVerdict {
            detail: format!(
                "non-finite score/confidence ({}/{})",
                verdict.score, verdict.confidence
            ),
            raw: format!("{verdict:?}"),
        });
    }

    if !(-100.0..=100.0).contains(&verdict.score) {
        tracing::warn!(score = verdict.score, "sentiment score out of range; clamping");
        verdict.score = verdict.score.clamp(-100.0, 100.0);
    }
    if !(0.0..=1.0).contains(&verdict.confidence) {
        tracing::warn!(
            confidence = verdict.confidence,
            "sentiment confidence out of range; clamping"
        );
        verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
    }

    Ok(verdict)
}
