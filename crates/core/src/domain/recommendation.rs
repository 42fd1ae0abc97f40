use crate::domain::signal::Action;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub technical: f64,
    pub sentiment: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            technical: 0.6,
            sentiment: 0.4,
        }
    }
}

impl Weights {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.technical.is_finite() && self.sentiment.is_finite(),
            "weights must be finite"
        );
        anyhow::ensure!(
            self.technical >= 0.0 && self.sentiment >= 0.0,
            "weights must be non-negative (got {}/{})",
            self.technical,
            self.sentiment
        );
        anyhow::ensure!(
            self.technical + self.sentiment > 0.0,
            "at least one weight must be positive"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSignal {
    pub technical_score: f64,
    pub sentiment_score: f64,
    pub combined_score: f64,
    pub signals_aligned: bool,
    pub weights: Weights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: Action,
    pub confidence: f64,
    pub aligned: bool,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
    /// Built from fallback inputs; confidence is capped for such recommendations.
    #[serde(default)]
    pub degraded: bool,
}

impl Recommendation {
    pub fn template_reasoning(action: Action, confidence: f64) -> String {
        format!(
            "Combined analysis suggests {action} with {:.0}% confidence.",
            confidence * 100.0
        )
    }

    /// Marks the recommendation as built from fallback inputs and caps its confidence.
    ///
    /// Template reasoning is rewritten for the capped confidence; narrated text is kept.
    pub fn mark_degraded(&mut self, cap: f64) {
        let templated = self.reasoning == Self::template_reasoning(self.action, self.confidence);
        self.degraded = true;
        self.confidence = self.confidence.min(cap);
        if templated {
            self.reasoning = Self::template_reasoning(self.action, self.confidence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_reasoning_formats_percent() {
        assert_eq!(
            Recommendation::template_reasoning(Action::Buy, 0.75),
            "Combined analysis suggests BUY with 75% confidence."
        );
    }

    #[test]
    fn mark_degraded_caps_confidence() {
        let mut rec = Recommendation {
            action: Action::StrongBuy,
            confidence: 0.95,
            aligned: true,
            reasoning: String::new(),
            timestamp: Utc::now(),
            degraded: false,
        };
        rec.mark_degraded(0.5);
        assert!(rec.degraded);
        assert_eq!(rec.confidence, 0.5);

        rec.confidence = 0.4;
        rec.mark_degraded(0.5);
        assert_eq!(rec.confidence, 0.4);
    }

    #[test]
    fn mark_degraded_rewrites_template_reasoning() {
        let mut rec = Recommendation {
            action: Action::Hold,
            confidence: 0.6,
            aligned: false,
            reasoning: Recommendation::template_reasoning(Action::Hold, 0.6),
            timestamp: Utc::now(),
            degraded: false,
        };
        rec.mark_degraded(0.5);
        assert_eq!(rec.reasoning, "Combined analysis suggests HOLD with 50% confidence.");

        rec.reasoning = "Sentiment feed was down; holding.".to_string();
        rec.confidence = 0.9;
        rec.mark_degraded(0.5);
        assert_eq!(rec.reasoning, "Sentiment feed was down; holding.");
    }
}
