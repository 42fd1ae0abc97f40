//! Client risk profiling: a rule-based score, or a trained model when one is configured.

pub mod softmax;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use softmax::SoftmaxSegmentModel;

const PRUDENT_BELOW: f64 = 3.5;
const BALANCED_BELOW: f64 = 7.0;
const MAX_SCORE: f64 = 10.0;

/// Number of values in [`ClientProfile::feature_vector`].
pub const SEGMENT_FEATURES: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(alias = "montant_investi")]
    pub invested_amount: f64,
    /// Trades per month.
    #[serde(alias = "freq_trading")]
    pub trading_frequency: f64,
    /// Annualized, as a fraction (0.25 = 25%).
    #[serde(alias = "volatilite_portefeuille")]
    pub portfolio_volatility: f64,
    #[serde(alias = "periode_detention_moy")]
    pub avg_holding_days: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InteractionFeatures {
    pub freq_x_volatility: f64,
    pub amount_x_volatility: f64,
    pub freq_over_holding: f64,
}

impl ClientProfile {
    fn validate(&self) -> anyhow::Result<()> {
        for (name, v) in [
            ("invested_amount", self.invested_amount),
            ("trading_frequency", self.trading_frequency),
            ("portfolio_volatility", self.portfolio_volatility),
            ("avg_holding_days", self.avg_holding_days),
        ] {
            anyhow::ensure!(v.is_finite() && v >= 0.0, "{name} must be a non-negative number (got {v})");
        }
        Ok(())
    }

    pub fn interactions(&self) -> InteractionFeatures {
        InteractionFeatures {
            freq_x_volatility: self.trading_frequency * self.portfolio_volatility,
            amount_x_volatility: self.invested_amount * self.portfolio_volatility,
            freq_over_holding: self.trading_frequency / (self.avg_holding_days + 1.0),
        }
    }

    /// Raw fields followed by the interaction features.
    pub fn feature_vector(&self) -> [f64; SEGMENT_FEATURES] {
        let i = self.interactions();
        [
            self.invested_amount,
            self.trading_frequency,
            self.portfolio_volatility,
            self.avg_holding_days,
            i.freq_x_volatility,
            i.amount_x_volatility,
            i.freq_over_holding,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskSegment {
    Prudent,
    Balanced,
    Adventurous,
}

impl RiskSegment {
    pub fn from_score(score: f64) -> Self {
        if score < PRUDENT_BELOW {
            Self::Prudent
        } else if score < BALANCED_BELOW {
            Self::Balanced
        } else {
            Self::Adventurous
        }
    }

    pub fn risk_level(self) -> RiskLevel {
        match self {
            Self::Prudent => RiskLevel::Low,
            Self::Balanced => RiskLevel::Moderate,
            Self::Adventurous => RiskLevel::High,
        }
    }

    fn probabilities(self) -> SegmentProbabilities {
        let (prudent, balanced, adventurous) = match self {
            Self::Prudent => (0.85, 0.12, 0.03),
            Self::Balanced => (0.15, 0.75, 0.10),
            Self::Adventurous => (0.05, 0.15, 0.80),
        };
        SegmentProbabilities {
            prudent,
            balanced,
            adventurous,
        }
    }

    fn advice(self) -> &'static [&'static str] {
        match self {
            Self::Prudent => &[
                "Keep a conservative investment strategy",
                "Favor stable, low-volatility assets",
                "Consider diversifying gradually",
                "Raise risk exposure slightly if goals are long-term",
            ],
            Self::Balanced => &[
                "Risk and return are appropriately balanced",
                "Monitor portfolio volatility regularly",
                "Consider a 60/40 stable/dynamic allocation",
                "Review the strategy every quarter",
            ],
            Self::Adventurous => &[
                "High risk level: monitor closely",
                "Diversify to reduce risk concentration",
                "Set stop-losses to limit drawdowns",
                "Allocate part of the portfolio to less volatile assets",
                "Consider a more balanced approach for stability",
            ],
        }
    }
}

impl fmt::Display for RiskSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prudent => "Prudent",
            Self::Balanced => "Balanced",
            Self::Adventurous => "Adventurous",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentProbabilities {
    pub prudent: f64,
    pub balanced: f64,
    pub adventurous: f64,
}

impl SegmentProbabilities {
    fn most_likely(&self) -> (RiskSegment, f64) {
        [
            (RiskSegment::Prudent, self.prudent),
            (RiskSegment::Balanced, self.balanced),
            (RiskSegment::Adventurous, self.adventurous),
        ]
        .into_iter()
        .fold((RiskSegment::Prudent, f64::MIN), |best, cur| {
            if cur.1 > best.1 {
                cur
            } else {
                best
            }
        })
    }

    fn normalized(self) -> anyhow::Result<Self> {
        let parts = [self.prudent, self.balanced, self.adventurous];
        anyhow::ensure!(
            parts.iter().all(|p| p.is_finite() && *p >= 0.0),
            "segment probabilities must be finite and non-negative: {self:?}"
        );
        let total: f64 = parts.iter().sum();
        anyhow::ensure!(total > 0.0, "segment probabilities sum to zero");
        Ok(Self {
            prudent: self.prudent / total,
            balanced: self.balanced / total,
            adventurous: self.adventurous / total,
        })
    }
}

/// A trained segment classifier over [`ClientProfile::feature_vector`].
pub trait SegmentModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, features: &[f64; SEGMENT_FEATURES]) -> anyhow::Result<SegmentProbabilities>;
}

pub enum SegmentationStrategy {
    Trained(Box<dyn SegmentModel>),
    RuleBased,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestedActions {
    pub immediate: Vec<String>,
    pub short_term: Vec<String>,
    pub long_term: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentAssessment {
    pub segment: RiskSegment,
    /// Rule score on 0..=10, two decimals.
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub probabilities: SegmentProbabilities,
    pub interactions: InteractionFeatures,
    pub recommendations: Vec<String>,
    pub suggested_actions: SuggestedActions,
}

/// `volatility/0.5·4 + frequency/50·3 + (100 − holding)/100·3`, capped at 10.
pub fn rule_score(profile: &ClientProfile) -> f64 {
    let score = profile.portfolio_volatility / 0.5 * 4.0
        + profile.trading_frequency / 50.0 * 3.0
        + (100.0 - profile.avg_holding_days) / 100.0 * 3.0;
    (score.min(MAX_SCORE) * 100.0).round() / 100.0
}

impl SegmentationStrategy {
    pub fn assess(&self, profile: &ClientProfile) -> anyhow::Result<SegmentAssessment> {
        profile.validate()?;
        let risk_score = rule_score(profile);

        let probabilities = match self {
            Self::RuleBased => RiskSegment::from_score(risk_score).probabilities(),
            Self::Trained(model) => {
                let raw = model.predict(&profile.feature_vector())?;
                let p = raw.normalized()?;
                tracing::debug!(model = model.name(), ?p, "segment model prediction");
                p
            }
        };
        let (segment, confidence) = probabilities.most_likely();

        let recommendations = recommendations(segment, profile);
        let suggested_actions = split_actions(&recommendations);

        Ok(SegmentAssessment {
            segment,
            risk_score,
            risk_level: segment.risk_level(),
            confidence,
            probabilities,
            interactions: profile.interactions(),
            recommendations,
            suggested_actions,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::RuleBased => "rule_based",
            Self::Trained(model) => model.name(),
        }
    }
}

fn recommendations(segment: RiskSegment, profile: &ClientProfile) -> Vec<String> {
    let mut out: Vec<String> = segment.advice().iter().map(|s| s.to_string()).collect();
    if profile.portfolio_volatility > 0.4 {
        out.push("High volatility detected: consider reducing exposure".to_string());
    }
    if profile.trading_frequency > 40.0 {
        out.push("High trading frequency: watch transaction costs".to_string());
    }
    if profile.avg_holding_days < 20.0 {
        out.push("Short holding period: adopt a longer-term view".to_string());
    }
    out
}

fn split_actions(recommendations: &[String]) -> SuggestedActions {
    let slice = |from: usize, to: usize| -> Vec<String> {
        let to = to.min(recommendations.len());
        recommendations.get(from..to).map(<[String]>::to_vec).unwrap_or_default()
    };
    SuggestedActions {
        immediate: slice(0, 2),
        short_term: slice(2, 4),
        long_term: slice(4, recommendations.len()),
    }
}
