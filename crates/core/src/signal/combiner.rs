use crate::config::RecommendationThresholds;
use crate::domain::recommendation::{CombinedSignal, Recommendation, Weights};
use crate::domain::signal::Action;
use chrono::Utc;

/// Sign of a score, zero being neutral.
pub fn direction(score: f64) -> i8 {
    if score > 0.0 {
        1
    } else if score < 0.0 {
        -1
    } else {
        0
    }
}

/// Weighted fusion. A neutral side is compatible with either direction of the other.
pub fn combine(technical_score: f64, sentiment_score: f64, weights: Weights) -> CombinedSignal {
    let combined_score = technical_score * weights.technical + sentiment_score * weights.sentiment;

    let tech = direction(technical_score);
    let sent = direction(sentiment_score);
    let signals_aligned = tech == sent || tech == 0 || sent == 0;

    CombinedSignal {
        technical_score,
        sentiment_score,
        combined_score,
        signals_aligned,
        weights,
    }
}

/// Action and confidence for a combined score.
pub fn decide(score: f64, aligned: bool, cfg: &RecommendationThresholds) -> (Action, f64) {
    if !aligned {
        return if score.abs() > cfg.conflict {
            let action = if score > 0.0 { Action::Buy } else { Action::Sell };
            (action, cfg.confidence_conflict_directional)
        } else {
            (Action::Hold, cfg.confidence_conflict_hold)
        };
    }

    if score > cfg.strong {
        (Action::StrongBuy, cfg.confidence_strong)
    } else if score > cfg.normal {
        (Action::Buy, cfg.confidence_normal)
    } else if score < -cfg.strong {
        (Action::StrongSell, cfg.confidence_strong)
    } else if score < -cfg.normal {
        (Action::Sell, cfg.confidence_normal)
    } else {
        (Action::Hold, cfg.confidence_hold)
    }
}

/// Recommendation with template reasoning; callers may replace the reasoning text.
pub fn recommend(combined: &CombinedSignal, cfg: &RecommendationThresholds) -> Recommendation {
    let (action, confidence) = decide(combined.combined_score, combined.signals_aligned, cfg);
    Recommendation {
        action,
        confidence,
        aligned: combined.signals_aligned,
        reasoning: Recommendation::template_reasoning(action, confidence),
        timestamp: Utc::now(),
        degraded: false,
    }
}
