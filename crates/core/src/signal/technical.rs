use crate::config::{PredictionThresholds, TechnicalScoreConfig};
use crate::domain::signal::{Action, TechnicalSignal, Trend};

/// Maps a technical call and its expected % change onto -100..=100.
///
/// Directional labels saturate at their cap; HOLD (and any label parsed leniently to HOLD) is
/// the bare scaled change and is not clamped.
pub fn technical_score(label: Action, pct_change: f64, cfg: &TechnicalScoreConfig) -> f64 {
    let pct_change = if pct_change.is_finite() {
        pct_change
    } else {
        tracing::warn!(pct_change, "non-finite pct_change; scoring as 0");
        0.0
    };
    let scaled = pct_change * cfg.multiplier;
    match label {
        Action::StrongBuy => (cfg.strong_base + scaled).min(cfg.strong_cap),
        Action::Buy => (cfg.base + scaled).min(cfg.cap),
        Action::Hold => scaled,
        Action::Sell => (-cfg.base + scaled).max(-cfg.cap),
        Action::StrongSell => (-cfg.strong_base + scaled).max(-cfg.strong_cap),
    }
}

/// Turns `[p_down, p_up]` into a technical call with its placeholder expected move.
pub fn classify(
    probabilities: [f64; 2],
    current_price: f64,
    rsi: Option<f64>,
    cfg: &PredictionThresholds,
) -> TechnicalSignal {
    let [p_down, p_up] = probabilities;

    let (label, trend, pct_change, confidence) = if p_up >= cfg.up_probability {
        (Action::Buy, Trend::Up, cfg.up_pct, p_up)
    } else if p_down >= cfg.down_probability {
        (Action::Sell, Trend::Down, cfg.down_pct, p_down)
    } else {
        (Action::Hold, Trend::Uncertain, cfg.neutral_pct, p_up.max(p_down))
    };

    TechnicalSignal {
        label,
        trend,
        pct_change,
        current_price,
        predicted_price: current_price * (1.0 + pct_change / 100.0),
        confidence,
        rsi: rsi.unwrap_or_else(crate::domain::signal::default_rsi),
    }
}
