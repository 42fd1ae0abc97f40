use crate::domain::recommendation::Weights;
use anyhow::Context;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub price_provider_base_url: Option<String>,
    pub price_provider_api_key: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub news_base_url: Option<String>,
    pub sentry_dsn: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            price_provider_base_url: std::env::var("PRICE_PROVIDER_BASE_URL").ok(),
            price_provider_api_key: std::env::var("PRICE_PROVIDER_API_KEY").ok(),
            ollama_url: std::env::var("OLLAMA_URL").ok(),
            ollama_model: std::env::var("OLLAMA_MODEL").ok(),
            news_base_url: std::env::var("NEWS_BASE_URL").ok(),
            sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            model_dir: std::env::var("MODEL_DIR").ok().map(PathBuf::from),
            history_path: std::env::var("HISTORY_PATH").ok().map(PathBuf::from),
        })
    }

    pub fn require_price_provider_base_url(&self) -> anyhow::Result<&str> {
        self.price_provider_base_url
            .as_deref()
            .context("PRICE_PROVIDER_BASE_URL is required")
    }

    pub fn require_model_dir(&self) -> anyhow::Result<&std::path::Path> {
        self.model_dir.as_deref().context("MODEL_DIR is required")
    }

    pub fn require_history_path(&self) -> anyhow::Result<&std::path::Path> {
        self.history_path
            .as_deref()
            .context("HISTORY_PATH is required")
    }
}

/// Linear mapping from a discrete technical label plus expected % change to a score.
///
/// The ×4 multiplier and the bases are inherited tuning values, not derived ones.
#[derive(Debug, Clone, PartialEq)]
pub struct TechnicalScoreConfig {
    pub multiplier: f64,
    pub strong_base: f64,
    pub strong_cap: f64,
    pub base: f64,
    pub cap: f64,
}

impl Default for TechnicalScoreConfig {
    fn default() -> Self {
        Self {
            multiplier: 4.0,
            strong_base: 80.0,
            strong_cap: 100.0,
            base: 40.0,
            cap: 80.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationThresholds {
    /// Aligned scores above this are STRONG BUY (below its negation, STRONG SELL).
    pub strong: f64,
    /// Aligned scores above this are BUY (below its negation, SELL).
    pub normal: f64,
    /// Conflicting signals still yield BUY/SELL when |score| exceeds this.
    pub conflict: f64,
    pub confidence_strong: f64,
    pub confidence_normal: f64,
    pub confidence_hold: f64,
    pub confidence_conflict_directional: f64,
    pub confidence_conflict_hold: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            strong: 60.0,
            normal: 30.0,
            conflict: 40.0,
            confidence_strong: 0.95,
            confidence_normal: 0.75,
            confidence_hold: 0.60,
            confidence_conflict_directional: 0.50,
            confidence_conflict_hold: 0.40,
        }
    }
}

/// Probability cut-offs and the placeholder % moves attached to each technical call.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionThresholds {
    pub up_probability: f64,
    pub down_probability: f64,
    pub up_pct: f64,
    pub down_pct: f64,
    pub neutral_pct: f64,
}

impl Default for PredictionThresholds {
    fn default() -> Self {
        Self {
            up_probability: 0.70,
            down_probability: 0.70,
            up_pct: 2.5,
            down_pct: -2.5,
            neutral_pct: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentDefaults {
    /// Confidence of the neutral verdict used when there is nothing to analyze.
    pub absent_confidence: f64,
    /// Confidence of the neutral verdict substituted after a failed or malformed call.
    pub degraded_confidence: f64,
}

impl Default for SentimentDefaults {
    fn default() -> Self {
        Self {
            absent_confidence: 0.5,
            degraded_confidence: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub weights: Weights,
    pub technical: TechnicalScoreConfig,
    pub recommendation: RecommendationThresholds,
    pub prediction: PredictionThresholds,
    pub sentiment: SentimentDefaults,
    /// Upper bound on the confidence of any recommendation built from degraded inputs.
    pub degraded_confidence_cap: f64,
    pub upstream_timeout: Duration,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            technical: TechnicalScoreConfig::default(),
            recommendation: RecommendationThresholds::default(),
            prediction: PredictionThresholds::default(),
            sentiment: SentimentDefaults::default(),
            degraded_confidence_cap: 0.5,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

impl SignalConfig {
    /// Defaults overridden by any `SIGNAL_*` variable that parses.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut out = Self::default();
        let set = |key: &str, slot: &mut f64| override_from(&lookup, key, slot);

        set("SIGNAL_TECH_WEIGHT", &mut out.weights.technical);
        set("SIGNAL_SENTIMENT_WEIGHT", &mut out.weights.sentiment);

        let tech = &mut out.technical;
        set("SIGNAL_TECH_MULTIPLIER", &mut tech.multiplier);
        set("SIGNAL_TECH_STRONG_BASE", &mut tech.strong_base);
        set("SIGNAL_TECH_STRONG_CAP", &mut tech.strong_cap);
        set("SIGNAL_TECH_BASE", &mut tech.base);
        set("SIGNAL_TECH_CAP", &mut tech.cap);

        let rec = &mut out.recommendation;
        set("SIGNAL_STRONG_THRESHOLD", &mut rec.strong);
        set("SIGNAL_NORMAL_THRESHOLD", &mut rec.normal);
        set("SIGNAL_CONFLICT_THRESHOLD", &mut rec.conflict);
        set("SIGNAL_CONFIDENCE_STRONG", &mut rec.confidence_strong);
        set("SIGNAL_CONFIDENCE_NORMAL", &mut rec.confidence_normal);
        set("SIGNAL_CONFIDENCE_HOLD", &mut rec.confidence_hold);
        set(
            "SIGNAL_CONFIDENCE_CONFLICT_DIRECTIONAL",
            &mut rec.confidence_conflict_directional,
        );
        set("SIGNAL_CONFIDENCE_CONFLICT_HOLD", &mut rec.confidence_conflict_hold);

        let pred = &mut out.prediction;
        set("SIGNAL_UP_PROBABILITY", &mut pred.up_probability);
        set("SIGNAL_DOWN_PROBABILITY", &mut pred.down_probability);
        set("SIGNAL_UP_PCT", &mut pred.up_pct);
        set("SIGNAL_DOWN_PCT", &mut pred.down_pct);
        set("SIGNAL_NEUTRAL_PCT", &mut pred.neutral_pct);

        let sent = &mut out.sentiment;
        set("SIGNAL_SENTIMENT_ABSENT_CONFIDENCE", &mut sent.absent_confidence);
        set("SIGNAL_SENTIMENT_DEGRADED_CONFIDENCE", &mut sent.degraded_confidence);

        set(
            "SIGNAL_DEGRADED_CONFIDENCE_CAP",
            &mut out.degraded_confidence_cap,
        );

        let mut timeout_secs = out.upstream_timeout.as_secs();
        override_from(&lookup, "SIGNAL_UPSTREAM_TIMEOUT_SECS", &mut timeout_secs);
        out.upstream_timeout = Duration::from_secs(timeout_secs);

        out.validate()?;
        Ok(out)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.weights.validate()?;
        let rec = &self.recommendation;
        anyhow::ensure!(
            rec.normal <= rec.strong,
            "normal threshold ({}) must not exceed strong threshold ({})",
            rec.normal,
            rec.strong
        );

        let tech = &self.technical;
        let pred = &self.prediction;
        let finite = [
            ("technical multiplier", tech.multiplier),
            ("technical strong base", tech.strong_base),
            ("technical strong cap", tech.strong_cap),
            ("technical base", tech.base),
            ("technical cap", tech.cap),
            ("strong threshold", rec.strong),
            ("normal threshold", rec.normal),
            ("conflict threshold", rec.conflict),
            ("up move", pred.up_pct),
            ("down move", pred.down_pct),
            ("neutral move", pred.neutral_pct),
        ];
        for (name, value) in finite {
            anyhow::ensure!(value.is_finite(), "{name} must be finite (got {value})");
        }

        let unit = [
            ("strong confidence", rec.confidence_strong),
            ("normal confidence", rec.confidence_normal),
            ("hold confidence", rec.confidence_hold),
            ("conflict directional confidence", rec.confidence_conflict_directional),
            ("conflict hold confidence", rec.confidence_conflict_hold),
            ("up probability", pred.up_probability),
            ("down probability", pred.down_probability),
            ("absent sentiment confidence", self.sentiment.absent_confidence),
            ("degraded sentiment confidence", self.sentiment.degraded_confidence),
            ("degraded confidence cap", self.degraded_confidence_cap),
        ];
        for (name, value) in unit {
            anyhow::ensure!(
                (0.0..=1.0).contains(&value),
                "{name} must be in [0, 1] (got {value})"
            );
        }

        anyhow::ensure!(
            !self.upstream_timeout.is_zero(),
            "upstream timeout must be positive"
        );
        Ok(())
    }
}

fn override_from<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(s) = lookup(key) {
        match s.trim().parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %s, "ignoring unparseable config override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_tuning() {
        let cfg = SignalConfig::default();
        assert_eq!(cfg.weights.technical, 0.6);
        assert_eq!(cfg.weights.sentiment, 0.4);
        assert_eq!(cfg.technical.multiplier, 4.0);
        assert_eq!(cfg.recommendation.strong, 60.0);
        assert_eq!(cfg.prediction.up_probability, 0.70);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut cfg = SignalConfig::default();
        cfg.recommendation.normal = 70.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_weights() {
        let mut cfg = SignalConfig::default();
        cfg.weights = Weights {
            technical: 0.0,
            sentiment: 0.0,
        };
        assert!(cfg.validate().is_err());
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn every_tunable_has_an_override() {
        let cfg = SignalConfig::from_lookup(lookup(&[
            ("SIGNAL_TECH_STRONG_BASE", "70"),
            ("SIGNAL_TECH_STRONG_CAP", "90"),
            ("SIGNAL_TECH_BASE", "35"),
            ("SIGNAL_TECH_CAP", "75"),
            ("SIGNAL_CONFIDENCE_STRONG", "0.9"),
            ("SIGNAL_CONFIDENCE_NORMAL", "0.7"),
            ("SIGNAL_CONFIDENCE_HOLD", "0.55"),
            ("SIGNAL_CONFIDENCE_CONFLICT_DIRECTIONAL", "0.45"),
            ("SIGNAL_CONFIDENCE_CONFLICT_HOLD", "0.35"),
            ("SIGNAL_SENTIMENT_ABSENT_CONFIDENCE", "0.6"),
            ("SIGNAL_SENTIMENT_DEGRADED_CONFIDENCE", "0.2"),
            ("SIGNAL_UPSTREAM_TIMEOUT_SECS", "5"),
            ("SIGNAL_TECH_WEIGHT", " 0.7 "),
        ]))
        .unwrap();

        assert_eq!(cfg.weights.technical, 0.7);
        assert_eq!(
            cfg.technical,
            TechnicalScoreConfig {
                multiplier: 4.0,
                strong_base: 70.0,
                strong_cap: 90.0,
                base: 35.0,
                cap: 75.0,
            }
        );
        let rec = &cfg.recommendation;
        assert_eq!(rec.confidence_strong, 0.9);
        assert_eq!(rec.confidence_normal, 0.7);
        assert_eq!(rec.confidence_hold, 0.55);
        assert_eq!(rec.confidence_conflict_directional, 0.45);
        assert_eq!(rec.confidence_conflict_hold, 0.35);
        assert_eq!(cfg.sentiment.absent_confidence, 0.6);
        assert_eq!(cfg.sentiment.degraded_confidence, 0.2);
        assert_eq!(cfg.upstream_timeout, Duration::from_secs(5));
    }

    #[test]
    fn unparseable_override_keeps_default() {
        let cfg = SignalConfig::from_lookup(lookup(&[("SIGNAL_CONFIDENCE_HOLD", "high")])).unwrap();
        assert_eq!(cfg.recommendation.confidence_hold, 0.60);
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let err = SignalConfig::from_lookup(lookup(&[("SIGNAL_CONFIDENCE_STRONG", "1.5")])).unwrap_err();
        assert!(err.to_string().contains("strong confidence"), "{err}");

        let mut cfg = SignalConfig::default();
        cfg.sentiment.degraded_confidence = -0.1;
        assert!(cfg.validate().is_err());
        cfg = SignalConfig::default();
        cfg.technical.cap = f64::NAN;
        assert!(cfg.validate().is_err());
    }
}
