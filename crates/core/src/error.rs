use std::time::Duration;
use thiserror::Error;

/// Failure kinds of the signal pipeline.
///
/// Only `SchemaMismatch` is fatal for a symbol's prediction. The upstream and verdict kinds are
/// recovered by the analyzer, which substitutes the configured neutral defaults.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    #[error("insufficient history for {symbol}: {rows} price rows, no complete feature row")]
    InsufficientHistory { symbol: String, rows: usize },

    #[error("feature schema mismatch: expected {expected} features, available {available}, missing {missing:?}")]
    SchemaMismatch {
        missing: Vec<String>,
        expected: usize,
        available: usize,
    },

    #[error("upstream {stage} timed out after {after:?}")]
    UpstreamTimeout { stage: &'static str, after: Duration },

    #[error("upstream {stage} unavailable: {detail}")]
    UpstreamUnavailable { stage: &'static str, detail: String },

    #[error("malformed sentiment verdict: {detail}")]
    MalformedVerdict { detail: String, raw: String },
}

impl SignalError {
    pub fn unavailable(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            stage,
            detail: format!("{err:#}"),
        }
    }

    /// True for the kinds the pipeline answers with neutral defaults instead of a fault.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamTimeout { .. }
                | Self::UpstreamUnavailable { .. }
                | Self::MalformedVerdict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_upstream_and_verdict_errors_degrade() {
        let timeout = SignalError::UpstreamTimeout {
            stage: "sentiment",
            after: Duration::from_secs(1),
        };
        let malformed = SignalError::MalformedVerdict {
            detail: "eof".to_string(),
            raw: "{".to_string(),
        };
        let schema = SignalError::SchemaMismatch {
            missing: vec!["RSI_14".to_string()],
            expected: 44,
            available: 43,
        };
        assert!(timeout.is_degradable());
        assert!(malformed.is_degradable());
        assert!(!schema.is_degradable());
    }

    #[test]
    fn display_names_the_stage() {
        let err = SignalError::unavailable("prices", "connection refused");
        assert_eq!(
            err.to_string(),
            "upstream prices unavailable: connection refused"
        );
    }
}
