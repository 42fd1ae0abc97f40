use crate::config::SentimentDefaults;
use crate::domain::contract::validate_verdict;
use crate::domain::sentiment::SentimentVerdict;
use crate::error::SignalError;
use crate::llm::error::LlmCallError;

const RAW_LOG_LIMIT: usize = 500;

/// Sentiment verdict ready for fusion, flagged when it is a fallback for a failed call.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSentiment {
    pub verdict: SentimentVerdict,
    pub degraded: bool,
}

/// Neutral verdict used when there was nothing to analyze.
pub fn absent(defaults: &SentimentDefaults) -> SentimentVerdict {
    SentimentVerdict::neutral(
        defaults.absent_confidence,
        Vec::new(),
        "No news articles available",
    )
}

/// Neutral verdict substituted for a failed, timed-out or unparseable provider call.
pub fn fallback(defaults: &SentimentDefaults, err: &anyhow::Error) -> SentimentVerdict {
    match err.downcast_ref::<SignalError>() {
        Some(SignalError::MalformedVerdict { detail, raw }) => {
            tracing::warn!(
                %detail,
                raw = %truncate(raw, RAW_LOG_LIMIT),
                "sentiment verdict could not be parsed; using neutral default"
            );
            SentimentVerdict::neutral(
                defaults.degraded_confidence,
                vec!["Unable to parse AI response".to_string()],
                "AI response could not be parsed as valid JSON",
            )
        }
        _ => {
            if let Some(call) = err.downcast_ref::<LlmCallError>() {
                tracing::warn!(
                    provider = ?call.provider,
                    stage = call.stage.as_str(),
                    status = ?call.status,
                    body = %call.body_excerpt,
                    "sentiment provider returned an unusable response"
                );
            }
            tracing::warn!(error = %err, "sentiment analysis failed; using neutral default");
            SentimentVerdict::neutral(
                defaults.degraded_confidence,
                Vec::new(),
                format!("Error in analysis: {err}"),
            )
        }
    }
}

/// Validates a provider result, or replaces it with the degraded default.
pub fn normalize(
    result: anyhow::Result<SentimentVerdict>,
    defaults: &SentimentDefaults,
) -> NormalizedSentiment {
    let result = result.and_then(|v| validate_verdict(v).map_err(anyhow::Error::from));
    match result {
        Ok(verdict) => NormalizedSentiment {
            verdict,
            degraded: false,
        },
        Err(err) => NormalizedSentiment {
            verdict: fallback(defaults, &err),
            degraded: true,
        },
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sentiment::SentimentLabel;
    use std::time::Duration;

    fn bullish() -> SentimentVerdict {
        SentimentVerdict {
            label: SentimentLabel::Bullish,
            score: 65.0,
            confidence: 0.8,
            key_factors: vec!["ETF approval".to_string()],
            reasoning: "Inflows".to_string(),
        }
    }

    #[test]
    fn valid_verdict_passes_through() {
        let out = normalize(Ok(bullish()), &SentimentDefaults::default());
        assert!(!out.degraded);
        assert_eq!(out.verdict, bullish());
    }

    #[test]
    fn timeout_degrades_to_neutral() {
        let err = anyhow::Error::from(SignalError::UpstreamTimeout {
            stage: "sentiment",
            after: Duration::from_secs(60),
        });
        let out = normalize(Err(err), &SentimentDefaults::default());
        assert!(out.degraded);
        assert_eq!(out.verdict.label, SentimentLabel::Neutral);
        assert_eq!(out.verdict.score, 0.0);
        assert_eq!(out.verdict.confidence, 0.3);
        assert!(out.verdict.reasoning.starts_with("Error in analysis"));
    }

    #[test]
    fn malformed_degrades_with_parse_factor() {
        let err = anyhow::Error::from(SignalError::MalformedVerdict {
            detail: "expected value".to_string(),
            raw: "Sure! The sentiment is bullish".to_string(),
        });
        let out = normalize(Err(err), &SentimentDefaults::default());
        assert!(out.degraded);
        assert_eq!(out.verdict.key_factors, vec!["Unable to parse AI response".to_string()]);
    }

    #[test]
    fn provider_http_error_degrades() {
        let call = LlmCallError::http(crate::llm::Provider::Ollama, 503, "overloaded");
        let err = anyhow::Error::new(call).context(SignalError::unavailable("ollama", "HTTP 503"));
        assert!(err.downcast_ref::<LlmCallError>().is_some());

        let out = normalize(Err(err), &SentimentDefaults::default());
        assert!(out.degraded);
        assert_eq!(
            out.verdict.reasoning,
            "Error in analysis: upstream ollama unavailable: HTTP 503"
        );
    }

    #[test]
    fn non_finite_verdict_is_degraded() {
        let mut v = bullish();
        v.confidence = f64::INFINITY;
        let out = normalize(Ok(v), &SentimentDefaults::default());
        assert!(out.degraded);
        assert_eq!(out.verdict.score, 0.0);
    }

    #[test]
    fn absent_uses_absent_confidence() {
        let v = absent(&SentimentDefaults::default());
        assert_eq!(v.confidence, 0.5);
        assert_eq!(v.label, SentimentLabel::Neutral);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
