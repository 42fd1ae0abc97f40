use crate::domain::contract::LlmSentimentVerdict;
use crate::domain::sentiment::SentimentVerdict;
use crate::error::SignalError;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();

    // Fenced block anywhere in the text (```json ... ``` or ``` ... ```).
    if let Some(open) = trimmed.find("```") {
        let after_fence = &trimmed[open + 3..];
        let body = match after_fence.split_once('\n') {
            Some((_lang, rest)) => rest,
            None => after_fence,
        };
        let inner = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        let inner = inner.trim();
        if inner.starts_with('{') {
            return Some(inner.to_string());
        }
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

/// Parses model output into a validated verdict; unparseable output is `MalformedVerdict`.
pub fn parse_verdict(text: &str, default_confidence: f64) -> Result<SentimentVerdict, SignalError> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmSentimentVerdict>(&json_str).map_err(|err| {
        SignalError::MalformedVerdict {
            detail: err.to_string(),
            raw: text.to_string(),
        }
    })?;
    parsed.validate_and_into_verdict(default_confidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sentiment::SentimentLabel;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_handles_prose_before_fence() {
        let text = "Here is my analysis:\n```json\n{\"score\": 10}\n```\nThanks!";
        assert_eq!(extract_json(text), Some("{\"score\": 10}".to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn extract_json_none_without_object() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} backwards {"), None);
    }

    #[test]
    fn parse_verdict_accepts_model_output() {
        let text = r#"```json
{
    "sentiment": "BEARISH",
    "score": -45,
    "confidence": 0.7,
    "key_factors": ["Exchange hack", "Regulatory scrutiny"],
    "reasoning": "Security concerns dominate the news."
}
```"#;
        let v = parse_verdict(text, 0.5).unwrap();
        assert_eq!(v.label, SentimentLabel::Bearish);
        assert_eq!(v.score, -45.0);
        assert_eq!(v.confidence, 0.7);
        assert_eq!(v.key_factors.len(), 2);
    }

    #[test]
    fn parse_verdict_reports_malformed_with_raw() {
        let text = "I think the market looks bullish overall.";
        match parse_verdict(text, 0.5) {
            Err(SignalError::MalformedVerdict { raw, .. }) => assert_eq!(raw, text),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parse_verdict_rejects_string_scores() {
        let text = "{\"sentiment\": \"BULLISH\", \"score\": \"high\"}";
        assert!(matches!(
            parse_verdict(text, 0.5),
            Err(SignalError::MalformedVerdict { .. })
        ));
    }
}
