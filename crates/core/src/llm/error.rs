use crate::llm::Provider;
use std::fmt;

/// Longest body excerpt kept for logs.
const EXCERPT_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStage {
    /// The server answered with a non-success status.
    Http,
    /// The body was not the payload the client expects.
    Decode,
}

impl CallStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Decode => "decode",
        }
    }
}

/// A model call that reached the server but produced nothing usable.
///
/// Attached under the `SignalError` callers match on, so logs can show what the server sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmCallError {
    pub provider: Provider,
    pub stage: CallStage,
    pub status: Option<u16>,
    pub body_excerpt: String,
}

impl LlmCallError {
    pub fn http(provider: Provider, status: u16, body: &str) -> Self {
        Self {
            provider,
            stage: CallStage::Http,
            status: Some(status),
            body_excerpt: excerpt(body),
        }
    }

    pub fn decode(provider: Provider, body: &str) -> Self {
        Self {
            provider,
            stage: CallStage::Decode,
            status: None,
            body_excerpt: excerpt(body),
        }
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

impl fmt::Display for LlmCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} error", self.provider, self.stage.as_str())?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        write!(f, ": {}", self.body_excerpt)
    }
}

impl std::error::Error for LlmCallError {}
