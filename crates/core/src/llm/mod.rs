pub mod error;
pub mod json;
pub mod ollama;

use crate::domain::sentiment::SentimentVerdict;
use crate::domain::signal::{Action, TechnicalSignal};
use crate::news::Article;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
}

#[async_trait::async_trait]
pub trait SentimentProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// News sentiment for `asset`. Implementations return the neutral default without calling
    /// the model when `articles` is empty.
    async fn assess(&self, asset: &str, articles: &[Article]) -> anyhow::Result<SentimentVerdict>;
}

/// Context for the free-text explanation of a recommendation.
#[derive(Debug, Clone)]
pub struct NarrationInput {
    pub technical: TechnicalSignal,
    pub sentiment: SentimentVerdict,
    pub action: Action,
    pub aligned: bool,
}

#[async_trait::async_trait]
pub trait Narrator: Send + Sync {
    async fn explain(&self, input: &NarrationInput) -> anyhow::Result<String>;
}
