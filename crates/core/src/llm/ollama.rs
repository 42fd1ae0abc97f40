use crate::config::{SentimentDefaults, Settings};
use crate::domain::sentiment::SentimentVerdict;
use crate::error::SignalError;
use crate::llm::error::LlmCallError;
use crate::llm::json;
use crate::llm::{NarrationInput, Narrator, Provider, SentimentProvider};
use crate::news::Article;
use crate::signal::sentiment;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_URL: &str = "http://localhost:11434/api/generate";
const DEFAULT_MODEL: &str = "llama3.2";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const TEMPERATURE: f32 = 0.3;
const NUM_PREDICT: u32 = 2000;

const PROMPT_ARTICLES: usize = 5;
const PROMPT_BODY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
    defaults: SentimentDefaults,
}

impl OllamaClient {
    pub fn from_settings(settings: &Settings, defaults: SentimentDefaults) -> anyhow::Result<Self> {
        let url = settings
            .ollama_url
            .clone()
            .unwrap_or_else(|| DEFAULT_URL.to_string());
        let model = settings
            .ollama_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);
        let timeout = Duration::from_secs(timeout_secs);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            url,
            model,
            timeout,
            defaults,
        })
    }

    async fn generate(&self, prompt: String) -> anyhow::Result<String> {
        let req = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                num_predict: NUM_PREDICT,
            },
        };

        let res = match self.http.post(&self.url).json(&req).send().await {
            Ok(res) => res,
            Err(err) if err.is_timeout() => {
                return Err(SignalError::UpstreamTimeout {
                    stage: "ollama",
                    after: self.timeout,
                }
                .into())
            }
            Err(err) => return Err(SignalError::unavailable("ollama", err).into()),
        };

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Ollama response body")?;
        if !status.is_success() {
            return Err(
                anyhow::Error::new(LlmCallError::http(Provider::Ollama, status.as_u16(), &text))
                    .context(SignalError::unavailable("ollama", format!("HTTP {status}"))),
            );
        }

        let parsed = serde_json::from_str::<GenerateResponse>(&text).map_err(|err| {
            anyhow::Error::new(err).context(LlmCallError::decode(Provider::Ollama, &text))
        })?;
        Ok(parsed.response)
    }

    fn sentiment_prompt(asset: &str, articles: &[Article]) -> String {
        let news_summary = articles
            .iter()
            .take(PROMPT_ARTICLES)
            .enumerate()
            .map(|(i, a)| {
                let summary: String = a.body.chars().take(PROMPT_BODY_CHARS).collect();
                format!("Article {}:\nTitle: {}\nSummary: {}", i + 1, a.title, summary)
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "You are a crypto market sentiment analyst. Analyze the following recent news about {asset} and provide a sentiment assessment.\n\n\
News Articles:\n{news_summary}\n\n\
Provide your analysis in the following JSON format:\n\
{{\n\
    \"sentiment\": \"BULLISH\" or \"BEARISH\" or \"NEUTRAL\",\n\
    \"score\": <number between -100 (very bearish) and +100 (very bullish)>,\n\
    \"confidence\": <number between 0 and 1>,\n\
    \"key_factors\": [\"factor1\", \"factor2\", \"factor3\"],\n\
    \"reasoning\": \"Brief explanation of your sentiment assessment\"\n\
}}\n\n\
Consider:\n\
- Regulatory news\n\
- Adoption/partnerships\n\
- Technical developments\n\
- Market trends\n\
- Expert opinions\n\n\
Return ONLY valid JSON, no additional text."
        )
    }

    fn reasoning_prompt(input: &NarrationInput) -> String {
        format!(
            "Provide a brief trading recommendation summary (2-3 sentences) based on:\n\n\
Technical Analysis:\n\
- Signal: {}\n\
- Price Change: {:.2}%\n\
- RSI: {:.1}\n\n\
Sentiment Analysis:\n\
- Sentiment: {}\n\
- Score: {}\n\
- Key Factors: {:?}\n\n\
Combined Decision: {}\n\
Signals Aligned: {}\n\n\
Provide clear, actionable reasoning for a trader.",
            input.technical.label,
            input.technical.pct_change,
            input.technical.rsi,
            input.sentiment.label,
            input.sentiment.score,
            input.sentiment.key_factors,
            input.action,
            input.aligned,
        )
    }
}

#[async_trait::async_trait]
impl SentimentProvider for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn assess(&self, asset: &str, articles: &[Article]) -> anyhow::Result<SentimentVerdict> {
        if articles.is_empty() {
            return Ok(sentiment::absent(&self.defaults));
        }

        let text = self.generate(Self::sentiment_prompt(asset, articles)).await?;
        let verdict = json::parse_verdict(&text, self.defaults.absent_confidence)?;
        tracing::debug!(%asset, label = %verdict.label, score = verdict.score, "sentiment verdict parsed");
        Ok(verdict)
    }
}

#[async_trait::async_trait]
impl Narrator for OllamaClient {
    async fn explain(&self, input: &NarrationInput) -> anyhow::Result<String> {
        let text = self.generate(Self::reasoning_prompt(input)).await?;
        let text = text.trim();
        anyhow::ensure!(!text.is_empty(), "Ollama returned an empty explanation");
        Ok(text.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sentiment::SentimentLabel;
    use crate::domain::signal::{Action, TechnicalSignal, Trend};

    fn article(i: usize) -> Article {
        Article {
            title: format!("Headline {i}"),
            body: "b".repeat(400),
            source: "cc".to_string(),
            published_on: i as i64,
        }
    }

    #[test]
    fn sentiment_prompt_lists_five_truncated_articles() {
        let articles: Vec<_> = (1..=8).map(article).collect();
        let prompt = OllamaClient::sentiment_prompt("Bitcoin", &articles);
        assert!(prompt.contains("recent news about Bitcoin"));
        assert!(prompt.contains("Article 5:\nTitle: Headline 5"));
        assert!(!prompt.contains("Article 6:"));
        assert!(prompt.contains(&format!("Summary: {}\n", "b".repeat(200))));
        assert!(!prompt.contains(&"b".repeat(201)));
    }

    #[test]
    fn reasoning_prompt_carries_both_sides() {
        let input = NarrationInput {
            technical: TechnicalSignal {
                label: Action::Buy,
                trend: Trend::Up,
                pct_change: 2.5,
                current_price: 100.0,
                predicted_price: 102.5,
                confidence: 0.8,
                rsi: 64.27,
            },
            sentiment: SentimentVerdict {
                label: SentimentLabel::Bullish,
                score: 40.0,
                confidence: 0.7,
                key_factors: vec!["ETF".to_string()],
                reasoning: String::new(),
            },
            action: Action::StrongBuy,
            aligned: true,
        };
        let prompt = OllamaClient::reasoning_prompt(&input);
        assert!(prompt.contains("- Signal: BUY"));
        assert!(prompt.contains("- Price Change: 2.50%"));
        assert!(prompt.contains("- RSI: 64.3"));
        assert!(prompt.contains("- Sentiment: BULLISH"));
        assert!(prompt.contains("Combined Decision: STRONG BUY"));
    }

    #[test]
    fn request_serializes_options() {
        let req = GenerateRequest {
            model: "llama3.2",
            prompt: "hi".to_string(),
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                num_predict: NUM_PREDICT,
            },
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["stream"], false);
        assert_eq!(v["options"]["num_predict"], 2000);
    }

    #[tokio::test]
    async fn no_articles_skips_the_model() {
        let client = OllamaClient {
            http: reqwest::Client::new(),
            // Unroutable on purpose; the call must not happen.
            url: "http://127.0.0.1:9/api/generate".to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_millis(50),
            defaults: SentimentDefaults::default(),
        };
        let v = client.assess("Bitcoin", &[]).await.unwrap();
        assert_eq!(v.label, SentimentLabel::Neutral);
        assert_eq!(v.confidence, 0.5);
        assert_eq!(v.reasoning, "No news articles available");
    }
}
