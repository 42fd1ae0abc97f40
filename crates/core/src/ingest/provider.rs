use crate::config::Settings;
use crate::domain::price::PricePoint;
use crate::ingest::types::OhlcvResponse;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/ohlcv";
const DEFAULT_RETRIES: u32 = 3;

#[async_trait::async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Daily OHLCV rows for `symbol` within `[start, end]`, in any order.
    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>>;
}

#[derive(Debug, Clone)]
pub struct HttpJsonPriceProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpJsonPriceProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_price_provider_base_url()?.to_string();
        let api_key = settings.price_provider_api_key.clone();

        let timeout_secs = std::env::var("PRICE_PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("PRICE_PROVIDER_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let path = std::env::var("PRICE_PROVIDER_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build price provider http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<OhlcvResponse> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[
                ("symbol", symbol.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
            ])
            .send()
            .await
            .context("price provider request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read price provider response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("price provider response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("price provider HTTP {status}: {raw_json}");
        }

        serde_json::from_value::<OhlcvResponse>(raw_json)
            .context("failed to parse price provider response into OhlcvResponse")
    }
}

#[async_trait::async_trait]
impl PriceHistoryProvider for HttpJsonPriceProvider {
    fn provider_name(&self) -> &'static str {
        "external_http_json"
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(symbol, start, end).await {
                Ok(resp) => {
                    validate(&resp, symbol)?;
                    return Ok(resp
                        .rows
                        .into_iter()
                        .filter(|r| r.date >= start && r.date <= end)
                        .map(|r| r.into_point(symbol))
                        .collect());
                }
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1 << (attempt - 1));
                    tracing::warn!(%symbol, attempt, ?backoff, error = %err, "price fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

fn validate(resp: &OhlcvResponse, expected_symbol: &str) -> Result<()> {
    anyhow::ensure!(
        resp.symbol.eq_ignore_ascii_case(expected_symbol),
        "price provider symbol mismatch: expected {expected_symbol}, got {}",
        resp.symbol
    );
    for row in &resp.rows {
        anyhow::ensure!(
            row.high >= row.low,
            "{} {}: high {} below low {}",
            resp.symbol,
            row.date,
            row.high,
            row.low
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_expected_shape() {
        let v = json!({
            "symbol": "BTC",
            "rows": [
                {"date": "2026-01-27", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 10.0},
                {"date": "2026-01-28", "open": 1.5, "high": 2.5, "low": 1.0, "close": 2.0}
            ]
        });
        let parsed: OhlcvResponse = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[1].volume, 0.0);
        assert!(validate(&parsed, "btc").is_ok());
        assert!(validate(&parsed, "ETH").is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let v = json!({
            "symbol": "BTC",
            "rows": [{"date": "2026-01-27", "open": 1.0, "high": 0.5, "low": 2.0, "close": 1.5}]
        });
        let parsed: OhlcvResponse = serde_json::from_value(v).unwrap();
        assert!(validate(&parsed, "BTC").is_err());
    }

    #[test]
    fn url_joins_path() {
        let p = HttpJsonPriceProvider {
            http: reqwest::Client::new(),
            base_url: "https://prices.example/".to_string(),
            api_key: None,
            path: "v1/ohlcv".to_string(),
            retries: 1,
        };
        assert_eq!(p.url(), "https://prices.example/v1/ohlcv");
    }
}
