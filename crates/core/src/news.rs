//! Recent-news collaborators for the sentiment stage.

use crate::config::Settings;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://min-api.cryptocompare.com";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const MAX_ARTICLES: usize = 10;
const MAX_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub body: String,
    pub source: String,
    pub published_on: i64,
}

#[async_trait::async_trait]
pub trait NewsSource: Send + Sync {
    async fn fetch_articles(&self, category: &str) -> anyhow::Result<Vec<Article>>;
}

#[derive(Debug, Clone)]
pub struct CryptoCompareNews {
    http: reqwest::Client,
    base_url: String,
}

impl CryptoCompareNews {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = settings
            .news_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build news http client")?;
        Ok(Self { http, base_url })
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(rename = "Data", default)]
    data: Vec<RawArticle>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    published_on: i64,
}

impl From<RawArticle> for Article {
    fn from(raw: RawArticle) -> Self {
        Self {
            title: raw.title,
            body: raw.body.chars().take(MAX_BODY_CHARS).collect(),
            source: raw.source,
            published_on: raw.published_on,
        }
    }
}

fn parse_news(resp: NewsResponse) -> Vec<Article> {
    resp.data.into_iter().take(MAX_ARTICLES).map(Article::from).collect()
}

#[async_trait::async_trait]
impl NewsSource for CryptoCompareNews {
    async fn fetch_articles(&self, category: &str) -> anyhow::Result<Vec<Article>> {
        let url = format!("{}/data/v2/news/", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .get(url)
            .query(&[("lang", "EN"), ("categories", category)])
            .send()
            .await
            .context("news request failed")?
            .error_for_status()
            .context("news request returned an error status")?;
        let parsed = res
            .json::<NewsResponse>()
            .await
            .context("failed to decode news response")?;
        Ok(parse_news(parsed))
    }
}

/// Caller-owned article cache with a TTL and a bound on the number of categories kept.
///
/// When full, the oldest inserted category is evicted first.
#[derive(Debug)]
pub struct NewsCache {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, (Instant, Vec<Article>)>,
    order: VecDeque<String>,
}

impl NewsCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, category: &str) -> Option<Vec<Article>> {
        self.get_at(category, Instant::now())
    }

    pub fn get_at(&mut self, category: &str, now: Instant) -> Option<Vec<Article>> {
        let (stored_at, articles) = self.entries.get(category)?;
        if now.saturating_duration_since(*stored_at) < self.ttl {
            return Some(articles.clone());
        }
        self.remove(category);
        None
    }

    pub fn insert(&mut self, category: &str, articles: Vec<Article>) {
        self.insert_at(category, articles, Instant::now());
    }

    pub fn insert_at(&mut self, category: &str, articles: Vec<Article>, now: Instant) {
        self.remove(category);
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.entries.insert(category.to_string(), (now, articles));
        self.order.push_back(category.to_string());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&mut self, category: &str) {
        if self.entries.remove(category).is_some() {
            self.order.retain(|c| c != category);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article(title: &str) -> Article {
        Article {
            title: title.to_string(),
            body: String::new(),
            source: "test".to_string(),
            published_on: 0,
        }
    }

    #[test]
    fn cache_expires_after_ttl() {
        let mut cache = NewsCache::new(Duration::from_secs(60), 4);
        let t0 = Instant::now();
        cache.insert_at("Bitcoin", vec![article("a")], t0);
        assert!(cache.get_at("Bitcoin", t0 + Duration::from_secs(59)).is_some());
        assert!(cache.get_at("Bitcoin", t0 + Duration::from_secs(60)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn cache_evicts_oldest_when_full() {
        let mut cache = NewsCache::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();
        cache.insert_at("Bitcoin", vec![article("a")], t0);
        cache.insert_at("Ethereum", vec![article("b")], t0);
        cache.insert_at("Solana", vec![article("c")], t0);
        assert_eq!(cache.len(), 2);
        assert!(cache.get_at("Bitcoin", t0).is_none());
        assert!(cache.get_at("Solana", t0).is_some());
    }

    #[test]
    fn reinsert_refreshes_position() {
        let mut cache = NewsCache::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();
        cache.insert_at("Bitcoin", vec![article("a")], t0);
        cache.insert_at("Ethereum", vec![article("b")], t0);
        cache.insert_at("Bitcoin", vec![article("a2")], t0);
        cache.insert_at("Solana", vec![article("c")], t0);
        assert!(cache.get_at("Ethereum", t0).is_none());
        assert_eq!(cache.get_at("Bitcoin", t0).unwrap()[0].title, "a2");
    }

    #[test]
    fn parse_news_limits_and_truncates() {
        let long_body = "x".repeat(900);
        let data: Vec<_> = (0..12)
            .map(|i| json!({"title": format!("t{i}"), "body": long_body, "source": "cc", "published_on": i}))
            .collect();
        let resp: NewsResponse = serde_json::from_value(json!({"Data": data})).unwrap();
        let articles = parse_news(resp);
        assert_eq!(articles.len(), 10);
        assert_eq!(articles[0].body.len(), 500);
    }

    #[test]
    fn parse_news_tolerates_missing_data() {
        let resp: NewsResponse = serde_json::from_value(json!({"Message": "rate limited"})).unwrap();
        assert!(parse_news(resp).is_empty());
    }
}
