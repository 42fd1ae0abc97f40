//! Per-symbol analysis: prices to features to model verdict, fused with news sentiment into a
//! recommendation. Batches run symbols concurrently and report failures per symbol.

use crate::config::SignalConfig;
use crate::domain::price::{normalize_series, PricePoint};
use crate::domain::recommendation::{CombinedSignal, Recommendation};
use crate::domain::sentiment::SentimentVerdict;
use crate::domain::signal::{Action, TechnicalSignal, Trend};
use crate::error::SignalError;
use crate::features::{build_features, indicators, FeatureMatrix, FeatureVector};
use crate::ingest::PriceHistoryProvider;
use crate::llm::{NarrationInput, Narrator, SentimentProvider};
use crate::model::ModelRegistry;
use crate::news::{NewsCache, NewsSource};
use crate::signal::sentiment::{self, NormalizedSentiment};
use crate::signal::{classify, combine, recommend, technical_score};
use crate::storage::HistoryRecord;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

const RSI_PERIOD: usize = 14;

/// News sentiment collaborators. The cache is shared by every symbol of the analyzer.
pub struct SentimentStage {
    pub provider: Arc<dyn SentimentProvider>,
    pub news: Arc<dyn NewsSource>,
    pub cache: Arc<Mutex<NewsCache>>,
    pub narrator: Option<Arc<dyn Narrator>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub symbol: String,
    /// Name used for news lookup and prompts, e.g. "Bitcoin".
    pub asset_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolAnalysis {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub technical: TechnicalSignal,
    /// Model `[down, up]` probabilities; `None` when inference failed.
    pub probabilities: Option<[f64; 2]>,
    pub sentiment: SentimentVerdict,
    pub combined: CombinedSignal,
    pub recommendation: Recommendation,
}

impl SymbolAnalysis {
    pub fn history_record(&self) -> HistoryRecord {
        HistoryRecord {
            date: self.as_of,
            symbol: self.symbol.clone(),
            price: self.technical.current_price,
            prediction: self.technical.trend,
            signal: self.technical.label,
            confidence: self.technical.confidence,
            prob_up: self.probabilities.map(|[_, up]| up),
            prob_down: self.probabilities.map(|[down, _]| down),
            predicted_price: Some(self.technical.predicted_price),
            recommendation: Some(self.recommendation.action),
            recommendation_confidence: Some(self.recommendation.confidence),
            degraded: Some(self.recommendation.degraded),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    InsufficientHistory,
    SchemaMismatch,
    Upstream,
    MissingModel,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolFault {
    pub symbol: String,
    pub kind: FaultKind,
    pub detail: String,
}

impl SymbolFault {
    fn from_error(symbol: &str, err: &anyhow::Error) -> Self {
        let kind = match err.downcast_ref::<SignalError>() {
            Some(SignalError::InsufficientHistory { .. }) => FaultKind::InsufficientHistory,
            Some(SignalError::SchemaMismatch { .. }) => FaultKind::SchemaMismatch,
            Some(e) if e.is_degradable() => FaultKind::Upstream,
            _ if err.downcast_ref::<MissingModel>().is_some() => FaultKind::MissingModel,
            _ => FaultKind::Internal,
        };
        Self {
            symbol: symbol.to_string(),
            kind,
            detail: format!("{err:#}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub results: Vec<SymbolAnalysis>,
    pub faults: Vec<SymbolFault>,
}

#[derive(Debug, thiserror::Error)]
#[error("no direction model for {symbol}: {reason}")]
struct MissingModel {
    symbol: String,
    reason: String,
}

pub struct Analyzer {
    prices: Arc<dyn PriceHistoryProvider>,
    models: ModelRegistry,
    sentiment: Option<SentimentStage>,
    config: SignalConfig,
}

impl Analyzer {
    pub fn new(
        prices: Arc<dyn PriceHistoryProvider>,
        models: ModelRegistry,
        config: SignalConfig,
    ) -> Self {
        Self {
            prices,
            models,
            sentiment: None,
            config,
        }
    }

    pub fn with_sentiment(mut self, stage: SentimentStage) -> Self {
        self.sentiment = Some(stage);
        self
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Runs every request concurrently. One symbol's failure never aborts the others.
    pub async fn analyze_batch(self: &Arc<Self>, requests: Vec<AnalysisRequest>) -> BatchReport {
        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, symbols = requests.len(), "batch started");

        let mut set = JoinSet::new();
        let mut symbols = HashMap::new();
        for req in requests {
            let analyzer = Arc::clone(self);
            let symbol = req.symbol.clone();
            let handle = set.spawn(async move { analyzer.analyze_symbol(&req).await });
            symbols.insert(handle.id(), symbol);
        }

        let mut results = Vec::new();
        let mut faults = Vec::new();
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((_, Ok(analysis))) => results.push(analysis),
                Ok((id, Err(err))) => {
                    let symbol = symbols.remove(&id).unwrap_or_default();
                    tracing::warn!(%run_id, %symbol, error = %format!("{err:#}"), "symbol analysis failed");
                    faults.push(SymbolFault::from_error(&symbol, &err));
                }
                Err(err) => {
                    let symbol = symbols.remove(&err.id()).unwrap_or_default();
                    tracing::error!(%run_id, %symbol, error = %err, "analysis task panicked or was cancelled");
                    faults.push(SymbolFault {
                        symbol,
                        kind: FaultKind::Internal,
                        detail: err.to_string(),
                    });
                }
            }
        }

        results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        faults.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tracing::info!(%run_id, ok = results.len(), failed = faults.len(), "batch finished");

        BatchReport {
            run_id,
            results,
            faults,
        }
    }

    pub async fn analyze_symbol(&self, req: &AnalysisRequest) -> anyhow::Result<SymbolAnalysis> {
        let symbol = req.symbol.as_str();
        let timeout = self.config.upstream_timeout;

        let points = bounded("prices", timeout, self.prices.fetch_history(symbol, req.start, req.end))
            .await
            .and_then(|r| r.map_err(|err| SignalError::unavailable("prices", err)))?;
        tracing::debug!(%symbol, provider = self.prices.provider_name(), rows = points.len(), "prices fetched");

        let matrix = build_features(&points, self.models.schema())?;
        let latest = matrix.latest(symbol)?.clone();
        let rsi = rsi_at(&matrix, &latest, points);

        let model = self
            .models
            .get(symbol)
            .ok_or_else(|| MissingModel {
                symbol: symbol.to_string(),
                reason: self
                    .models
                    .load_error(symbol)
                    .unwrap_or("not registered")
                    .to_string(),
            })?;

        let values = latest.values.clone();
        let inference = tokio::task::spawn_blocking(move || model.predict_probability(&values));
        let probabilities = match bounded("model", timeout, inference).await {
            Ok(Ok(Ok(p))) => Some(p),
            Ok(Ok(Err(err))) => {
                tracing::warn!(%symbol, error = %format!("{err:#}"), "model inference failed; holding");
                None
            }
            Ok(Err(join)) => {
                tracing::warn!(%symbol, error = %join, "model inference task failed; holding");
                None
            }
            Err(err) => {
                tracing::warn!(%symbol, error = %err, "model inference timed out; holding");
                None
            }
        };

        let technical = match probabilities {
            Some(p) => classify(p, latest.close, rsi, &self.config.prediction),
            None => neutral_technical(latest.close, rsi),
        };
        let tech_score = technical_score(technical.label, technical.pct_change, &self.config.technical);

        let NormalizedSentiment { verdict, degraded } = self.sentiment_for(req).await;
        let degraded = degraded || probabilities.is_none();

        let combined = combine(tech_score, verdict.score, self.config.weights);
        let mut recommendation = recommend(&combined, &self.config.recommendation);
        if degraded {
            recommendation.mark_degraded(self.config.degraded_confidence_cap);
        }

        if let Some(reasoning) = self.narrate(&technical, &verdict, &recommendation).await {
            recommendation.reasoning = reasoning;
        }

        tracing::info!(
            %symbol,
            as_of = %latest.date,
            technical = %technical.label,
            sentiment = %verdict.label,
            combined = combined.combined_score,
            action = %recommendation.action,
            confidence = recommendation.confidence,
            degraded,
            "symbol analyzed"
        );

        Ok(SymbolAnalysis {
            symbol: symbol.to_string(),
            as_of: latest.date,
            technical,
            probabilities,
            sentiment: verdict,
            combined,
            recommendation,
        })
    }

    async fn sentiment_for(&self, req: &AnalysisRequest) -> NormalizedSentiment {
        let defaults = &self.config.sentiment;
        let Some(stage) = &self.sentiment else {
            return NormalizedSentiment {
                verdict: sentiment::absent(defaults),
                degraded: false,
            };
        };

        let result = async {
            let articles = self.articles_for(stage, &req.asset_name).await?;
            bounded(
                "sentiment",
                self.config.upstream_timeout,
                stage.provider.assess(&req.asset_name, &articles),
            )
            .await?
        }
        .await;

        sentiment::normalize(result, defaults)
    }

    async fn articles_for(
        &self,
        stage: &SentimentStage,
        category: &str,
    ) -> anyhow::Result<Vec<crate::news::Article>> {
        let cached = lock_cache(&stage.cache)?.get(category);
        if let Some(hit) = cached {
            tracing::debug!(%category, articles = hit.len(), "news cache hit");
            return Ok(hit);
        }

        let articles = bounded(
            "news",
            self.config.upstream_timeout,
            stage.news.fetch_articles(category),
        )
        .await?
        .map_err(|err| SignalError::unavailable("news", err))?;

        lock_cache(&stage.cache)?.insert(category, articles.clone());
        Ok(articles)
    }

    async fn narrate(
        &self,
        technical: &TechnicalSignal,
        verdict: &SentimentVerdict,
        recommendation: &Recommendation,
    ) -> Option<String> {
        let narrator = self.sentiment.as_ref()?.narrator.as_ref()?;
        let input = NarrationInput {
            technical: technical.clone(),
            sentiment: verdict.clone(),
            action: recommendation.action,
            aligned: recommendation.aligned,
        };
        match bounded("narrator", self.config.upstream_timeout, narrator.explain(&input)).await {
            Ok(Ok(text)) => Some(text),
            Ok(Err(err)) => {
                tracing::warn!(error = %format!("{err:#}"), "explanation failed; using template");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "explanation timed out; using template");
                None
            }
        }
    }
}

async fn bounded<F: Future>(
    stage: &'static str,
    after: Duration,
    fut: F,
) -> Result<F::Output, SignalError> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| SignalError::UpstreamTimeout { stage, after })
}

fn lock_cache(cache: &Mutex<NewsCache>) -> anyhow::Result<std::sync::MutexGuard<'_, NewsCache>> {
    cache
        .lock()
        .map_err(|_| anyhow::anyhow!("news cache lock poisoned"))
}

/// RSI as of the feature row's date, read from the matrix when the schema carries it.
fn rsi_at(matrix: &FeatureMatrix, row: &FeatureVector, points: Vec<PricePoint>) -> Option<f64> {
    if let Some(rsi) = matrix.value(row, "RSI_14") {
        return Some(rsi);
    }
    let closes: Vec<f64> = normalize_series(points)
        .into_iter()
        .filter(|p| p.date <= row.date)
        .map(|p| p.close)
        .collect();
    indicators::rsi(&closes, RSI_PERIOD).last().copied().flatten()
}

fn neutral_technical(current_price: f64, rsi: Option<f64>) -> TechnicalSignal {
    TechnicalSignal {
        label: Action::Hold,
        trend: Trend::Uncertain,
        pct_change: 0.0,
        current_price,
        predicted_price: current_price,
        confidence: 0.0,
        rsi: rsi.unwrap_or_else(crate::domain::signal::default_rsi),
    }
}
