use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use coinsig_core::config::{Settings, SignalConfig};
use coinsig_core::ingest::{CsvPriceProvider, HttpJsonPriceProvider, PriceHistoryProvider};
use coinsig_core::llm::ollama::OllamaClient;
use coinsig_core::model::ModelRegistry;
use coinsig_core::news::{CryptoCompareNews, NewsCache};
use coinsig_core::pipeline::{Analyzer, BatchReport, SentimentStage};
use coinsig_core::segment::{ClientProfile, SegmentationStrategy, SoftmaxSegmentModel};
use coinsig_core::storage::{HistoryLog, HistoryQuery, HistoryRecord};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod universe;

const NEWS_CACHE_TTL_SECS: u64 = 15 * 60;
const NEWS_CACHE_ENTRIES: usize = 32;

#[derive(Debug, Parser)]
#[command(name = "coinsig_worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze symbols and append the results to the history log.
    Predict(PredictArgs),
    /// Print logged predictions, newest first.
    History(HistoryArgs),
    /// Segment client profiles read from a JSON file.
    Segment(SegmentArgs),
}

#[derive(Debug, Args)]
struct PredictArgs {
    /// Comma-separated tickers. Defaults to WORKER_SYMBOLS, then BTC,ETH.
    #[arg(long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Calendar days of history to fetch.
    #[arg(long)]
    days_back: Option<u32>,

    /// Read `<SYMBOL>.csv` files from this directory instead of the HTTP provider.
    #[arg(long)]
    prices_dir: Option<PathBuf>,

    /// Last market date to include (YYYY-MM-DD). Defaults to today's UTC date.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Fuse news sentiment from the local LLM into the recommendation.
    #[arg(long)]
    with_sentiment: bool,

    /// Do everything except writing the history log.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long)]
    symbol: Option<String>,

    /// Only rows from the last N days.
    #[arg(long)]
    days: Option<u32>,

    #[arg(long, default_value_t = 30)]
    limit: usize,
}

#[derive(Debug, Args)]
struct SegmentArgs {
    /// JSON file with one profile object or an array of them.
    #[arg(long)]
    file: PathBuf,

    /// Trained segment model (JSON). Without one, profiles are scored by rules.
    #[arg(long)]
    model: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Predict(args) => predict(&settings, args).await,
        Command::History(args) => history(&settings, args),
        Command::Segment(args) => segment(args),
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker command failed");
    }
    result
}

async fn predict(settings: &Settings, args: PredictArgs) -> anyhow::Result<()> {
    let mut opts = universe::UniverseOptions::from_env();
    if let Some(symbols) = args.symbols {
        opts.symbols = symbols;
    }
    if let Some(days_back) = args.days_back {
        opts.days_back = days_back;
    }

    let end = resolve_as_of_date(args.as_of_date.as_deref())?;
    let requests = universe::build_requests(end, &opts)?;
    let symbols: Vec<String> = requests.iter().map(|r| r.symbol.clone()).collect();

    let config = SignalConfig::from_env()?;

    let prices: Arc<dyn PriceHistoryProvider> = match &args.prices_dir {
        Some(dir) => Arc::new(CsvPriceProvider::new(dir)),
        None => Arc::new(HttpJsonPriceProvider::from_settings(settings)?),
    };

    let models = ModelRegistry::load_dir(settings.require_model_dir()?, &symbols)
        .context("failed to load direction models")?;

    let mut analyzer = Analyzer::new(prices, models, config.clone());
    if args.with_sentiment {
        let ollama = Arc::new(OllamaClient::from_settings(settings, config.sentiment.clone())?);
        analyzer = analyzer.with_sentiment(SentimentStage {
            provider: ollama.clone(),
            news: Arc::new(CryptoCompareNews::from_settings(settings)?),
            cache: Arc::new(Mutex::new(NewsCache::new(
                Duration::from_secs(NEWS_CACHE_TTL_SECS),
                NEWS_CACHE_ENTRIES,
            ))),
            narrator: Some(ollama),
        });
    }

    let report = Arc::new(analyzer).analyze_batch(requests).await;
    print_report(&report);

    if args.dry_run {
        tracing::info!(run_id = %report.run_id, dry_run = true, results = report.results.len(), "history not written");
    } else if !report.results.is_empty() {
        let log = HistoryLog::new(settings.require_history_path()?);
        let records: Vec<HistoryRecord> = report.results.iter().map(|a| a.history_record()).collect();
        let total = tokio::task::spawn_blocking(move || log.append(&records))
            .await
            .context("history writer task failed")??;
        tracing::info!(run_id = %report.run_id, total, "history appended");
    }

    anyhow::ensure!(
        !report.results.is_empty() || report.faults.is_empty(),
        "every symbol failed in run {}",
        report.run_id
    );
    Ok(())
}

fn print_report(report: &BatchReport) {
    for a in &report.results {
        let rec = &a.recommendation;
        println!(
            "{} {} ${:.2} -> ${:.2} | technical {} | sentiment {} ({:+.0}) | {} @ {:.0}%{}",
            a.as_of,
            a.symbol,
            a.technical.current_price,
            a.technical.predicted_price,
            a.technical.label,
            a.sentiment.label,
            a.sentiment.score,
            rec.action,
            rec.confidence * 100.0,
            if rec.degraded { " (degraded)" } else { "" }
        );
        println!("    {}", rec.reasoning);
    }
    for f in &report.faults {
        println!("{} FAILED [{:?}]: {}", f.symbol, f.kind, f.detail);
    }
}

fn history(settings: &Settings, args: HistoryArgs) -> anyhow::Result<()> {
    let log = HistoryLog::new(settings.require_history_path()?);
    let query = HistoryQuery {
        symbol: args.symbol,
        days: args.days,
        limit: args.limit,
    };
    let rows = log.query(&query, chrono::Utc::now().date_naive())?;

    if rows.is_empty() {
        println!("no history rows");
        return Ok(());
    }
    println!("date        symbol  price         model      signal  confidence  recommendation");
    for r in rows {
        let recommendation = match (r.recommendation, r.recommendation_confidence) {
            (Some(action), Some(conf)) => format!(
                "{action} @ {:.0}%{}",
                conf * 100.0,
                if r.degraded == Some(true) { " (degraded)" } else { "" }
            ),
            _ => "-".to_string(),
        };
        println!(
            "{}  {:<6}  {:>12.2}  {:<9}  {:<6}  {:>9.0}%  {}",
            r.date,
            r.symbol,
            r.price,
            r.prediction.as_str(),
            r.signal.as_str(),
            r.confidence * 100.0,
            recommendation
        );
    }
    Ok(())
}

fn segment(args: SegmentArgs) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let profiles = parse_profiles(&text)?;

    let strategy = segmentation_strategy(args.model.as_deref())?;
    let mut out = Vec::with_capacity(profiles.len());
    for (i, profile) in profiles.iter().enumerate() {
        let assessment = strategy
            .assess(profile)
            .with_context(|| format!("client {} could not be segmented", i + 1))?;
        out.push(serde_json::json!({ "client_id": i + 1, "assessment": assessment }));
    }

    tracing::info!(strategy = strategy.name(), clients = out.len(), "clients segmented");
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn segmentation_strategy(model: Option<&std::path::Path>) -> anyhow::Result<SegmentationStrategy> {
    match model {
        Some(path) => {
            let model = SoftmaxSegmentModel::load(path)?;
            tracing::info!(path = %path.display(), model = %model.name, "segment model loaded");
            Ok(SegmentationStrategy::Trained(Box::new(model)))
        }
        None => Ok(SegmentationStrategy::RuleBased),
    }
}

fn parse_profiles(text: &str) -> anyhow::Result<Vec<ClientProfile>> {
    let value: serde_json::Value = serde_json::from_str(text).context("profiles file is not valid JSON")?;
    let profiles = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(profiles)
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn resolve_as_of_date(as_of_date_arg: Option<&str>) -> anyhow::Result<chrono::NaiveDate> {
    match as_of_date_arg {
        Some(s) => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date {s}")),
        None => Ok(chrono::Utc::now().date_naive()),
    }
}
