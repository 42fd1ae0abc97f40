use chrono::NaiveDate;
use coinsig_core::pipeline::AnalysisRequest;

/// Fewer calendar days than this can never yield a complete feature row.
const MIN_DAYS_BACK: u32 = 50;

#[derive(Debug, Clone)]
pub struct UniverseOptions {
    /// Tickers to analyze, e.g. `BTC` or `BTC-USD`.
    pub symbols: Vec<String>,

    /// Calendar days of price history requested per symbol.
    pub days_back: u32,
}

impl Default for UniverseOptions {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC".to_string(), "ETH".to_string()],
            days_back: 365,
        }
    }
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("WORKER_SYMBOLS") {
            let symbols = split_symbols(&s);
            if !symbols.is_empty() {
                out.symbols = symbols;
            }
        }

        if let Ok(s) = std::env::var("WORKER_DAYS_BACK") {
            if let Ok(n) = s.parse::<u32>() {
                out.days_back = n;
            }
        }

        out
    }
}

pub fn split_symbols(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// `btc-usd` and `BTC` both become `BTC`.
pub fn normalize_symbol(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    match upper.strip_suffix("-USD") {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => upper,
    }
}

/// Name used for news categories and prompts.
pub fn asset_name(symbol: &str) -> String {
    match symbol {
        "BTC" => "Bitcoin",
        "ETH" => "Ethereum",
        "SOL" => "Solana",
        "XRP" => "XRP",
        "ADA" => "Cardano",
        "DOGE" => "Dogecoin",
        other => other,
    }
    .to_string()
}

pub fn build_requests(end: NaiveDate, opts: &UniverseOptions) -> anyhow::Result<Vec<AnalysisRequest>> {
    anyhow::ensure!(
        opts.days_back >= MIN_DAYS_BACK,
        "days back must be at least {MIN_DAYS_BACK} (got {})",
        opts.days_back
    );

    let start = end - chrono::Duration::days(i64::from(opts.days_back));

    let mut symbols: Vec<String> = opts.symbols.iter().map(|s| normalize_symbol(s)).collect();
    symbols.sort();
    symbols.dedup();
    anyhow::ensure!(!symbols.is_empty(), "no symbols to analyze");

    Ok(symbols
        .into_iter()
        .map(|symbol| AnalysisRequest {
            asset_name: asset_name(&symbol),
            symbol,
            start,
            end,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_yahoo_style_tickers() {
        assert_eq!(normalize_symbol(" btc-usd "), "BTC");
        assert_eq!(normalize_symbol("ETH"), "ETH");
        assert_eq!(normalize_symbol("-USD"), "-USD");
    }

    #[test]
    fn requests_are_deduped_and_named() {
        let end = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        let opts = UniverseOptions {
            symbols: split_symbols("ETH, BTC-USD,btc,,PEPE"),
            days_back: 365,
        };
        let reqs = build_requests(end, &opts).unwrap();
        let got: Vec<_> = reqs
            .iter()
            .map(|r| (r.symbol.as_str(), r.asset_name.as_str()))
            .collect();
        assert_eq!(got, vec![("BTC", "Bitcoin"), ("ETH", "Ethereum"), ("PEPE", "PEPE")]);
        assert_eq!(reqs[0].start, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
        assert_eq!(reqs[0].end, end);
    }

    #[test]
    fn rejects_too_short_window() {
        let end = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        let opts = UniverseOptions {
            days_back: 30,
            ..UniverseOptions::default()
        };
        assert!(build_requests(end, &opts).is_err());
    }
}
