use crate::domain::price::PricePoint;
use crate::ingest::provider::PriceHistoryProvider;
use crate::ingest::types::OhlcvRow;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Reads `<dir>/<SYMBOL>.csv` files with a `date,open,high,low,close,volume` header.
#[derive(Debug, Clone)]
pub struct CsvPriceProvider {
    dir: PathBuf,
}

impl CsvPriceProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol.to_ascii_uppercase()))
    }
}

pub fn read_rows(path: &Path, symbol: &str) -> Result<Vec<PricePoint>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open price file {}", path.display()))?;

    let mut out = Vec::new();
    for (line, row) in reader.deserialize::<OhlcvRow>().enumerate() {
        // Header is line 1.
        let row = row.with_context(|| format!("{}: bad row at line {}", path.display(), line + 2))?;
        out.push(row.into_point(symbol));
    }
    Ok(out)
}

#[async_trait::async_trait]
impl PriceHistoryProvider for CsvPriceProvider {
    fn provider_name(&self) -> &'static str {
        "csv_file"
    }

    async fn fetch_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>> {
        let rows = read_rows(&self.path_for(symbol), symbol)?;
        Ok(rows
            .into_iter()
            .filter(|p| p.date >= start && p.date <= end)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_and_filters_by_range() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("BTC.csv"),
            "date,open,high,low,close,volume\n\
             2026-01-01,1,2,0.5,1.5,100\n\
             2026-01-02,1.5,2.5,1,2,200\n\
             2026-01-03,2,3,1.5,2.5,300\n",
        )
        .unwrap();

        let provider = CsvPriceProvider::new(dir.path());
        let rows = provider
            .fetch_history(
                "btc",
                NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
                NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "btc");
        assert_eq!(rows[1].close, 2.5);
        assert_eq!(rows[1].volume, 300.0);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CsvPriceProvider::new(dir.path());
        let d = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(provider.fetch_history("ETH", d, d).await.is_err());
    }
}
