use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One symbol-day of OHLCV data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    fn has_finite_prices(&self) -> bool {
        self.open.is_finite() && self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

/// Drops rows with non-finite prices, orders by date and keeps the last row seen for each date.
///
/// Expects a single symbol; see [`partition_by_symbol`] for mixed input.
pub fn normalize_series(points: Vec<PricePoint>) -> Vec<PricePoint> {
    let mut points: Vec<PricePoint> = points.into_iter().filter(PricePoint::has_finite_prices).collect();

    // Stable sort keeps input order among equal dates, so "last" means last received.
    points.sort_by_key(|p| p.date);

    let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(prev) if prev.date == p.date => *prev = p,
            _ => out.push(p),
        }
    }
    out
}

/// Splits mixed rows per symbol (sorted by symbol) and normalizes each series.
pub fn partition_by_symbol(rows: &[PricePoint]) -> BTreeMap<String, Vec<PricePoint>> {
    let mut grouped: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.symbol.clone()).or_default().push(row.clone());
    }

    grouped
        .into_iter()
        .map(|(symbol, points)| (symbol, normalize_series(points)))
        .collect()
}
