use crate::domain::price::{partition_by_symbol, PricePoint};
use crate::error::SignalError;
use crate::features::indicators::{self as ind, Series};
use crate::features::schema::{FeatureSchema, TRAINING_COLUMNS};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Columns beyond the training set that a persisted schema may still ask for.
const EXTRA_COLUMNS: [&str; 1] = ["Adj Close"];

const LAGS: [usize; 5] = [1, 2, 3, 5, 7];
const LONGEST_WINDOW: usize = 50;

/// One symbol-day of features, values ordered as the matrix columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub symbol: String,
    pub date: NaiveDate,
    pub close: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<FeatureVector>,
    /// Normalized price rows seen per symbol, for diagnostics.
    input_rows: BTreeMap<String, usize>,
}

impl FeatureMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, row: &FeatureVector, name: &str) -> Option<f64> {
        self.column_index(name).and_then(|i| row.values.get(i).copied())
    }

    pub fn for_symbol<'a>(&'a self, symbol: &'a str) -> impl Iterator<Item = &'a FeatureVector> {
        self.rows.iter().filter(move |r| r.symbol == symbol)
    }

    /// Most recent complete row for `symbol`.
    pub fn latest(&self, symbol: &str) -> Result<&FeatureVector, SignalError> {
        self.rows
            .iter()
            .filter(|r| r.symbol == symbol)
            .max_by_key(|r| r.date)
            .ok_or_else(|| SignalError::InsufficientHistory {
                symbol: symbol.to_string(),
                rows: self.input_rows.get(symbol).copied().unwrap_or(0),
            })
    }
}

/// Builds schema-ordered feature rows for every symbol in `rows`.
///
/// Rows with any undefined feature are dropped, so a symbol with fewer than 50 days of history
/// contributes nothing. Fails only when the schema names a feature this engine cannot produce.
pub fn build_features(
    rows: &[PricePoint],
    schema: &FeatureSchema,
) -> Result<FeatureMatrix, SignalError> {
    let projection = resolve(schema)?;

    let mut out = Vec::new();
    let mut input_rows = BTreeMap::new();
    for (symbol, points) in partition_by_symbol(rows) {
        let before = out.len();
        let columns = compute_columns(&points);
        project_rows(&symbol, &points, &columns, &projection, &mut out);

        let kept = out.len() - before;
        if kept == 0 && !points.is_empty() {
            tracing::debug!(
                %symbol,
                rows = points.len(),
                min_rows = LONGEST_WINDOW,
                "no complete feature rows; history too short"
            );
        } else {
            tracing::debug!(%symbol, rows = points.len(), kept, "feature rows built");
        }
        input_rows.insert(symbol, points.len());
    }

    Ok(FeatureMatrix {
        columns: schema.names().to_vec(),
        rows: out,
        input_rows,
    })
}

fn available_columns() -> impl Iterator<Item = &'static str> {
    TRAINING_COLUMNS.iter().chain(EXTRA_COLUMNS.iter()).copied()
}

/// Maps each schema name to its position in the computed column list.
fn resolve(schema: &FeatureSchema) -> Result<Vec<usize>, SignalError> {
    let available: Vec<&str> = available_columns().collect();
    let mut projection = Vec::with_capacity(schema.len());
    let mut missing = Vec::new();
    for name in schema.names() {
        match available.iter().position(|c| c == name) {
            Some(i) => projection.push(i),
            None => missing.push(name.clone()),
        }
    }

    if !missing.is_empty() {
        return Err(SignalError::SchemaMismatch {
            missing,
            expected: schema.len(),
            available: available.len(),
        });
    }
    Ok(projection)
}

fn project_rows(
    symbol: &str,
    points: &[PricePoint],
    columns: &[(&'static str, Series)],
    projection: &[usize],
    out: &mut Vec<FeatureVector>,
) {
    'rows: for (i, point) in points.iter().enumerate() {
        let mut values = Vec::with_capacity(projection.len());
        for &col in projection {
            match columns[col].1[i] {
                Some(v) => values.push(v),
                None => continue 'rows,
            }
        }
        out.push(FeatureVector {
            symbol: symbol.to_string(),
            date: point.date,
            close: point.close,
            values,
        });
    }
}

/// Every available column for one normalized series, in `available_columns()` order.
fn compute_columns(points: &[PricePoint]) -> Vec<(&'static str, Series)> {
    let open: Vec<f64> = points.iter().map(|p| p.open).collect();
    let high: Vec<f64> = points.iter().map(|p| p.high).collect();
    let low: Vec<f64> = points.iter().map(|p| p.low).collect();
    let close: Vec<f64> = points.iter().map(|p| p.close).collect();
    let volume: Vec<f64> = points.iter().map(|p| p.volume).collect();

    let open_s = ind::defined(&open);
    let high_s = ind::defined(&high);
    let low_s = ind::defined(&low);
    let close_s = ind::defined(&close);
    let volume_s = ind::defined(&volume);

    let daily_return = ind::zip_with(&close_s, &open_s, |c, o| (c - o) / o * 100.0);
    let price_change = ind::pct_change(&close);
    let hl_spread = ind::zip_with(&high_s, &low_s, |h, l| h - l);
    let volatility = ind::zip_with(&hl_spread, &close_s, |s, c| s / c * 100.0);

    let mut lags: Vec<Series> = LAGS.iter().map(|&lag| ind::shift(&close, lag)).collect();

    let ma_7 = ind::rolling_mean(&close_s, 7);
    let ma_20 = ind::rolling_mean(&close_s, 20);
    let ma_30 = ind::rolling_mean(&close_s, 30);
    let ma_50 = ind::rolling_mean(&close_s, LONGEST_WINDOW);

    let ma_ratio = ind::zip_with(&ma_7, &ma_30, |a, b| a / b);
    let price_to_ma7 = ind::zip_with(&close_s, &ma_7, |c, m| c / m);
    let price_to_ma30 = ind::zip_with(&close_s, &ma_30, |c, m| c / m);

    let bb = ind::bollinger(&close, &ma_20, 20, 2.0);

    let roc_5 = ind::rate_of_change(&close, 5);
    let roc_10 = ind::rate_of_change(&close, 10);

    let rsi_14 = ind::rsi(&close, 14);
    let macd = ind::macd(&close, 12, 26, 9);
    let atr_14 = ind::atr(&high, &low, &close, 14);

    let volume_change = ind::pct_change(&volume);
    let volume_ma_7 = ind::rolling_mean(&volume_s, 7);
    let volume_ratio = ind::zip_with(&volume_s, &volume_ma_7, |v, m| v / m);
    let volume_roc_5 = ind::rate_of_change(&volume, 5);
    let volume_spike = flag(&volume_s, &volume_ma_7, |v, m| v > m * 1.5);

    let rolling_vol_7 = ind::rolling_std(&price_change, 7);
    let rolling_vol_30 = ind::rolling_std(&price_change, 30);
    let ma_cross = flag(&ma_7, &ma_30, |a, b| a > b);
    let distance_ma7 = ind::zip_with(&close_s, &ma_7, |c, m| (c - m) / m * 100.0);
    let distance_ma30 = ind::zip_with(&close_s, &ma_30, |c, m| (c - m) / m * 100.0);

    let direction = ind::up_direction(&close);
    let consecutive = ind::consecutive_trend(&direction);

    let mut lag = || lags.remove(0);
    vec![
        ("Open", open_s),
        ("High", high_s),
        ("Low", low_s),
        ("Close", close_s.clone()),
        ("Volume", volume_s),
        ("Daily_Return", daily_return),
        ("Price_Change", price_change),
        ("Volatility", volatility),
        ("Close_Lag_1", lag()),
        ("Close_Lag_2", lag()),
        ("Close_Lag_3", lag()),
        ("Close_Lag_5", lag()),
        ("Close_Lag_7", lag()),
        ("MA_7", ma_7),
        ("MA_20", ma_20),
        ("MA_30", ma_30),
        ("MA_50", ma_50),
        ("MA_Ratio_7_30", ma_ratio),
        ("Price_to_MA7", price_to_ma7),
        ("Price_to_MA30", price_to_ma30),
        ("Std_20", bb.std),
        ("Upper_BB", bb.upper),
        ("Lower_BB", bb.lower),
        ("BB_Position", bb.position),
        ("ROC_5", roc_5),
        ("ROC_10", roc_10),
        ("RSI_14", rsi_14),
        ("MACD", ind::defined(&macd.line)),
        ("MACD_Signal", ind::defined(&macd.signal)),
        ("MACD_Histogram", ind::defined(&macd.histogram)),
        ("ATR_14", atr_14),
        ("Volume_Change", volume_change),
        ("Volume_MA_7", volume_ma_7),
        ("Volume_Ratio", volume_ratio),
        ("Volume_ROC_5", volume_roc_5),
        ("Volume_Spike", volume_spike),
        ("HL_Spread", hl_spread),
        ("Rolling_Volatility_7", rolling_vol_7),
        ("Rolling_Volatility_30", rolling_vol_30),
        ("MA_Cross_Signal", ma_cross),
        ("Distance_MA7", distance_ma7),
        ("Distance_MA30", distance_ma30),
        ("Price_Direction", ind::defined(&direction)),
        ("Consecutive_Trend", ind::defined(&consecutive)),
        ("Adj Close", close_s),
    ]
}

/// 0/1 flag; comparisons against an undefined operand read as 0.
fn flag(a: &[Option<f64>], b: &[Option<f64>], f: impl Fn(f64, f64) -> bool) -> Series {
    a.iter()
        .zip(b)
        .map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if f(*x, *y) => Some(1.0),
            _ => Some(0.0),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(symbol: &str, days: usize) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        (0..days)
            .map(|i| {
                // Deterministic zig-zag trend so bands and losses are non-degenerate.
                let wobble = if i % 3 == 0 { -1.5 } else { 1.0 };
                let close = 100.0 + i as f64 * 0.8 + wobble;
                PricePoint {
                    symbol: symbol.to_string(),
                    date: start + chrono::Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 2.0,
                    low: close - 2.0,
                    close,
                    volume: 1_000.0 + (i % 7) as f64 * 150.0,
                }
            })
            .collect()
    }

    #[test]
    fn computed_columns_follow_available_order() {
        let cols = compute_columns(&series("BTC", 10));
        let names: Vec<&str> = cols.iter().map(|(n, _)| *n).collect();
        let expected: Vec<&str> = available_columns().collect();
        assert_eq!(names, expected);
        assert!(cols.iter().all(|(_, s)| s.len() == 10));
    }

    #[test]
    fn short_history_yields_no_rows() {
        let schema = FeatureSchema::training_default();
        for days in [0, 1, 20, 49] {
            let m = build_features(&series("BTC", days), &schema).unwrap();
            assert!(m.is_empty(), "{days} days should produce no rows");
        }
    }

    #[test]
    fn first_complete_row_is_day_fifty() {
        let schema = FeatureSchema::training_default();
        let rows = series("BTC", 60);
        let m = build_features(&rows, &schema).unwrap();
        assert_eq!(m.rows().len(), 11);
        assert_eq!(m.rows()[0].date, rows[49].date);
        assert_eq!(m.rows()[0].values.len(), 44);
    }

    #[test]
    fn latest_reports_insufficient_history() {
        let schema = FeatureSchema::training_default();
        let m = build_features(&series("ETH", 30), &schema).unwrap();
        match m.latest("ETH") {
            Err(SignalError::InsufficientHistory { symbol, rows }) => {
                assert_eq!(symbol, "ETH");
                assert_eq!(rows, 30);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn latest_row_outlives_the_symbol_argument() {
        let schema = FeatureSchema::training_default();
        let rows = series("BTC", 60);
        let m = build_features(&rows, &schema).unwrap();
        let latest = {
            let symbol = String::from("btc").to_ascii_uppercase();
            m.latest(&symbol).unwrap()
        };
        assert_eq!(latest.date, rows[59].date);
    }

    #[test]
    fn unknown_schema_feature_is_mismatch() {
        let schema = FeatureSchema::new(vec!["Close".into(), "Funding_Rate".into()]).unwrap();
        match build_features(&series("BTC", 60), &schema) {
            Err(SignalError::SchemaMismatch { missing, .. }) => {
                assert_eq!(missing, vec!["Funding_Rate".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn values_follow_schema_order() {
        let schema = FeatureSchema::new(vec!["RSI_14".into(), "Close".into(), "Adj Close".into()])
            .unwrap();
        let rows = series("BTC", 55);
        let m = build_features(&rows, &schema).unwrap();
        let last = m.latest("BTC").unwrap();
        assert_eq!(last.date, rows[54].date);
        assert_eq!(last.values[1], rows[54].close);
        assert_eq!(last.values[2], rows[54].close);
        assert_eq!(m.value(last, "RSI_14"), Some(last.values[0]));
    }

    #[test]
    fn symbols_are_computed_independently() {
        let schema = FeatureSchema::training_default();
        let mut mixed = series("ETH", 60);
        mixed.extend(series("BTC", 55));
        let m = build_features(&mixed, &schema).unwrap();
        assert_eq!(m.for_symbol("BTC").count(), 6);
        assert_eq!(m.for_symbol("ETH").count(), 11);

        let alone = build_features(&series("BTC", 55), &schema).unwrap();
        assert_eq!(
            m.latest("BTC").unwrap().values,
            alone.latest("BTC").unwrap().values
        );
    }

    #[test]
    fn rebuilding_is_bit_identical() {
        let schema = FeatureSchema::training_default();
        let rows = series("BTC", 80);
        let a = build_features(&rows, &schema).unwrap();
        let b = build_features(&rows, &schema).unwrap();
        let bits = |m: &FeatureMatrix| -> Vec<u64> {
            m.rows()
                .iter()
                .flat_map(|r| r.values.iter().map(|v| v.to_bits()))
                .collect()
        };
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn zero_volume_day_invalidates_dependent_rows() {
        let schema = FeatureSchema::training_default();
        let mut rows = series("BTC", 60);
        rows[55].volume = 0.0;
        let m = build_features(&rows, &schema).unwrap();
        // Volume_Change and Volume_ROC_5 divide by the zero volume on later days.
        assert!(m.for_symbol("BTC").all(|r| r.date != rows[56].date));
        assert!(m.for_symbol("BTC").any(|r| r.date == rows[55].date));
    }
}
