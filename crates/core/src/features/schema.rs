use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Column order the direction models were trained on.
pub const TRAINING_COLUMNS: [&str; 44] = [
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
    "Daily_Return",
    "Price_Change",
    "Volatility",
    "Close_Lag_1",
    "Close_Lag_2",
    "Close_Lag_3",
    "Close_Lag_5",
    "Close_Lag_7",
    "MA_7",
    "MA_20",
    "MA_30",
    "MA_50",
    "MA_Ratio_7_30",
    "Price_to_MA7",
    "Price_to_MA30",
    "Std_20",
    "Upper_BB",
    "Lower_BB",
    "BB_Position",
    "ROC_5",
    "ROC_10",
    "RSI_14",
    "MACD",
    "MACD_Signal",
    "MACD_Histogram",
    "ATR_14",
    "Volume_Change",
    "Volume_MA_7",
    "Volume_Ratio",
    "Volume_ROC_5",
    "Volume_Spike",
    "HL_Spread",
    "Rolling_Volatility_7",
    "Rolling_Volatility_30",
    "MA_Cross_Signal",
    "Distance_MA7",
    "Distance_MA30",
    "Price_Direction",
    "Consecutive_Trend",
];

/// Ordered feature names a model expects, persisted as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> anyhow::Result<Self> {
        anyhow::ensure!(!names.is_empty(), "feature schema must be non-empty");
        let mut seen = BTreeSet::new();
        for name in &names {
            anyhow::ensure!(!name.trim().is_empty(), "feature names must be non-empty");
            anyhow::ensure!(seen.insert(name.as_str()), "duplicate feature name: {name}");
        }
        Ok(Self { names })
    }

    pub fn training_default() -> Self {
        Self {
            names: TRAINING_COLUMNS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read feature schema {}", path.display()))?;
        serde_json::from_str::<Self>(&text)
            .with_context(|| format!("feature schema {} is not a JSON name list", path.display()))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = anyhow::Error;

    fn try_from(names: Vec<String>) -> anyhow::Result<Self> {
        Self::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn training_default_has_44_columns() {
        let schema = FeatureSchema::training_default();
        assert_eq!(schema.len(), 44);
        assert_eq!(schema.names()[0], "Open");
        assert_eq!(schema.names()[43], "Consecutive_Trend");
    }

    #[test]
    fn rejects_duplicates() {
        let names = vec!["MA_7".to_string(), "MA_7".to_string()];
        assert!(FeatureSchema::new(names).is_err());
        assert!(serde_json::from_str::<FeatureSchema>("[\"a\",\"a\"]").is_err());
    }

    #[test]
    fn loads_persisted_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[\"Close\", \"RSI_14\"]").unwrap();
        let schema = FeatureSchema::load(file.path()).unwrap();
        assert_eq!(schema.names(), &["Close".to_string(), "RSI_14".to_string()]);
    }
}
