pub mod logistic;

use crate::features::FeatureSchema;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

pub use logistic::LogisticModel;

/// A trained up/down classifier over one schema-ordered feature vector.
pub trait DirectionClassifier: Send + Sync {
    fn name(&self) -> &str;

    fn expected_features(&self) -> usize;

    /// `[p_down, p_up]`.
    fn predict_probability(&self, features: &[f64]) -> anyhow::Result<[f64; 2]>;
}

/// Per-symbol classifiers sharing one persisted feature schema.
#[derive(Clone)]
pub struct ModelRegistry {
    schema: FeatureSchema,
    models: HashMap<String, Arc<dyn DirectionClassifier>>,
    /// Why a requested symbol has no model, kept for its fault report.
    load_errors: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            models: HashMap::new(),
            load_errors: HashMap::new(),
        }
    }

    pub fn insert(&mut self, symbol: &str, model: Arc<dyn DirectionClassifier>) -> anyhow::Result<()> {
        anyhow::ensure!(
            model.expected_features() == self.schema.len(),
            "model {} expects {} features but schema has {}",
            model.name(),
            model.expected_features(),
            self.schema.len()
        );
        self.models.insert(symbol.to_ascii_uppercase(), model);
        Ok(())
    }

    /// Loads `feature_columns.json` and `<symbol>.model.json` (lowercase) for each symbol.
    ///
    /// Only the schema is required. A symbol whose model is missing or unusable is left out and
    /// its analysis fails on its own.
    pub fn load_dir(dir: &Path, symbols: &[String]) -> anyhow::Result<Self> {
        let schema = FeatureSchema::load(&dir.join("feature_columns.json"))?;
        let mut registry = Self::new(schema);
        for symbol in symbols {
            let path = dir.join(format!("{}.model.json", symbol.to_ascii_lowercase()));
            let loaded = LogisticModel::load(&path)
                .and_then(|model| registry.insert(symbol, Arc::new(model)));
            match loaded {
                Ok(()) => tracing::info!(%symbol, path = %path.display(), "direction model loaded"),
                Err(err) => {
                    let reason = format!("{err:#}");
                    tracing::warn!(%symbol, path = %path.display(), error = %reason, "direction model unavailable");
                    registry.load_errors.insert(symbol.to_ascii_uppercase(), reason);
                }
            }
        }
        Ok(registry)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn get(&self, symbol: &str) -> Option<Arc<dyn DirectionClassifier>> {
        self.models.get(&symbol.to_ascii_uppercase()).cloned()
    }

    pub fn load_error(&self, symbol: &str) -> Option<&str> {
        self.load_errors
            .get(&symbol.to_ascii_uppercase())
            .map(String::as_str)
    }
}
