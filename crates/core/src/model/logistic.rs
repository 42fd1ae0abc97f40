use crate::error::SignalError;
use crate::model::DirectionClassifier;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standard-scaled logistic regression, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    #[serde(default = "default_name")]
    pub name: String,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub coef: Vec<f64>,
    pub intercept: f64,
}

fn default_name() -> String {
    "logistic".to_string()
}

impl LogisticModel {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read model {}", path.display()))?;
        let model: Self = serde_json::from_str(&text)
            .with_context(|| format!("model {} is not a valid logistic model", path.display()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let n = self.coef.len();
        anyhow::ensure!(n > 0, "model has no coefficients");
        anyhow::ensure!(
            self.mean.len() == n && self.scale.len() == n,
            "mean/scale/coef lengths differ ({}/{}/{})",
            self.mean.len(),
            self.scale.len(),
            n
        );
        anyhow::ensure!(
            self.coef.iter().chain(&self.mean).chain(&self.scale).all(|v| v.is_finite())
                && self.intercept.is_finite(),
            "model parameters must be finite"
        );
        Ok(())
    }
}

impl DirectionClassifier for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn expected_features(&self) -> usize {
        self.coef.len()
    }

    fn predict_probability(&self, features: &[f64]) -> anyhow::Result<[f64; 2]> {
        if features.len() != self.coef.len() {
            return Err(SignalError::SchemaMismatch {
                missing: Vec::new(),
                expected: self.coef.len(),
                available: features.len(),
            }
            .into());
        }

        let mut z = self.intercept;
        for (i, x) in features.iter().enumerate() {
            // Constant features were scaled by 1 at training time.
            let scale = if self.scale[i] == 0.0 { 1.0 } else { self.scale[i] };
            z += self.coef[i] * (x - self.mean[i]) / scale;
        }

        let p_up = 1.0 / (1.0 + (-z).exp());
        anyhow::ensure!(p_up.is_finite(), "model produced a non-finite probability");
        Ok([1.0 - p_up, p_up])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn model() -> LogisticModel {
        LogisticModel {
            name: "test".to_string(),
            mean: vec![0.0, 10.0],
            scale: vec![1.0, 0.0],
            coef: vec![2.0, 0.5],
            intercept: 0.0,
        }
    }

    #[test]
    fn zero_logit_is_even_odds() {
        let p = model().predict_probability(&[0.0, 10.0]).unwrap();
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn positive_logit_favours_up() {
        let p = model().predict_probability(&[1.0, 10.0]).unwrap();
        assert!(p[1] > 0.85);
        assert!((p[0] + p[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn width_mismatch_is_schema_error() {
        let err = model().predict_probability(&[1.0]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SignalError>(),
            Some(SignalError::SchemaMismatch { expected: 2, available: 1, .. })
        ));
    }

    #[test]
    fn load_validates_lengths() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{{\"mean\": [0.0], \"scale\": [1.0, 1.0], \"coef\": [1.0], \"intercept\": 0.0}}"
        )
        .unwrap();
        assert!(LogisticModel::load(file.path()).is_err());
    }
}
