use crate::segment::{SegmentModel, SegmentProbabilities, SEGMENT_FEATURES};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Standard-scaled multinomial logistic regression over the segment features, persisted as JSON.
///
/// `coef` and `intercept` are ordered prudent, balanced, adventurous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxSegmentModel {
    #[serde(default = "default_name")]
    pub name: String,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
    pub coef: [Vec<f64>; 3],
    pub intercept: [f64; 3],
}

fn default_name() -> String {
    "softmax_segments".to_string()
}

impl SoftmaxSegmentModel {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read segment model {}", path.display()))?;
        let model: Self = serde_json::from_str(&text)
            .with_context(|| format!("segment model {} is not a valid softmax model", path.display()))?;
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let widths = [
            self.mean.len(),
            self.scale.len(),
            self.coef[0].len(),
            self.coef[1].len(),
            self.coef[2].len(),
        ];
        anyhow::ensure!(
            widths.iter().all(|&w| w == SEGMENT_FEATURES),
            "segment model widths {widths:?} must all be {SEGMENT_FEATURES}"
        );
        anyhow::ensure!(
            self.coef
                .iter()
                .flatten()
                .chain(&self.mean)
                .chain(&self.scale)
                .chain(&self.intercept)
                .all(|v| v.is_finite()),
            "segment model parameters must be finite"
        );
        Ok(())
    }
}

impl SegmentModel for SoftmaxSegmentModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &[f64; SEGMENT_FEATURES]) -> anyhow::Result<SegmentProbabilities> {
        let scaled: Vec<f64> = features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                let scale = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / scale
            })
            .collect();

        let mut logits = self.intercept;
        for (logit, coef) in logits.iter_mut().zip(&self.coef) {
            *logit += coef.iter().zip(&scaled).map(|(c, x)| c * x).sum::<f64>();
        }

        // Shift by the max logit so exp never overflows.
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let [p, b, a] = logits.map(|z| (z - max).exp());
        let total = p + b + a;
        anyhow::ensure!(total.is_finite() && total > 0.0, "segment model produced non-finite logits");

        Ok(SegmentProbabilities {
            prudent: p / total,
            balanced: b / total,
            adventurous: a / total,
        })
    }
}
