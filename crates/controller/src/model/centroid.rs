use std::sync::{PoisonError, RwLock};

use crate::engine::features::{classifier_len, regressor_len, TrainingRow};
use crate::error::ModelError;

use super::{LaneModel, TrainingSummary};

/// Fewest completed records a training run accepts.
pub const MIN_TRAINING_ROWS: usize = 10;

const NEIGHBOURS: usize = 5;

/// Per-feature standardization fitted on the training rows.
#[derive(Debug, Clone)]
struct Scaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl Scaler {
    fn fit<'a>(rows: impl Iterator<Item = &'a [f64]>, dim: usize) -> Self {
        let rows: Vec<&[f64]> = rows.collect();
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; dim];
        for row in &rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v / n;
            }
        }
        let mut std = vec![0.0; dim];
        for row in &rows {
            for ((s, v), m) in std.iter_mut().zip(row.iter()).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in std.iter_mut() {
            *s = s.sqrt();
            // constant feature: leave it unscaled
            if *s < 1e-9 {
                *s = 1.0;
            }
        }
        Self { mean, std }
    }

    fn apply(&self, features: &[f64]) -> Vec<f64> {
        features
            .iter()
            .zip(&self.mean)
            .zip(&self.std)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[derive(Debug, Clone)]
struct Fitted {
    classifier_scale: Scaler,
    /// Mean scaled classifier vector per lane; `None` for lanes never chosen.
    centroids: Vec<Option<Vec<f64>>>,
    regressor_scale: Scaler,
    /// Scaled regressor vectors with the seconds that were commanded.
    neighbours: Vec<(Vec<f64>, f64)>,
}

impl Fitted {
    fn probabilities(&self, features: &[f64]) -> Vec<f64> {
        let x = self.classifier_scale.apply(features);
        let distances: Vec<Option<f64>> = self
            .centroids
            .iter()
            .map(|c| c.as_ref().map(|c| squared_distance(&x, c).sqrt()))
            .collect();
        let nearest = distances
            .iter()
            .flatten()
            .copied()
            .fold(f64::INFINITY, f64::min);

        let weights: Vec<f64> = distances
            .iter()
            .map(|d| d.map_or(0.0, |d| (nearest - d).exp()))
            .collect();
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            let n = weights.len().max(1) as f64;
            return vec![1.0 / n; weights.len()];
        }
        weights.into_iter().map(|w| w / sum).collect()
    }

    fn seconds(&self, features: &[f64]) -> f64 {
        let x = self.regressor_scale.apply(features);
        let mut ranked: Vec<(f64, f64)> = self
            .neighbours
            .iter()
            .map(|(v, secs)| (squared_distance(&x, v), *secs))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        let k = NEIGHBOURS.min(ranked.len()).max(1);
        ranked.iter().take(k).map(|(_, s)| s).sum::<f64>() / k as f64
    }
}

/// Nearest-centroid lane classifier with a k-nearest-neighbour duration
/// regressor, both on standardized features.
pub struct CentroidModel {
    lanes: usize,
    fitted: RwLock<Option<Fitted>>,
}

impl CentroidModel {
    pub fn new(lanes: usize) -> Self {
        Self {
            lanes,
            fitted: RwLock::new(None),
        }
    }

    fn check_len(features: &[f64], expected: usize) -> Result<(), ModelError> {
        if features.len() != expected {
            return Err(ModelError::Malformed(format!(
                "expected {expected} features, got {}",
                features.len()
            )));
        }
        if features.iter().any(|f| !f.is_finite()) {
            return Err(ModelError::Malformed("non-finite feature".into()));
        }
        Ok(())
    }

    fn fit(&self, rows: &[TrainingRow]) -> Result<Fitted, ModelError> {
        let c_dim = classifier_len(self.lanes);
        let r_dim = regressor_len(self.lanes);
        for row in rows {
            Self::check_len(&row.classifier, c_dim)?;
            Self::check_len(&row.regressor, r_dim)?;
            if row.lane_index >= self.lanes {
                return Err(ModelError::Malformed(format!(
                    "lane index {} out of range",
                    row.lane_index
                )));
            }
        }

        let classifier_scale = Scaler::fit(rows.iter().map(|r| r.classifier.as_slice()), c_dim);
        let regressor_scale = Scaler::fit(rows.iter().map(|r| r.regressor.as_slice()), r_dim);

        let mut sums = vec![vec![0.0; c_dim]; self.lanes];
        let mut counts = vec![0usize; self.lanes];
        for row in rows {
            let scaled = classifier_scale.apply(&row.classifier);
            for (s, v) in sums[row.lane_index].iter_mut().zip(scaled) {
                *s += v;
            }
            counts[row.lane_index] += 1;
        }
        let centroids = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, n)| (n > 0).then(|| sum.into_iter().map(|v| v / n as f64).collect()))
            .collect();

        let neighbours = rows
            .iter()
            .map(|r| (regressor_scale.apply(&r.regressor), r.seconds))
            .collect();

        Ok(Fitted {
            classifier_scale,
            centroids,
            regressor_scale,
            neighbours,
        })
    }
}

impl LaneModel for CentroidModel {
    fn is_trained(&self) -> bool {
        self.fitted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn lane_probabilities(&self, features: &[f64]) -> Result<Vec<f64>, ModelError> {
        Self::check_len(features, classifier_len(self.lanes))?;
        let guard = self.fitted.read().unwrap_or_else(PoisonError::into_inner);
        let fitted = guard.as_ref().ok_or(ModelError::NotTrained)?;
        Ok(fitted.probabilities(features))
    }

    fn green_seconds(&self, features: &[f64]) -> Result<f64, ModelError> {
        Self::check_len(features, regressor_len(self.lanes))?;
        let guard = self.fitted.read().unwrap_or_else(PoisonError::into_inner);
        let fitted = guard.as_ref().ok_or(ModelError::NotTrained)?;
        Ok(fitted.seconds(features))
    }

    fn retrain(&self, rows: &[TrainingRow]) -> Result<TrainingSummary, ModelError> {
        if rows.len() < MIN_TRAINING_ROWS {
            return Err(ModelError::InsufficientData {
                have: rows.len(),
                need: MIN_TRAINING_ROWS,
            });
        }
        let fitted = self.fit(rows)?;

        let hits = rows
            .iter()
            .filter(|r| {
                let p = fitted.probabilities(&r.classifier);
                let best = p
                    .iter()
                    .enumerate()
                    .fold(0, |best, (i, v)| if *v > p[best] { i } else { best });
                best == r.lane_index
            })
            .count();
        let abs_err: f64 = rows
            .iter()
            .map(|r| (fitted.seconds(&r.regressor) - r.seconds).abs())
            .sum();
        let summary = TrainingSummary {
            rows: rows.len(),
            lane_accuracy: hits as f64 / rows.len() as f64,
            duration_mae: abs_err / rows.len() as f64,
        };

        *self.fitted.write().unwrap_or_else(PoisonError::into_inner) = Some(fitted);
        Ok(summary)
    }
}
