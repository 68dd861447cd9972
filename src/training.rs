use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{FEATURE_COUNT, FEATURE_NAMES, FeatureFrame};

pub const DEFAULT_TEST_SIZE: f64 = 0.2;
pub const DEFAULT_L2: f64 = 1e-3;
const VALIDATION_SHARE: f64 = 0.1;
const MAX_ITERS: usize = 3000;
const LR_START: f64 = 0.05;
const IMPROVEMENT_EPS: f64 = 1e-5;
const MIN_TRAIN_SAMPLES: usize = 2;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("not enough complete rows to train: have {have}, need {need}")]
    NotEnoughSamples { have: usize, need: usize },

    #[error("serialize model artifact: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub player_id: i64,
    pub game_id: String,
    pub game_date: NaiveDate,
    pub x: [f64; FEATURE_COUNT],
    pub y: f64,
}

/// Complete feature rows only; anything with a missing feature is dropped here.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub samples: Vec<TrainingSample>,
    pub dropped: usize,
}

impl TrainingSet {
    pub fn from_frame(frame: &FeatureFrame) -> Self {
        let mut samples = Vec::with_capacity(frame.len());
        let mut dropped = 0usize;
        for row in &frame.rows {
            match row.complete_features() {
                Some(x) if row.player_points.is_finite() => samples.push(TrainingSample {
                    player_id: row.player_id,
                    game_id: row.game_id.clone(),
                    game_date: row.game_date,
                    x,
                    y: row.player_points,
                }),
                _ => dropped += 1,
            }
        }
        Self { samples, dropped }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Stable sort by date, then the first `floor(n * (1 - test_size))` samples
/// train and the rest test.
pub fn time_based_split(
    mut samples: Vec<TrainingSample>,
    test_size: f64,
) -> (Vec<TrainingSample>, Vec<TrainingSample>) {
    samples.sort_by_key(|s| s.game_date);
    let test_size = test_size.clamp(0.0, 1.0);
    let cutoff = ((samples.len() as f64) * (1.0 - test_size)).floor() as usize;
    let test = samples.split_off(cutoff.min(samples.len()));
    (samples, test)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearPointsModel {
    pub feature_means: [f64; FEATURE_COUNT],
    pub feature_stds: [f64; FEATURE_COUNT],
    pub coeffs: [f64; FEATURE_COUNT],
    pub intercept: f64,
    pub l2: f64,
}

impl LinearPointsModel {
    /// Gradient descent on squared error over standardized features with an
    /// L2 penalty on the coefficients. The tail of `train` is held out for
    /// early stopping on MAE.
    pub fn fit(train: &[TrainingSample], l2: f64) -> Result<Self, TrainingError> {
        if train.len() < MIN_TRAIN_SAMPLES {
            return Err(TrainingError::NotEnoughSamples {
                have: train.len(),
                need: MIN_TRAIN_SAMPLES,
            });
        }
        let val_len = ((train.len() as f64) * VALIDATION_SHARE).floor() as usize;
        let (fit_set, val_set) = train.split_at(train.len() - val_len);
        let val_set = if val_set.is_empty() { fit_set } else { val_set };

        let (feature_means, feature_stds) = feature_moments(fit_set);
        let mut model = Self {
            feature_means,
            feature_stds,
            coeffs: [0.0; FEATURE_COUNT],
            intercept: fit_set.iter().map(|s| s.y).sum::<f64>() / fit_set.len() as f64,
            l2: l2.max(0.0),
        };

        let standardized_fit = fit_set
            .iter()
            .map(|s| (model.standardize(&s.x), s.y))
            .collect::<Vec<_>>();

        let mut best = model.clone();
        let mut best_val = model.mae(val_set);
        let mut no_improve = 0usize;
        let n = standardized_fit.len() as f64;

        for iter in 0..MAX_ITERS {
            let mut grad = [0.0; FEATURE_COUNT];
            let mut grad_intercept = 0.0;
            for (z, y) in &standardized_fit {
                let err = model.intercept + dot(&model.coeffs, z) - y;
                grad_intercept += err;
                for j in 0..FEATURE_COUNT {
                    grad[j] += err * z[j];
                }
            }

            let lr = LR_START / (1.0 + iter as f64 * 0.002);
            model.intercept -= lr * grad_intercept / n;
            for j in 0..FEATURE_COUNT {
                let g = grad[j] / n + model.l2 * model.coeffs[j];
                model.coeffs[j] -= lr * g;
            }

            if iter % 20 == 0 || iter + 1 == MAX_ITERS {
                let val_mae = model.mae(val_set);
                if val_mae + IMPROVEMENT_EPS < best_val {
                    best_val = val_mae;
                    best = model.clone();
                    no_improve = 0;
                } else {
                    no_improve += 1;
                    if no_improve >= 20 {
                        break;
                    }
                }
            }
        }

        Ok(best)
    }

    pub fn predict(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.intercept + dot(&self.coeffs, &self.standardize(x))
    }

    pub fn mae(&self, samples: &[TrainingSample]) -> f64 {
        let predicted = samples.iter().map(|s| self.predict(&s.x)).collect::<Vec<_>>();
        let actual = samples.iter().map(|s| s.y).collect::<Vec<_>>();
        mean_absolute_error(&actual, &predicted)
    }

    fn standardize(&self, x: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = (x[i] - self.feature_means[i]) / self.feature_stds[i].max(1e-6);
        }
        out
    }
}

/// Mean absolute error over paired values; infinite when there are none.
pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return f64::INFINITY;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / n as f64
}

fn feature_moments(samples: &[TrainingSample]) -> ([f64; FEATURE_COUNT], [f64; FEATURE_COUNT]) {
    let mut mean = [0.0; FEATURE_COUNT];
    let mut std = [1.0; FEATURE_COUNT];
    if samples.is_empty() {
        return (mean, std);
    }
    let n = samples.len() as f64;
    for sample in samples {
        for i in 0..FEATURE_COUNT {
            mean[i] += sample.x[i];
        }
    }
    for v in &mut mean {
        *v /= n;
    }
    let mut var = [0.0; FEATURE_COUNT];
    for sample in samples {
        for i in 0..FEATURE_COUNT {
            let d = sample.x[i] - mean[i];
            var[i] += d * d;
        }
    }
    for i in 0..FEATURE_COUNT {
        std[i] = (var[i] / n).sqrt().max(1e-6);
    }
    (mean, std)
}

fn dot(a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    pub generated_at: String,
    pub target: String,
    pub feature_names: Vec<String>,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub coeffs: Vec<f64>,
    pub intercept: f64,
    pub l2: f64,
    pub train_mae: f64,
    pub test_mae: f64,
    pub baseline_test_mae: f64,
    pub train_samples: usize,
    pub test_samples: usize,
    #[serde(default)]
    pub dropped_rows: usize,
}

impl ModelArtifact {
    pub fn from_model(
        model: &LinearPointsModel,
        train: &[TrainingSample],
        test: &[TrainingSample],
        dropped_rows: usize,
    ) -> Self {
        let train_mean = if train.is_empty() {
            0.0
        } else {
            train.iter().map(|s| s.y).sum::<f64>() / train.len() as f64
        };
        let baseline = vec![train_mean; test.len()];
        let actual = test.iter().map(|s| s.y).collect::<Vec<_>>();
        Self {
            version: 1,
            generated_at: chrono::Utc::now().to_rfc3339(),
            target: "player_points".to_string(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            feature_means: model.feature_means.to_vec(),
            feature_stds: model.feature_stds.to_vec(),
            coeffs: model.coeffs.to_vec(),
            intercept: model.intercept,
            l2: model.l2,
            train_mae: model.mae(train),
            test_mae: model.mae(test),
            baseline_test_mae: mean_absolute_error(&actual, &baseline),
            train_samples: train.len(),
            test_samples: test.len(),
            dropped_rows,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TrainingError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).ok();
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw).map_err(|source| TrainingError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, TrainingError> {
        let raw = fs::read_to_string(path).map_err(|source| TrainingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}
