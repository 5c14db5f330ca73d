use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::artifacts::ModelArtifacts;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::features::StudentFeatures;

const DEFAULT_PREVIOUS_SCORES: f64 = 75.0;
const DEFAULT_ATTENDANCE: f64 = 80.0;
const DEFAULT_HOURS_STUDIED: f64 = 20.0;
const STUDY_HOURS_CAP: f64 = 40.0;
const SCORE_NOISE: f64 = 5.0;
const BASE_CONFIDENCE: f64 = 0.75;
const CONFIDENCE_SPREAD: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceCategory {
    AtRisk,
    Average,
    High,
}

impl PerformanceCategory {
    pub const ALL: [PerformanceCategory; 3] = [
        PerformanceCategory::AtRisk,
        PerformanceCategory::Average,
        PerformanceCategory::High,
    ];

    /// Classifier label mapping: 0 At Risk, 1 Average, 2 High Performance.
    pub fn from_label(label: usize) -> Option<Self> {
        Self::ALL.get(label).copied()
    }

    pub fn label(self) -> usize {
        match self {
            PerformanceCategory::AtRisk => 0,
            PerformanceCategory::Average => 1,
            PerformanceCategory::High => 2,
        }
    }

    /// Category implied by a score when no classifier is available.
    pub fn from_score(score: f64) -> Self {
        if score < 60.0 {
            PerformanceCategory::AtRisk
        } else if score < 90.0 {
            PerformanceCategory::Average
        } else {
            PerformanceCategory::High
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PerformanceCategory::AtRisk => "At Risk",
            PerformanceCategory::Average => "Average",
            PerformanceCategory::High => "High Performance",
        }
    }
}

impl fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_score: f64,
    pub performance_category: PerformanceCategory,
    pub category_confidence: f64,
    /// Ordered At Risk, Average, High. Only the model strategy produces these.
    pub per_category_probabilities: Option<[f64; 3]>,
}

#[derive(Debug)]
pub enum Strategy {
    Heuristic,
    Model(ModelArtifacts),
}

#[derive(Debug)]
pub struct PredictionEngine {
    strategy: Strategy,
}

impl PredictionEngine {
    pub fn heuristic() -> Self {
        Self {
            strategy: Strategy::Heuristic,
        }
    }

    pub fn with_artifacts(artifacts: ModelArtifacts) -> Self {
        Self {
            strategy: Strategy::Model(artifacts),
        }
    }

    /// Picks the strategy once: the model strategy when a bundle is configured
    /// and loads, the heuristic otherwise. With `require_model` set a load
    /// failure is returned instead.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let Some(path) = &config.model_bundle_path else {
            log::info!("No model bundle configured, using heuristic predictions");
            return Ok(Self::heuristic());
        };

        match ModelArtifacts::load(path).await {
            Ok(artifacts) => Ok(Self::with_artifacts(artifacts)),
            Err(e) if config.require_model => Err(EngineError::ArtifactLoad(format!(
                "{}: {}",
                path.display(),
                e
            ))),
            Err(e) => {
                log::warn!(
                    "Could not load model bundle {} ({}), using heuristic predictions",
                    path.display(),
                    e
                );
                Ok(Self::heuristic())
            }
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn strategy_name(&self) -> &'static str {
        match self.strategy {
            Strategy::Heuristic => "heuristic",
            Strategy::Model(_) => "model",
        }
    }

    pub fn model_version(&self) -> &str {
        match &self.strategy {
            Strategy::Heuristic => "heuristic-v1.0",
            Strategy::Model(artifacts) => artifacts.version(),
        }
    }

    pub fn predict(&self, features: &StudentFeatures) -> Result<PredictionResult> {
        self.predict_with_rng(features, &mut rand::thread_rng())
    }

    /// Same as [`predict`](Self::predict) with a caller supplied random
    /// source. Only the heuristic strategy draws from it.
    pub fn predict_with_rng<R: Rng + ?Sized>(
        &self,
        features: &StudentFeatures,
        rng: &mut R,
    ) -> Result<PredictionResult> {
        match &self.strategy {
            Strategy::Heuristic => predict_heuristic(features, rng),
            Strategy::Model(artifacts) => predict_model(artifacts, features),
        }
    }
}

fn predict_heuristic<R: Rng + ?Sized>(
    features: &StudentFeatures,
    rng: &mut R,
) -> Result<PredictionResult> {
    features.validate()?;

    let base = features.previous_scores.unwrap_or(DEFAULT_PREVIOUS_SCORES);
    let attendance_factor = features.attendance.unwrap_or(DEFAULT_ATTENDANCE) / 100.0;
    let study_factor =
        features.hours_studied.unwrap_or(DEFAULT_HOURS_STUDIED).min(STUDY_HOURS_CAP) / STUDY_HOURS_CAP;

    let raw = base * 0.6 + attendance_factor * 20.0 + study_factor * 15.0;
    let noise = rng.gen_range(-SCORE_NOISE..SCORE_NOISE);
    let predicted_score = (raw + noise).clamp(0.0, 100.0);
    let category_confidence = BASE_CONFIDENCE + rng.gen_range(0.0..CONFIDENCE_SPREAD);

    Ok(PredictionResult {
        predicted_score,
        performance_category: PerformanceCategory::from_score(predicted_score),
        category_confidence,
        per_category_probabilities: None,
    })
}

fn predict_model(artifacts: &ModelArtifacts, features: &StudentFeatures) -> Result<PredictionResult> {
    let output = artifacts.infer(features)?;

    let performance_category = PerformanceCategory::from_label(output.label).ok_or_else(|| {
        EngineError::Prediction(format!("classifier returned unknown label {}", output.label))
    })?;
    let probabilities: [f64; 3] = output.probabilities.as_slice().try_into().map_err(|_| {
        EngineError::Prediction(format!(
            "expected 3 class probabilities, got {}",
            output.probabilities.len()
        ))
    })?;
    check_probabilities(&probabilities)?;
    if !output.score.is_finite() {
        return Err(EngineError::Prediction(format!(
            "regressor returned {}",
            output.score
        )));
    }

    Ok(PredictionResult {
        predicted_score: output.score.clamp(0.0, 100.0),
        performance_category,
        category_confidence: probabilities[performance_category.label()],
        per_category_probabilities: Some(probabilities),
    })
}

const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

fn check_probabilities(probabilities: &[f64; 3]) -> Result<()> {
    if let Some(p) = probabilities
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(EngineError::Prediction(format!(
            "classifier returned probability {} outside 0..=1",
            p
        )));
    }
    let total: f64 = probabilities.iter().sum();
    if (total - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
        return Err(EngineError::Prediction(format!(
            "classifier probabilities sum to {}",
            total
        )));
    }
    Ok(())
}
