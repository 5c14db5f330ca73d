//! Fitted preprocessing objects and estimators used by the model strategy.
//!
//! A bundle is loaded once at startup and never mutated afterwards, so the
//! engine can share it across request handlers without locking.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use linfa_logistic::MultiFittedLogisticRegression;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::features::{Column, FeatureValue, StudentFeatures, FEATURE_COLUMNS};

/// Fitted mapping from category strings to integer codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new<S: Into<String>>(classes: impl IntoIterator<Item = S>) -> Result<Self> {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        if classes.is_empty() {
            return Err(EngineError::ArtifactLoad(
                "label encoder has no known classes".to_string(),
            ));
        }
        Ok(Self { classes })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Unseen values map to the first known class.
    pub fn encode(&self, value: &str) -> usize {
        self.classes
            .iter()
            .position(|class| class == value)
            .unwrap_or(0)
    }
}

/// Standardizes each column as `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn identity(width: usize) -> Self {
        Self {
            mean: vec![0.0; width],
            scale: vec![1.0; width],
        }
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.mean.len() != self.scale.len() {
            return Err(EngineError::Prediction(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if x.ncols() != self.width() {
            return Err(EngineError::Prediction(format!(
                "scaler expects {} features, got {}",
                self.width(),
                x.ncols()
            )));
        }
        let mean = Array1::from(self.mean.clone());
        // zero variance columns pass through unscaled
        let scale: Array1<f64> = self
            .scale
            .iter()
            .map(|&s| if s == 0.0 { 1.0 } else { s })
            .collect();
        Ok((x - &mean) / &scale)
    }
}

pub trait Classifier: Send + Sync {
    /// One row of class probabilities per input row, columns ordered by label.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.map_axis(Axis(1), argmax))
    }
}

pub trait Regressor: Send + Sync {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

fn argmax(row: ArrayView1<f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
        .0
}

/// Multinomial linear model with softmax output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearClassifier {
    /// One coefficient vector per class.
    pub coefficients: Vec<Vec<f64>>,
    pub intercepts: Vec<f64>,
}

impl Classifier for LinearClassifier {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let n_classes = self.coefficients.len();
        if n_classes == 0 || self.intercepts.len() != n_classes {
            return Err(EngineError::Prediction(format!(
                "classifier has {} coefficient rows and {} intercepts",
                n_classes,
                self.intercepts.len()
            )));
        }
        let width = x.ncols();
        if self.coefficients.iter().any(|c| c.len() != width) {
            return Err(EngineError::Prediction(format!(
                "classifier coefficients do not match {} input features",
                width
            )));
        }
        let flat: Vec<f64> = self.coefficients.iter().flatten().copied().collect();
        let weights = Array2::from_shape_vec((n_classes, width), flat)
            .map_err(|e| EngineError::Prediction(e.to_string()))?;
        let intercepts = Array1::from(self.intercepts.clone());

        let mut scores = x.dot(&weights.t()) + &intercepts;
        for mut row in scores.rows_mut() {
            let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let total = row.sum();
            row.mapv_inplace(|v| v / total);
        }
        Ok(scores)
    }
}

/// Ordinary linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressor {
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

impl Regressor for LinearRegressor {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.coefficients.len() != x.ncols() {
            return Err(EngineError::Prediction(format!(
                "regressor expects {} features, got {}",
                self.coefficients.len(),
                x.ncols()
            )));
        }
        let weights = Array1::from(self.coefficients.clone());
        Ok(x.dot(&weights) + self.intercept)
    }
}

/// A logistic regression fitted with linfa over labels 0, 1 and 2.
impl Classifier for MultiFittedLogisticRegression<f64, usize> {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(self.predict_probabilities(x))
    }
}

/// Raw outputs of both estimators for a single student.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub label: usize,
    pub probabilities: Vec<f64>,
    pub score: f64,
}

pub struct ModelArtifacts {
    version: String,
    encoders: HashMap<Column, LabelEncoder>,
    classifier_scaler: StandardScaler,
    regressor_scaler: StandardScaler,
    classifier: Box<dyn Classifier>,
    regressor: Box<dyn Regressor>,
}

impl fmt::Debug for ModelArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelArtifacts")
            .field("version", &self.version)
            .field("encoders", &self.encoders.len())
            .finish_non_exhaustive()
    }
}

impl ModelArtifacts {
    pub fn new(
        version: impl Into<String>,
        encoders: HashMap<Column, LabelEncoder>,
        classifier_scaler: StandardScaler,
        regressor_scaler: StandardScaler,
        classifier: impl Classifier + 'static,
        regressor: impl Regressor + 'static,
    ) -> Result<Self> {
        for column in FEATURE_COLUMNS.iter().filter(|c| c.is_categorical()) {
            match encoders.get(column) {
                Some(encoder) if !encoder.classes().is_empty() => {}
                Some(_) => {
                    return Err(EngineError::ArtifactLoad(format!(
                        "encoder for `{}` has no classes",
                        column.name()
                    )))
                }
                None => {
                    return Err(EngineError::ArtifactLoad(format!(
                        "missing label encoder for `{}`",
                        column.name()
                    )))
                }
            }
        }
        for (name, scaler) in [("classifier", &classifier_scaler), ("regressor", &regressor_scaler)] {
            if scaler.width() != FEATURE_COLUMNS.len() || scaler.scale.len() != scaler.width() {
                return Err(EngineError::ArtifactLoad(format!(
                    "{} scaler is fitted on {} features, expected {}",
                    name,
                    scaler.width(),
                    FEATURE_COLUMNS.len()
                )));
            }
        }
        Ok(Self {
            version: version.into(),
            encoders,
            classifier_scaler,
            regressor_scaler,
            classifier: Box::new(classifier),
            regressor: Box::new(regressor),
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let bundle: ArtifactBundle = serde_json::from_str(json)?;
        bundle.into_artifacts()
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path).await?;
        let artifacts = Self::from_json(&json)?;
        log::info!(
            "Loaded model artifacts {} from {}",
            artifacts.version,
            path.display()
        );
        Ok(artifacts)
    }

    /// Encodes categorical columns and lays the row out in model order.
    pub fn encode_row(&self, features: &StudentFeatures) -> Result<Array2<f64>> {
        let mut row = Vec::with_capacity(FEATURE_COLUMNS.len());
        for column in FEATURE_COLUMNS {
            let cell = match features.value(column)? {
                FeatureValue::Number(value) => value,
                FeatureValue::Category(value) => {
                    let encoder = self.encoders.get(&column).ok_or_else(|| {
                        EngineError::Prediction(format!("no encoder for `{}`", column.name()))
                    })?;
                    encoder.encode(value) as f64
                }
            };
            row.push(cell);
        }
        Array2::from_shape_vec((1, FEATURE_COLUMNS.len()), row)
            .map_err(|e| EngineError::Prediction(e.to_string()))
    }

    pub fn infer(&self, features: &StudentFeatures) -> Result<ModelOutput> {
        let row = self.encode_row(features)?;

        let for_classifier = self.classifier_scaler.transform(&row)?;
        let for_regressor = self.regressor_scaler.transform(&row)?;

        let label = first(self.classifier.predict(&for_classifier)?, "classifier")?;
        let proba = self.classifier.predict_proba(&for_classifier)?;
        if proba.nrows() != 1 {
            return Err(EngineError::Prediction(format!(
                "classifier returned {} probability rows for one input",
                proba.nrows()
            )));
        }
        let probabilities = proba.row(0).to_vec();
        let score = first(self.regressor.predict(&for_regressor)?, "regressor")?;

        Ok(ModelOutput {
            label,
            probabilities,
            score,
        })
    }
}

fn first<T: Copy>(values: Array1<T>, source: &str) -> Result<T> {
    values
        .iter()
        .next()
        .copied()
        .ok_or_else(|| EngineError::Prediction(format!("{} returned no output", source)))
}

/// On-disk layout of a model bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub version: String,
    #[serde(default)]
    pub feature_columns: Option<Vec<String>>,
    pub label_encoders: HashMap<String, Vec<String>>,
    pub classifier_scaler: StandardScaler,
    pub regressor_scaler: StandardScaler,
    pub classifier: LinearClassifier,
    pub regressor: LinearRegressor,
}

impl ArtifactBundle {
    pub fn into_artifacts(self) -> Result<ModelArtifacts> {
        if let Some(columns) = &self.feature_columns {
            let expected: Vec<&str> = FEATURE_COLUMNS.iter().map(|c| c.name()).collect();
            if columns.iter().map(String::as_str).ne(expected.iter().copied()) {
                return Err(EngineError::ArtifactLoad(format!(
                    "bundle column order {:?} does not match {:?}",
                    columns, expected
                )));
            }
        }

        let mut encoders = HashMap::new();
        for (name, classes) in self.label_encoders {
            match FEATURE_COLUMNS.iter().find(|c| c.name() == name) {
                Some(column) => {
                    encoders.insert(*column, LabelEncoder::new(classes)?);
                }
                None => log::warn!("Ignoring label encoder for unknown column `{}`", name),
            }
        }

        ModelArtifacts::new(
            self.version,
            encoders,
            self.classifier_scaler,
            self.regressor_scaler,
            self.classifier,
            self.regressor,
        )
    }
}
