use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::model::PredictionResult;
use crate::recommendations::{Priority, Recommendation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub student_id: String,
    #[serde(flatten)]
    pub result: PredictionResult,
    pub model_version: String,
    pub prediction_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecommendation {
    pub id: u64,
    pub student_id: String,
    #[serde(flatten)]
    pub recommendation: Recommendation,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationProgress {
    pub total: usize,
    pub completed: usize,
    pub completion_rate: f64,
}

#[derive(Default)]
struct Tables {
    predictions: HashMap<String, Vec<PredictionRecord>>,
    recommendations: Vec<StoredRecommendation>,
    next_recommendation_id: u64,
}

/// In-memory keyed store for predictions and recommendations.
#[derive(Default)]
pub struct PredictionStore {
    tables: RwLock<Tables>,
}

impl PredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_prediction(&self, record: PredictionRecord) {
        let mut tables = self.tables.write();
        tables
            .predictions
            .entry(record.student_id.clone())
            .or_default()
            .push(record);
    }

    pub fn latest_prediction(&self, student_id: &str) -> Option<PredictionRecord> {
        self.tables
            .read()
            .predictions
            .get(student_id)
            .and_then(|history| history.last().cloned())
    }

    /// Most recent prediction per student, ordered by student id.
    pub fn latest_predictions(&self) -> Vec<PredictionRecord> {
        let tables = self.tables.read();
        let mut latest: Vec<PredictionRecord> = tables
            .predictions
            .values()
            .filter_map(|history| history.last().cloned())
            .collect();
        latest.sort_by(|a, b| a.student_id.cmp(&b.student_id));
        latest
    }

    /// Replaces the student's open recommendations with a fresh set.
    /// Completed ones are kept so progress history survives regeneration.
    pub fn save_recommendations(
        &self,
        student_id: &str,
        recommendations: Vec<Recommendation>,
    ) -> Vec<StoredRecommendation> {
        let mut tables = self.tables.write();
        tables
            .recommendations
            .retain(|r| r.student_id != student_id || r.is_completed);
        let created_at = Utc::now();
        let mut saved = Vec::with_capacity(recommendations.len());
        for recommendation in recommendations {
            tables.next_recommendation_id += 1;
            let stored = StoredRecommendation {
                id: tables.next_recommendation_id,
                student_id: student_id.to_string(),
                recommendation,
                is_completed: false,
                created_at,
            };
            tables.recommendations.push(stored.clone());
            saved.push(stored);
        }
        saved
    }

    pub fn recommendations(
        &self,
        student_id: &str,
        priority: Option<Priority>,
    ) -> Vec<StoredRecommendation> {
        self.tables
            .read()
            .recommendations
            .iter()
            .filter(|r| r.student_id == student_id)
            .filter(|r| priority.map_or(true, |p| r.recommendation.priority == p))
            .cloned()
            .collect()
    }

    /// Returns false when no recommendation has this id.
    pub fn complete_recommendation(&self, id: u64) -> bool {
        let mut tables = self.tables.write();
        match tables.recommendations.iter_mut().find(|r| r.id == id) {
            Some(recommendation) => {
                recommendation.is_completed = true;
                true
            }
            None => false,
        }
    }

    /// Drops every prediction and recommendation kept for the student.
    pub fn forget_student(&self, student_id: &str) {
        let mut tables = self.tables.write();
        tables.predictions.remove(student_id);
        tables.recommendations.retain(|r| r.student_id != student_id);
    }

    pub fn recommendation_progress(&self, student_id: &str) -> RecommendationProgress {
        let all = self.recommendations(student_id, None);
        let total = all.len();
        let completed = all.iter().filter(|r| r.is_completed).count();
        RecommendationProgress {
            total,
            completed,
            completion_rate: if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
