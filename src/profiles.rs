//! Student profiles and the exam and attendance records kept against them.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;
use crate::features::StudentFeatures;
use crate::model::{PredictionEngine, PredictionResult};

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_RECORD_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Student {0} not found")]
    NotFound(String),

    #[error("Student ID {0} already exists")]
    Duplicate(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(flatten)]
    pub features: StudentFeatures,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudentProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudent {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(flatten)]
    pub features: StudentFeatures,
}

/// Partial profile update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub features: StudentFeatures,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileQuery {
    /// Substring of first name, last name or student id, ignoring case.
    pub search: Option<String>,
    pub gender: Option<String>,
    pub school_type: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePage {
    pub students: Vec<StudentProfile>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub imported_count: usize,
    pub errors: Vec<String>,
}

fn default_max_score() -> f64 {
    100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPerformanceRecord {
    pub subject: String,
    pub exam_type: String,
    pub score: f64,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    pub date_taken: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub id: u64,
    pub student_id: String,
    #[serde(flatten)]
    pub record: NewPerformanceRecord,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttendanceRecord {
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: u64,
    pub student_id: String,
    #[serde(flatten)]
    pub record: NewAttendanceRecord,
    pub created_at: DateTime<Utc>,
}

/// Exam results of one student aggregated per subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectSummary {
    pub subject: String,
    pub avg_score: f64,
    pub max_score: f64,
    pub min_score: f64,
    pub total_exams: usize,
}

#[derive(Default)]
struct Registry {
    profiles: BTreeMap<String, StudentProfile>,
    performance: Vec<PerformanceRecord>,
    attendance: Vec<AttendanceRecord>,
    next_record_id: u64,
}

impl Registry {
    fn require(&self, student_id: &str) -> Result<&StudentProfile, RegistryError> {
        self.profiles
            .get(student_id)
            .ok_or_else(|| RegistryError::NotFound(student_id.to_string()))
    }

    fn next_id(&mut self) -> u64 {
        self.next_record_id += 1;
        self.next_record_id
    }
}

fn require_text(field: &'static str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(field, "must not be empty"));
    }
    Ok(())
}

fn matches_filter(value: &Option<String>, filter: &Option<String>) -> bool {
    match filter.as_deref().filter(|f| !f.is_empty()) {
        Some(wanted) => value.as_deref() == Some(wanted),
        None => true,
    }
}

/// In-memory keyed store for student profiles and their records.
#[derive(Default)]
pub struct ProfileStore {
    registry: RwLock<Registry>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, student: NewStudent) -> Result<StudentProfile, RegistryError> {
        require_text("student_id", &student.student_id)?;
        require_text("first_name", &student.first_name)?;
        require_text("last_name", &student.last_name)?;
        student.features.validate()?;

        let mut registry = self.registry.write();
        if registry.profiles.contains_key(&student.student_id) {
            return Err(RegistryError::Duplicate(student.student_id));
        }

        let now = Utc::now();
        let profile = StudentProfile {
            student_id: student.student_id,
            first_name: student.first_name,
            last_name: student.last_name,
            features: student.features,
            created_at: now,
            updated_at: now,
        };
        registry
            .profiles
            .insert(profile.student_id.clone(), profile.clone());
        Ok(profile)
    }

    pub fn get(&self, student_id: &str) -> Option<StudentProfile> {
        self.registry.read().profiles.get(student_id).cloned()
    }

    /// All profiles ordered by student id.
    pub fn all(&self) -> Vec<StudentProfile> {
        self.registry.read().profiles.values().cloned().collect()
    }

    pub fn update(
        &self,
        student_id: &str,
        update: ProfileUpdate,
    ) -> Result<StudentProfile, RegistryError> {
        let mut registry = self.registry.write();
        let stored = registry
            .profiles
            .get_mut(student_id)
            .ok_or_else(|| RegistryError::NotFound(student_id.to_string()))?;

        let mut updated = stored.clone();
        if let Some(first_name) = update.first_name {
            require_text("first_name", &first_name)?;
            updated.first_name = first_name;
        }
        if let Some(last_name) = update.last_name {
            require_text("last_name", &last_name)?;
            updated.last_name = last_name;
        }
        updated.features.merge(update.features);
        updated.features.validate()?;
        updated.updated_at = Utc::now();

        *stored = updated.clone();
        Ok(updated)
    }

    /// Removes the profile and every record kept for it. Returns false when
    /// the student is unknown.
    pub fn delete(&self, student_id: &str) -> bool {
        let mut registry = self.registry.write();
        if registry.profiles.remove(student_id).is_none() {
            return false;
        }
        registry.performance.retain(|r| r.student_id != student_id);
        registry.attendance.retain(|r| r.student_id != student_id);
        true
    }

    pub fn list(&self, query: &ProfileQuery) -> ProfilePage {
        let search = query
            .search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        let registry = self.registry.read();
        let matching: Vec<&StudentProfile> = registry
            .profiles
            .values()
            .filter(|p| match &search {
                Some(needle) => [&p.first_name, &p.last_name, &p.student_id]
                    .iter()
                    .any(|field| field.to_lowercase().contains(needle.as_str())),
                None => true,
            })
            .filter(|p| matches_filter(&p.features.gender, &query.gender))
            .filter(|p| matches_filter(&p.features.school_type, &query.school_type))
            .collect();

        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let total = matching.len();
        let pages = (total + per_page - 1) / per_page;

        let students = matching
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();

        ProfilePage {
            students,
            pagination: Pagination {
                page,
                per_page,
                total,
                pages,
                has_next: page < pages,
                has_prev: page > 1,
            },
        }
    }

    /// Creates every row it can. Rows that fail are reported by their
    /// 1-based position and skipped.
    pub fn import(&self, students: Vec<NewStudent>) -> ImportReport {
        let mut imported_count = 0;
        let mut errors = Vec::new();

        for (index, student) in students.into_iter().enumerate() {
            match self.create(student) {
                Ok(_) => imported_count += 1,
                Err(e) => errors.push(format!("Row {}: {}", index + 1, e)),
            }
        }

        if !errors.is_empty() {
            log::warn!("Profile import skipped {} rows", errors.len());
        }
        ImportReport {
            imported_count,
            errors,
        }
    }

    /// Predicts from the stored profile. The lock is released before the
    /// engine runs.
    pub fn predict_for_student(
        &self,
        engine: &PredictionEngine,
        student_id: &str,
    ) -> Result<PredictionResult, RegistryError> {
        let features = self.registry.read().require(student_id)?.features.clone();
        Ok(engine.predict(&features)?)
    }

    pub fn add_performance_record(
        &self,
        student_id: &str,
        record: NewPerformanceRecord,
    ) -> Result<PerformanceRecord, RegistryError> {
        require_text("subject", &record.subject)?;
        require_text("exam_type", &record.exam_type)?;
        if !record.max_score.is_finite() || record.max_score <= 0.0 {
            return Err(EngineError::invalid("max_score", "must be a positive number").into());
        }
        if !record.score.is_finite() || record.score < 0.0 || record.score > record.max_score {
            return Err(EngineError::invalid(
                "score",
                format!("{} is outside 0..={}", record.score, record.max_score),
            )
            .into());
        }

        let mut registry = self.registry.write();
        registry.require(student_id)?;
        let stored = PerformanceRecord {
            id: registry.next_id(),
            student_id: student_id.to_string(),
            record,
            created_at: Utc::now(),
        };
        registry.performance.push(stored.clone());
        Ok(stored)
    }

    /// Most recent exams first, at most `limit` of them.
    pub fn performance_records(
        &self,
        student_id: &str,
        limit: usize,
    ) -> Result<Vec<PerformanceRecord>, RegistryError> {
        let registry = self.registry.read();
        registry.require(student_id)?;
        let mut records: Vec<PerformanceRecord> = registry
            .performance
            .iter()
            .filter(|r| r.student_id == student_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.record.date_taken.cmp(&a.record.date_taken));
        records.truncate(limit);
        Ok(records)
    }

    pub fn performance_summary(&self, student_id: &str) -> Result<Vec<SubjectSummary>, RegistryError> {
        let registry = self.registry.read();
        registry.require(student_id)?;

        let mut by_subject: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for record in registry.performance.iter().filter(|r| r.student_id == student_id) {
            by_subject
                .entry(record.record.subject.as_str())
                .or_default()
                .push(record.record.score);
        }

        Ok(by_subject
            .into_iter()
            .map(|(subject, scores)| SubjectSummary {
                subject: subject.to_string(),
                avg_score: scores.iter().sum::<f64>() / scores.len() as f64,
                max_score: scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                min_score: scores.iter().copied().fold(f64::INFINITY, f64::min),
                total_exams: scores.len(),
            })
            .collect())
    }

    pub fn add_attendance_record(
        &self,
        student_id: &str,
        record: NewAttendanceRecord,
    ) -> Result<AttendanceRecord, RegistryError> {
        let mut registry = self.registry.write();
        registry.require(student_id)?;
        let stored = AttendanceRecord {
            id: registry.next_id(),
            student_id: student_id.to_string(),
            record,
            created_at: Utc::now(),
        };
        registry.attendance.push(stored.clone());
        Ok(stored)
    }

    /// Attendance within the inclusive date range, most recent first.
    pub fn attendance_records(
        &self,
        student_id: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AttendanceRecord>, RegistryError> {
        let registry = self.registry.read();
        registry.require(student_id)?;
        let mut records: Vec<AttendanceRecord> = registry
            .attendance
            .iter()
            .filter(|r| r.student_id == student_id)
            .filter(|r| from.map_or(true, |d| r.record.date >= d))
            .filter(|r| to.map_or(true, |d| r.record.date <= d))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.record.date.cmp(&a.record.date));
        Ok(records)
    }
}
