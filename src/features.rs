//! Student feature record and the fixed column layout used for model input.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Inputs to a prediction. Every field is optional on the wire; missing values
/// resolve to the column default where one exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentFeatures {
    pub gender: Option<String>,
    pub age: Option<f64>,
    pub teacher_feedback: Option<String>,
    pub attendance: Option<f64>,
    pub hours_studied: Option<f64>,
    pub previous_scores: Option<f64>,
    pub parental_involvement: Option<String>,
    pub access_to_resources: Option<String>,
    pub extracurricular_activities: Option<String>,
    pub sleep_hours: Option<f64>,
    pub physical_activity: Option<f64>,
    pub internet_access: Option<String>,
    pub tutoring_sessions: Option<f64>,
    pub family_income: Option<String>,
    pub school_type: Option<String>,
    pub peer_influence: Option<String>,
    pub learning_disabilities: Option<String>,
    pub parental_education_level: Option<String>,
    pub distance_from_home: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Column {
    Gender,
    Age,
    TeacherFeedback,
    Attendance,
    HoursStudied,
    PreviousScores,
    ParentalInvolvement,
    AccessToResources,
    ExtracurricularActivities,
    SleepHours,
    PhysicalActivity,
    PhysicalActivityLevel,
    InternetAccess,
    TutoringSessions,
    FamilyIncome,
    SchoolType,
    PeerInfluence,
    LearningDisabilities,
    ParentalEducationLevel,
    DistanceFromHome,
}

/// Model input order. Encoders, scalers and model coefficients are all
/// indexed by position in this array.
pub const FEATURE_COLUMNS: [Column; 20] = [
    Column::Gender,
    Column::Age,
    Column::TeacherFeedback,
    Column::Attendance,
    Column::HoursStudied,
    Column::PreviousScores,
    Column::ParentalInvolvement,
    Column::AccessToResources,
    Column::ExtracurricularActivities,
    Column::SleepHours,
    Column::PhysicalActivity,
    Column::PhysicalActivityLevel,
    Column::InternetAccess,
    Column::TutoringSessions,
    Column::FamilyIncome,
    Column::SchoolType,
    Column::PeerInfluence,
    Column::LearningDisabilities,
    Column::ParentalEducationLevel,
    Column::DistanceFromHome,
];

const LEVELS: &[&str] = &["Medium", "Low", "High"];
const NO_YES: &[&str] = &["No", "Yes"];

/// Physical domain of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericDomain {
    pub min: f64,
    pub max: f64,
    pub default: Option<f64>,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Gender => "gender",
            Column::Age => "age",
            Column::TeacherFeedback => "teacher_feedback",
            Column::Attendance => "attendance",
            Column::HoursStudied => "hours_studied",
            Column::PreviousScores => "previous_scores",
            Column::ParentalInvolvement => "parental_involvement",
            Column::AccessToResources => "access_to_resources",
            Column::ExtracurricularActivities => "extracurricular_activities",
            Column::SleepHours => "sleep_hours",
            Column::PhysicalActivity => "physical_activity",
            Column::PhysicalActivityLevel => "physical_activity_level",
            Column::InternetAccess => "internet_access",
            Column::TutoringSessions => "tutoring_sessions",
            Column::FamilyIncome => "family_income",
            Column::SchoolType => "school_type",
            Column::PeerInfluence => "peer_influence",
            Column::LearningDisabilities => "learning_disabilities",
            Column::ParentalEducationLevel => "parental_education_level",
            Column::DistanceFromHome => "distance_from_home",
        }
    }

    pub fn is_categorical(self) -> bool {
        !self.known_values().is_empty()
    }

    /// Known values of a categorical column; the first one is its default.
    pub fn known_values(self) -> &'static [&'static str] {
        match self {
            Column::Gender => &["Male", "Female"],
            Column::TeacherFeedback
            | Column::ParentalInvolvement
            | Column::AccessToResources
            | Column::FamilyIncome => LEVELS,
            Column::PhysicalActivityLevel => &["Low", "Medium", "High"],
            Column::ExtracurricularActivities | Column::LearningDisabilities => NO_YES,
            Column::InternetAccess => &["Yes", "No"],
            Column::SchoolType => &["Public", "Private"],
            Column::PeerInfluence => &["Neutral", "Negative", "Positive"],
            Column::ParentalEducationLevel => &["High School", "College", "Postgraduate"],
            Column::DistanceFromHome => &["Near", "Moderate", "Far"],
            _ => &[],
        }
    }

    pub fn numeric_domain(self) -> Option<NumericDomain> {
        let domain = |min: f64, max: f64, default: Option<f64>| NumericDomain { min, max, default };
        match self {
            Column::Age => Some(domain(0.0, 120.0, None)),
            Column::Attendance => Some(domain(0.0, 100.0, Some(80.0))),
            Column::HoursStudied => Some(domain(0.0, 168.0, Some(20.0))),
            Column::PreviousScores => Some(domain(0.0, 100.0, Some(75.0))),
            Column::SleepHours => Some(domain(0.0, 24.0, Some(7.0))),
            Column::PhysicalActivity => Some(domain(0.0, 168.0, Some(3.0))),
            Column::TutoringSessions => Some(domain(0.0, f64::MAX, Some(1.0))),
            _ => None,
        }
    }
}

/// A resolved cell of the model input row.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue<'a> {
    Category(&'a str),
    Number(f64),
}

impl StudentFeatures {
    fn raw_number(&self, column: Column) -> Option<f64> {
        match column {
            Column::Age => self.age,
            Column::Attendance => self.attendance,
            Column::HoursStudied => self.hours_studied,
            Column::PreviousScores => self.previous_scores,
            Column::SleepHours => self.sleep_hours,
            Column::PhysicalActivity => self.physical_activity,
            Column::TutoringSessions => self.tutoring_sessions,
            _ => None,
        }
    }

    fn raw_category(&self, column: Column) -> Option<&str> {
        let value = match column {
            Column::Gender => &self.gender,
            Column::TeacherFeedback => &self.teacher_feedback,
            Column::ParentalInvolvement => &self.parental_involvement,
            Column::AccessToResources => &self.access_to_resources,
            Column::ExtracurricularActivities => &self.extracurricular_activities,
            Column::InternetAccess => &self.internet_access,
            Column::FamilyIncome => &self.family_income,
            Column::SchoolType => &self.school_type,
            Column::PeerInfluence => &self.peer_influence,
            Column::LearningDisabilities => &self.learning_disabilities,
            Column::ParentalEducationLevel => &self.parental_education_level,
            Column::DistanceFromHome => &self.distance_from_home,
            _ => return None,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Overwrites every field that is present in `update`.
    pub fn merge(&mut self, update: StudentFeatures) {
        macro_rules! take {
            ($($field:ident),* $(,)?) => {
                $(if update.$field.is_some() {
                    self.$field = update.$field;
                })*
            };
        }
        take!(
            gender,
            age,
            teacher_feedback,
            attendance,
            hours_studied,
            previous_scores,
            parental_involvement,
            access_to_resources,
            extracurricular_activities,
            sleep_hours,
            physical_activity,
            internet_access,
            tutoring_sessions,
            family_income,
            school_type,
            peer_influence,
            learning_disabilities,
            parental_education_level,
            distance_from_home,
        );
    }

    /// Checks every numeric value that is present against its domain.
    pub fn validate(&self) -> Result<()> {
        for column in FEATURE_COLUMNS {
            if let Some(domain) = column.numeric_domain() {
                if let Some(value) = self.raw_number(column) {
                    check_domain(column, value, &domain)?;
                }
            }
        }
        Ok(())
    }

    /// Validated numeric value, or the column default when missing.
    /// `Ok(None)` means missing with no default.
    pub fn number_or_default(&self, column: Column) -> Result<Option<f64>> {
        let Some(domain) = column.numeric_domain() else {
            return Ok(None);
        };
        match self.raw_number(column) {
            Some(value) => check_domain(column, value, &domain).map(|_| Some(value)),
            None => Ok(domain.default),
        }
    }

    /// Bucketed weekly physical activity: up to 2h Low, up to 4h Medium.
    pub fn physical_activity_level(&self) -> Result<&'static str> {
        let hours = self
            .number_or_default(Column::PhysicalActivity)?
            .unwrap_or_default();
        Ok(if hours <= 2.0 {
            "Low"
        } else if hours <= 4.0 {
            "Medium"
        } else {
            "High"
        })
    }

    /// Resolves one cell of the model row, applying defaults and validation.
    /// Unknown categorical values are returned as-is.
    pub fn value(&self, column: Column) -> Result<FeatureValue<'_>> {
        if column == Column::PhysicalActivityLevel {
            return self.physical_activity_level().map(FeatureValue::Category);
        }
        if column.is_categorical() {
            let value = self
                .raw_category(column)
                .unwrap_or(column.known_values()[0]);
            return Ok(FeatureValue::Category(value));
        }
        match self.number_or_default(column)? {
            Some(value) => Ok(FeatureValue::Number(value)),
            None => Err(EngineError::invalid(column.name(), "required value is missing")),
        }
    }
}

fn check_domain(column: Column, value: f64, domain: &NumericDomain) -> Result<()> {
    if !value.is_finite() {
        return Err(EngineError::invalid(column.name(), "value is not a finite number"));
    }
    if value < domain.min || value > domain.max {
        return Err(EngineError::invalid(
            column.name(),
            format!("{} is outside {}..={}", value, domain.min, domain.max),
        ));
    }
    Ok(())
}
