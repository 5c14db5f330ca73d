use std::io::{Read, Write};
use std::path::Path;

use csv::{Reader, Writer};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::features::StudentFeatures;
use crate::model::PredictionResult;
use crate::profiles::{NewStudent, StudentProfile};

/// One student to predict for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub student_id: String,
    #[serde(flatten)]
    pub features: StudentFeatures,
}

// csv cannot (de)serialize through `flatten`, so rows are kept flat here.
#[derive(Debug, Serialize, Deserialize)]
struct RosterRow {
    student_id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    gender: Option<String>,
    age: Option<f64>,
    teacher_feedback: Option<String>,
    attendance: Option<f64>,
    hours_studied: Option<f64>,
    previous_scores: Option<f64>,
    parental_involvement: Option<String>,
    access_to_resources: Option<String>,
    extracurricular_activities: Option<String>,
    sleep_hours: Option<f64>,
    physical_activity: Option<f64>,
    internet_access: Option<String>,
    tutoring_sessions: Option<f64>,
    family_income: Option<String>,
    school_type: Option<String>,
    peer_influence: Option<String>,
    learning_disabilities: Option<String>,
    parental_education_level: Option<String>,
    distance_from_home: Option<String>,
}

impl RosterRow {
    /// Missing names become empty strings and are rejected on create.
    fn into_student(self) -> NewStudent {
        NewStudent {
            student_id: self.student_id,
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            features: StudentFeatures {
                gender: self.gender,
                age: self.age,
                teacher_feedback: self.teacher_feedback,
                attendance: self.attendance,
                hours_studied: self.hours_studied,
                previous_scores: self.previous_scores,
                parental_involvement: self.parental_involvement,
                access_to_resources: self.access_to_resources,
                extracurricular_activities: self.extracurricular_activities,
                sleep_hours: self.sleep_hours,
                physical_activity: self.physical_activity,
                internet_access: self.internet_access,
                tutoring_sessions: self.tutoring_sessions,
                family_income: self.family_income,
                school_type: self.school_type,
                peer_influence: self.peer_influence,
                learning_disabilities: self.learning_disabilities,
                parental_education_level: self.parental_education_level,
                distance_from_home: self.distance_from_home,
            },
        }
    }
}

impl From<&StudentProfile> for RosterRow {
    fn from(profile: &StudentProfile) -> Self {
        let f = profile.features.clone();
        RosterRow {
            student_id: profile.student_id.clone(),
            first_name: Some(profile.first_name.clone()),
            last_name: Some(profile.last_name.clone()),
            gender: f.gender,
            age: f.age,
            teacher_feedback: f.teacher_feedback,
            attendance: f.attendance,
            hours_studied: f.hours_studied,
            previous_scores: f.previous_scores,
            parental_involvement: f.parental_involvement,
            access_to_resources: f.access_to_resources,
            extracurricular_activities: f.extracurricular_activities,
            sleep_hours: f.sleep_hours,
            physical_activity: f.physical_activity,
            internet_access: f.internet_access,
            tutoring_sessions: f.tutoring_sessions,
            family_income: f.family_income,
            school_type: f.school_type,
            peer_influence: f.peer_influence,
            learning_disabilities: f.learning_disabilities,
            parental_education_level: f.parental_education_level,
            distance_from_home: f.distance_from_home,
        }
    }
}

impl From<RosterRow> for RosterEntry {
    fn from(row: RosterRow) -> Self {
        let student = row.into_student();
        RosterEntry {
            student_id: student.student_id,
            features: student.features,
        }
    }
}

/// A prediction tagged with the student it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub student_id: String,
    #[serde(flatten)]
    pub result: PredictionResult,
}

#[derive(Serialize)]
struct PredictionRow<'a> {
    student_id: &'a str,
    predicted_score: f64,
    performance_category: &'static str,
    category_confidence: f64,
}

/// Reads a roster with a header row. Columns other than `student_id` are
/// optional and empty cells count as missing values.
pub fn read_roster<R: Read>(reader: R) -> Result<Vec<RosterEntry>> {
    let mut rdr = Reader::from_reader(reader);
    let mut entries = Vec::new();

    for result in rdr.deserialize::<RosterRow>() {
        entries.push(result?.into());
    }

    Ok(entries)
}

pub fn load_roster(path: impl AsRef<Path>) -> Result<Vec<RosterEntry>> {
    let file = std::fs::File::open(path)?;
    read_roster(file)
}

const PROFILE_COLUMNS: [&str; 3] = ["student_id", "first_name", "last_name"];

/// Reads profiles for import. The header must carry the id and both name
/// columns; feature columns are optional.
pub fn read_profiles<R: Read>(reader: R) -> Result<Vec<NewStudent>> {
    let mut rdr = Reader::from_reader(reader);
    {
        let headers = rdr.headers()?;
        if let Some(missing) = PROFILE_COLUMNS
            .iter()
            .find(|column| !headers.iter().any(|h| h == **column))
        {
            return Err(EngineError::invalid(*missing, "required column is missing"));
        }
    }

    let mut students = Vec::new();
    for result in rdr.deserialize::<RosterRow>() {
        students.push(result?.into_student());
    }
    Ok(students)
}

/// Writes one row per profile. Nothing is written for an empty slice.
pub fn write_profiles<W: Write>(writer: W, profiles: &[StudentProfile]) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    for profile in profiles {
        wtr.serialize(RosterRow::from(profile))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_predictions<W: Write>(writer: W, predictions: &[BatchPrediction]) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    for prediction in predictions {
        wtr.serialize(PredictionRow {
            student_id: &prediction.student_id,
            predicted_score: prediction.result.predicted_score,
            performance_category: prediction.result.performance_category.display_name(),
            category_confidence: prediction.result.category_confidence,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PerformanceCategory;

    const ROSTER: &str = "\
student_id,gender,age,attendance,hours_studied,previous_scores,school_type
STU0001,Female,16,92,25,88,Private
STU0002,Male,,70,,61,
";

    #[test]
    fn roster_with_empty_cells() {
        let entries = read_roster(ROSTER.as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].student_id, "STU0001");
        assert_eq!(entries[0].features.attendance, Some(92.0));
        assert_eq!(entries[0].features.school_type.as_deref(), Some("Private"));
        assert_eq!(entries[1].features.age, None);
        assert_eq!(entries[1].features.hours_studied, None);
        assert_eq!(entries[1].features.school_type, None);
        assert_eq!(entries[1].features.teacher_feedback, None);
    }

    #[test]
    fn malformed_number_is_csv_error() {
        let bad = "student_id,attendance\nSTU0001,lots\n";
        assert!(matches!(
            read_roster(bad.as_bytes()),
            Err(crate::error::EngineError::Csv(_))
        ));
    }

    #[test]
    fn load_roster_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ROSTER.as_bytes()).unwrap();
        assert_eq!(load_roster(file.path()).unwrap().len(), 2);
    }

    #[test]
    fn profiles_need_name_columns() {
        let err = read_profiles("student_id,first_name\nSTU0001,Ada\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::EngineError::InputValidation { field: "last_name", .. }
        ));
    }

    #[test]
    fn profile_rows_round_trip_through_csv() {
        let students = read_profiles(
            "student_id,first_name,last_name,gender,attendance\n\
             STU0001,Ada,Lovelace,Female,92\n\
             STU0002,,Hopper,,\n"
                .as_bytes(),
        )
        .unwrap();
        assert_eq!(students.len(), 2);
        assert_eq!(students[0].first_name, "Ada");
        assert_eq!(students[0].features.attendance, Some(92.0));
        assert_eq!(students[1].first_name, "");

        let now = chrono::Utc::now();
        let profile = StudentProfile {
            student_id: students[0].student_id.clone(),
            first_name: students[0].first_name.clone(),
            last_name: students[0].last_name.clone(),
            features: students[0].features.clone(),
            created_at: now,
            updated_at: now,
        };
        let mut out = Vec::new();
        write_profiles(&mut out, &[profile]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert!(lines
            .next()
            .unwrap()
            .starts_with("student_id,first_name,last_name,gender,age,"));
        assert!(lines.next().unwrap().starts_with("STU0001,Ada,Lovelace,Female,,"));

        let again = read_profiles(text.as_bytes()).unwrap();
        assert_eq!(again[0].features, students[0].features);
    }

    #[test]
    fn writes_prediction_rows() {
        let predictions = vec![BatchPrediction {
            student_id: "STU0001".to_string(),
            result: PredictionResult {
                predicted_score: 81.5,
                performance_category: PerformanceCategory::Average,
                category_confidence: 0.8,
                per_category_probabilities: None,
            },
        }];
        let mut out = Vec::new();
        write_predictions(&mut out, &predictions).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "student_id,predicted_score,performance_category,category_confidence\n\
             STU0001,81.5,Average,0.8\n"
        );
    }
}
