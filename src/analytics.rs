use std::collections::BTreeMap;

use serde::Serialize;

use crate::features::StudentFeatures;
use crate::model::{PerformanceCategory, PredictionResult};

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PredictionSummary {
    pub total_students: usize,
    pub avg_predicted_score: f64,
    pub avg_confidence: f64,
    pub category_breakdown: Vec<CategoryCount>,
    pub score_distribution: Vec<ScoreBand>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CategoryCount {
    pub category: PerformanceCategory,
    pub label: String,
    pub count: usize,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ScoreBand {
    pub range: String,
    pub count: usize,
    pub percentage: f64,
}

const SCORE_BANDS: [(&str, f64, f64); 5] = [
    ("Excellent (90-100)", 90.0, f64::INFINITY),
    ("Good (80-89)", 80.0, 90.0),
    ("Average (70-79)", 70.0, 80.0),
    ("Below Average (60-69)", 60.0, 70.0),
    ("Poor (<60)", f64::NEG_INFINITY, 60.0),
];

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count > 0 { sum / count as f64 } else { 0.0 }
}

/// Counts scores per band. Percentages are taken over `total`, which may
/// include students without a score.
fn score_bands(scores: impl Iterator<Item = f64> + Clone, total: usize) -> Vec<ScoreBand> {
    SCORE_BANDS
        .iter()
        .map(|&(range, low, high)| {
            let count = scores.clone().filter(|&s| s >= low && s < high).count();
            ScoreBand {
                range: range.to_string(),
                count,
                percentage: if total > 0 {
                    count as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            }
        })
        .collect()
}

pub fn summarize(results: &[PredictionResult]) -> PredictionSummary {
    let total_students = results.len();

    let category_breakdown = PerformanceCategory::ALL
        .iter()
        .map(|&category| CategoryCount {
            category,
            label: category.display_name().to_string(),
            count: results
                .iter()
                .filter(|r| r.performance_category == category)
                .count(),
        })
        .collect();

    let score_distribution = score_bands(results.iter().map(|r| r.predicted_score), total_students);

    PredictionSummary {
        total_students,
        avg_predicted_score: mean(results.iter().map(|r| r.predicted_score)),
        avg_confidence: mean(results.iter().map(|r| r.category_confidence)),
        category_breakdown,
        score_distribution,
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FeatureAverages {
    pub attendance: f64,
    pub hours_studied: f64,
    pub previous_scores: f64,
}

/// Roster composition over stored student profiles.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ProfileOverview {
    pub total_students: usize,
    pub gender_distribution: BTreeMap<String, usize>,
    pub school_type_distribution: BTreeMap<String, usize>,
    pub averages: FeatureAverages,
    /// Bands over previous scores.
    pub performance_distribution: Vec<ScoreBand>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct GroupPerformance {
    pub group: String,
    pub count: usize,
    pub avg_score: f64,
    pub avg_attendance: f64,
    pub avg_hours: f64,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct PerformanceTrends {
    pub gender_performance: Vec<GroupPerformance>,
    pub school_performance: Vec<GroupPerformance>,
    pub parental_performance: Vec<GroupPerformance>,
    pub age_performance: Vec<GroupPerformance>,
}

const UNKNOWN_GROUP: &str = "Unknown";

const AGE_GROUPS: [(&str, f64, f64); 3] = [
    ("15-16", 15.0, 17.0),
    ("17-18", 17.0, 19.0),
    ("19+", 19.0, 26.0),
];

fn group_key(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_GROUP)
        .to_string()
}

fn distribution(
    students: &[StudentFeatures],
    field: fn(&StudentFeatures) -> &Option<String>,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for student in students {
        *counts.entry(group_key(field(student))).or_insert(0) += 1;
    }
    counts
}

/// Averages per group. Students the key maps to `None` are left out, and
/// missing values are skipped per average.
fn group_performance(
    students: &[StudentFeatures],
    key: impl Fn(&StudentFeatures) -> Option<String>,
) -> Vec<GroupPerformance> {
    let mut groups: BTreeMap<String, Vec<&StudentFeatures>> = BTreeMap::new();
    for student in students {
        if let Some(group) = key(student) {
            groups.entry(group).or_default().push(student);
        }
    }

    groups
        .into_iter()
        .map(|(group, members)| GroupPerformance {
            count: members.len(),
            avg_score: mean(members.iter().filter_map(|s| s.previous_scores)),
            avg_attendance: mean(members.iter().filter_map(|s| s.attendance)),
            avg_hours: mean(members.iter().filter_map(|s| s.hours_studied)),
            group,
        })
        .collect()
}

pub fn overview(students: &[StudentFeatures]) -> ProfileOverview {
    let total_students = students.len();
    ProfileOverview {
        total_students,
        gender_distribution: distribution(students, |s| &s.gender),
        school_type_distribution: distribution(students, |s| &s.school_type),
        averages: FeatureAverages {
            attendance: mean(students.iter().filter_map(|s| s.attendance)),
            hours_studied: mean(students.iter().filter_map(|s| s.hours_studied)),
            previous_scores: mean(students.iter().filter_map(|s| s.previous_scores)),
        },
        performance_distribution: score_bands(
            students.iter().filter_map(|s| s.previous_scores),
            total_students,
        ),
    }
}

pub fn performance_trends(students: &[StudentFeatures]) -> PerformanceTrends {
    PerformanceTrends {
        gender_performance: group_performance(students, |s| Some(group_key(&s.gender))),
        school_performance: group_performance(students, |s| Some(group_key(&s.school_type))),
        parental_performance: group_performance(students, |s| {
            Some(group_key(&s.parental_involvement))
        }),
        age_performance: group_performance(students, |s| {
            let age = s.age?;
            AGE_GROUPS
                .iter()
                .find(|&&(_, low, high)| age >= low && age < high)
                .map(|&(label, _, _)| label.to_string())
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(score: f64, confidence: f64) -> PredictionResult {
        PredictionResult {
            predicted_score: score,
            performance_category: PerformanceCategory::from_score(score),
            category_confidence: confidence,
            per_category_probabilities: None,
        }
    }

    #[test]
    fn summary_counts_bands_and_categories() {
        let results = vec![
            result(95.0, 0.9),
            result(89.5, 0.8),
            result(72.0, 0.8),
            result(60.0, 0.7),
            result(12.0, 0.8),
        ];
        let summary = summarize(&results);

        assert_eq!(summary.total_students, 5);
        assert!((summary.avg_predicted_score - 65.7).abs() < 1e-9);
        assert!((summary.avg_confidence - 0.8).abs() < 1e-9);

        let counts: Vec<usize> = summary.score_distribution.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 1]);
        assert!((summary.score_distribution[0].percentage - 20.0).abs() < 1e-9);

        let categories: Vec<usize> = summary.category_breakdown.iter().map(|c| c.count).collect();
        assert_eq!(categories, vec![1, 3, 1]);
    }

    fn profile(gender: &str, school: &str, age: f64, score: Option<f64>) -> StudentFeatures {
        StudentFeatures {
            gender: Some(gender.to_string()),
            school_type: Some(school.to_string()),
            age: Some(age),
            attendance: Some(90.0),
            hours_studied: Some(20.0),
            previous_scores: score,
            ..Default::default()
        }
    }

    #[test]
    fn overview_counts_groups_and_bands() {
        let students = vec![
            profile("Female", "Public", 16.0, Some(92.0)),
            profile("Male", "Private", 17.0, Some(64.0)),
            profile("Female", "Public", 18.0, None),
            StudentFeatures::default(),
        ];
        let overview = overview(&students);

        assert_eq!(overview.total_students, 4);
        assert_eq!(overview.gender_distribution["Female"], 2);
        assert_eq!(overview.gender_distribution["Male"], 1);
        assert_eq!(overview.gender_distribution["Unknown"], 1);
        assert_eq!(overview.school_type_distribution["Public"], 2);
        assert_eq!(overview.averages.previous_scores, 78.0);
        assert_eq!(overview.averages.attendance, 90.0);

        let counts: Vec<usize> = overview.performance_distribution.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 0, 0, 1, 0]);
        assert_eq!(overview.performance_distribution[0].percentage, 25.0);
    }

    #[test]
    fn trends_group_by_gender_and_age() {
        let students = vec![
            profile("Female", "Public", 15.0, Some(80.0)),
            profile("Female", "Private", 16.0, Some(60.0)),
            profile("Male", "Public", 19.0, Some(70.0)),
            profile("Male", "Public", 30.0, Some(50.0)),
        ];
        let trends = performance_trends(&students);

        let female = &trends.gender_performance[0];
        assert_eq!(female.group, "Female");
        assert_eq!(female.count, 2);
        assert_eq!(female.avg_score, 70.0);

        let ages: Vec<(&str, usize)> = trends
            .age_performance
            .iter()
            .map(|g| (g.group.as_str(), g.count))
            .collect();
        assert_eq!(ages, vec![("15-16", 2), ("19+", 1)]);

        assert_eq!(trends.parental_performance.len(), 1);
        assert_eq!(trends.parental_performance[0].group, "Unknown");
    }

    #[test]
    fn empty_summary_has_zeroes() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_students, 0);
        assert_eq!(summary.avg_predicted_score, 0.0);
        assert!(summary.score_distribution.iter().all(|b| b.percentage == 0.0));
    }
}
