//! Rule tables turning a prediction into an ordered list of recommendations.

use serde::{Deserialize, Serialize};

use crate::model::PerformanceCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

struct Rule {
    kind: &'static str,
    title: &'static str,
    description: &'static str,
    priority: Priority,
}

impl Rule {
    fn to_recommendation(&self) -> Recommendation {
        Recommendation {
            kind: self.kind.to_string(),
            title: self.title.to_string(),
            description: self.description.to_string(),
            priority: self.priority,
        }
    }
}

const AT_RISK_RULES: &[Rule] = &[
    Rule {
        kind: "academic_support",
        title: "Seek Academic Support",
        description: "Consider meeting with a tutor or academic advisor to develop a study plan.",
        priority: Priority::High,
    },
    Rule {
        kind: "study_habits",
        title: "Improve Study Habits",
        description: "Create a structured study schedule and find a quiet, dedicated study space.",
        priority: Priority::High,
    },
    Rule {
        kind: "attendance",
        title: "Improve Attendance",
        description: "Regular attendance is crucial for academic success. Aim for 90%+ attendance.",
        priority: Priority::Medium,
    },
    Rule {
        kind: "resources",
        title: "Access Learning Resources",
        description: "Utilize school library, online resources, and educational apps for additional support.",
        priority: Priority::Medium,
    },
];

const AVERAGE_RULES: &[Rule] = &[
    Rule {
        kind: "goal_setting",
        title: "Set Specific Goals",
        description: "Set clear, achievable academic goals and track your progress regularly.",
        priority: Priority::Medium,
    },
    Rule {
        kind: "study_techniques",
        title: "Enhance Study Techniques",
        description: "Try different study methods like active recall, spaced repetition, and mind mapping.",
        priority: Priority::Medium,
    },
    Rule {
        kind: "time_management",
        title: "Improve Time Management",
        description: "Use a planner or digital tools to organize your time effectively.",
        priority: Priority::Medium,
    },
];

const HIGH_RULES: &[Rule] = &[
    Rule {
        kind: "advanced_learning",
        title: "Pursue Advanced Learning",
        description: "Consider taking advanced courses or participating in academic competitions.",
        priority: Priority::Low,
    },
    Rule {
        kind: "mentorship",
        title: "Become a Mentor",
        description: "Share your knowledge by helping other students who may be struggling.",
        priority: Priority::Low,
    },
    Rule {
        kind: "leadership",
        title: "Develop Leadership Skills",
        description: "Take on leadership roles in school clubs or academic organizations.",
        priority: Priority::Low,
    },
];

const FOUNDATION: Rule = Rule {
    kind: "foundation",
    title: "Strengthen Foundation",
    description: "Focus on building strong fundamentals in core subjects.",
    priority: Priority::High,
};

const EXCELLENCE: Rule = Rule {
    kind: "excellence",
    title: "Maintain Excellence",
    description: "Continue your excellent work and consider challenging yourself further.",
    priority: Priority::Low,
};

fn category_rules(category: PerformanceCategory) -> &'static [Rule] {
    match category {
        PerformanceCategory::AtRisk => AT_RISK_RULES,
        PerformanceCategory::Average => AVERAGE_RULES,
        PerformanceCategory::High => HIGH_RULES,
    }
}

/// Category block first, in table order, then at most one score addendum:
/// foundation below 70, excellence above 90.
pub fn generate(category: PerformanceCategory, predicted_score: f64) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = category_rules(category)
        .iter()
        .map(Rule::to_recommendation)
        .collect();

    if predicted_score < 70.0 {
        recommendations.push(FOUNDATION.to_recommendation());
    } else if predicted_score > 90.0 {
        recommendations.push(EXCELLENCE.to_recommendation());
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(recs: &[Recommendation]) -> Vec<(&str, Priority)> {
        recs.iter().map(|r| (r.kind.as_str(), r.priority)).collect()
    }

    #[test]
    fn at_risk_low_score_adds_foundation() {
        let recs = generate(PerformanceCategory::AtRisk, 65.0);
        assert_eq!(
            summary(&recs),
            vec![
                ("academic_support", Priority::High),
                ("study_habits", Priority::High),
                ("attendance", Priority::Medium),
                ("resources", Priority::Medium),
                ("foundation", Priority::High),
            ]
        );
    }

    #[test]
    fn high_score_adds_excellence() {
        let recs = generate(PerformanceCategory::High, 95.0);
        assert_eq!(
            summary(&recs),
            vec![
                ("advanced_learning", Priority::Low),
                ("mentorship", Priority::Low),
                ("leadership", Priority::Low),
                ("excellence", Priority::Low),
            ]
        );
    }

    #[test]
    fn mid_score_has_no_addendum() {
        let recs = generate(PerformanceCategory::Average, 80.0);
        assert_eq!(
            summary(&recs),
            vec![
                ("goal_setting", Priority::Medium),
                ("study_techniques", Priority::Medium),
                ("time_management", Priority::Medium),
            ]
        );
    }

    #[test]
    fn addendum_bounds_are_exclusive() {
        assert_eq!(generate(PerformanceCategory::Average, 70.0).len(), 3);
        assert_eq!(generate(PerformanceCategory::Average, 90.0).len(), 3);
        assert_eq!(generate(PerformanceCategory::Average, 69.999).len(), 4);
    }

    #[test]
    fn generation_is_pure() {
        let first = serde_json::to_vec(&generate(PerformanceCategory::AtRisk, 40.0)).unwrap();
        let second = serde_json::to_vec(&generate(PerformanceCategory::AtRisk, 40.0)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn serializes_type_and_lowercase_priority() {
        let value = serde_json::to_value(&generate(PerformanceCategory::High, 80.0)[0]).unwrap();
        assert_eq!(value["type"], "advanced_learning");
        assert_eq!(value["priority"], "low");
    }
}
