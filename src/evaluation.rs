use serde::Serialize;

use crate::data::{Dataset, SchemaVariant, StudentRecord};
use crate::model::FitResult;

/// Largest |actual - predicted| still considered on track (exclusive).
pub const ON_TRACK_MARGIN: f64 = 5.0;
pub const PASS_MARK: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub mse: f64,
    /// `None` when every test target is identical.
    pub r2: Option<f64>,
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return f64::NAN;
    }
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    sum / actual.len() as f64
}

pub fn r2_score(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() {
        return None;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return None;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Some(1.0 - ss_res / ss_tot)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    #[serde(rename = "On Track")]
    OnTrack,
    #[serde(rename = "Needs Attention")]
    NeedsAttention,
}

impl Status {
    pub fn classify(actual: f64, predicted: f64) -> Self {
        if (actual - predicted).abs() < ON_TRACK_MARGIN {
            Status::OnTrack
        } else {
            Status::NeedsAttention
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::OnTrack => "On Track",
            Status::NeedsAttention => "Needs Attention",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceTier {
    Urgent,
    Improvement,
    Good,
    Excellent,
}

impl AdviceTier {
    pub fn for_grade(grade: f64) -> Self {
        if grade < 50.0 {
            AdviceTier::Urgent
        } else if grade < 65.0 {
            AdviceTier::Improvement
        } else if grade < 75.0 {
            AdviceTier::Good
        } else {
            AdviceTier::Excellent
        }
    }

    pub fn headline(&self) -> &'static str {
        match self {
            AdviceTier::Urgent => "Urgent Intervention Needed",
            AdviceTier::Improvement => "Improvement Needed",
            AdviceTier::Good => "Good Progress - Room for Improvement",
            AdviceTier::Excellent => "Excellent Performance",
        }
    }

    pub fn advice(&self) -> &'static [&'static str] {
        match self {
            AdviceTier::Urgent => &[
                "Schedule immediate meeting with academic advisor",
                "Consider peer tutoring or study groups",
                "Review foundational concepts",
                "Increase study hours by at least 50%",
            ],
            AdviceTier::Improvement => &[
                "Increase study hours to 6-8 hours per week",
                "Focus on areas with low CA scores",
                "Attend all tutorials and consultations",
                "Form study groups with high-performing peers",
            ],
            AdviceTier::Good => &[
                "Maintain current study schedule",
                "Focus on exam preparation techniques",
                "Review past papers and practice questions",
                "Consider advanced topics for deeper understanding",
            ],
            AdviceTier::Excellent => &[
                "Keep up the excellent work!",
                "Consider mentoring other students",
                "Explore advanced projects or research",
                "Maintain work-life balance",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceFlag {
    IncreaseStudyHours,
    ImproveContinuousAssessment,
    BalanceActivities,
}

impl AdviceFlag {
    pub fn message(&self) -> &'static str {
        match self {
            AdviceFlag::IncreaseStudyHours => {
                "Increase study hours: Current hours are below recommended minimum"
            }
            AdviceFlag::ImproveContinuousAssessment => {
                "Improve CA performance: Focus on assignments and quizzes"
            }
            AdviceFlag::BalanceActivities => {
                "Balance activities: Consider reducing extra-curricular commitments temporarily"
            }
        }
    }
}

pub fn advice_flags(record: &StudentRecord, actual: f64, schema: SchemaVariant) -> Vec<AdviceFlag> {
    let mut flags = Vec::new();

    if record.hours_studied.is_some_and(|hours| hours < 4.0) {
        flags.push(AdviceFlag::IncreaseStudyHours);
    }

    if schema == SchemaVariant::Detailed
        && record.continuous_assessment.is_some_and(|ca| ca < 20.0)
    {
        flags.push(AdviceFlag::ImproveContinuousAssessment);
    }

    if record.extra_curricular == Some(1.0) && actual < 60.0 {
        flags.push(AdviceFlag::BalanceActivities);
    }

    flags
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Advice {
    pub tier: AdviceTier,
    pub headline: &'static str,
    pub recommendations: &'static [&'static str],
    pub flags: Vec<AdviceFlag>,
    pub notes: Vec<&'static str>,
}

impl Advice {
    pub fn for_record(record: &StudentRecord, actual: f64, schema: SchemaVariant) -> Self {
        let tier = AdviceTier::for_grade(actual);
        let flags = advice_flags(record, actual, schema);
        let notes = flags.iter().map(AdviceFlag::message).collect();
        Advice {
            tier,
            headline: tier.headline(),
            recommendations: tier.advice(),
            flags,
            notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentPrediction {
    /// `student_id` when the upload has one, the row index otherwise.
    pub student: String,
    pub row: usize,
    pub actual: f64,
    pub predicted: f64,
    pub difference: f64,
    pub status: Status,
    pub record: StudentRecord,
    pub advice: Advice,
}

impl StudentPrediction {
    pub fn passes(&self) -> bool {
        self.predicted >= PASS_MARK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub metrics: Metrics,
    pub predictions: Vec<StudentPrediction>,
}

pub fn evaluate(dataset: &Dataset, fit: &FitResult) -> Evaluation {
    let metrics = Metrics {
        mse: mean_squared_error(&fit.test_actual, &fit.test_predicted),
        r2: r2_score(&fit.test_actual, &fit.test_predicted),
    };

    let predictions = fit
        .partition
        .test
        .iter()
        .zip(fit.test_actual.iter().zip(&fit.test_predicted))
        .map(|(&row, (&actual, &predicted))| {
            let record = dataset.record(row);
            let student = record
                .student_id
                .clone()
                .unwrap_or_else(|| row.to_string());
            let advice = Advice::for_record(&record, actual, dataset.schema());
            StudentPrediction {
                student,
                row,
                actual,
                predicted,
                difference: actual - predicted,
                status: Status::classify(actual, predicted),
                record,
                advice,
            }
        })
        .collect();

    Evaluation {
        metrics,
        predictions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hours: f64, ca: Option<f64>, extra: Option<f64>) -> StudentRecord {
        StudentRecord {
            student_id: Some("STU001".to_string()),
            hours_studied: Some(hours),
            course: None,
            course_title: None,
            credit_unit: None,
            continuous_assessment: ca,
            exam_score: None,
            semester: None,
            extra_curricular: extra,
            final_grade: 0.0,
        }
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(AdviceTier::for_grade(49.999), AdviceTier::Urgent);
        assert_eq!(AdviceTier::for_grade(50.0), AdviceTier::Improvement);
        assert_eq!(AdviceTier::for_grade(64.99), AdviceTier::Improvement);
        assert_eq!(AdviceTier::for_grade(65.0), AdviceTier::Good);
        assert_eq!(AdviceTier::for_grade(74.9), AdviceTier::Good);
        assert_eq!(AdviceTier::for_grade(75.0), AdviceTier::Excellent);
        assert_eq!(AdviceTier::for_grade(99.0), AdviceTier::Excellent);
        assert_eq!(AdviceTier::for_grade(67.0), AdviceTier::Good);
    }

    #[test]
    fn every_tier_has_four_recommendations() {
        for tier in [
            AdviceTier::Urgent,
            AdviceTier::Improvement,
            AdviceTier::Good,
            AdviceTier::Excellent,
        ] {
            assert_eq!(tier.advice().len(), 4);
        }
    }

    #[test]
    fn status_margin_is_exclusive() {
        assert_eq!(Status::classify(70.0, 66.0), Status::OnTrack);
        assert_eq!(Status::classify(70.0, 65.0), Status::NeedsAttention);
        assert_eq!(Status::classify(60.0, 66.0), Status::NeedsAttention);
        assert_eq!(Status::OnTrack.label(), "On Track");
    }

    #[test]
    fn metrics_match_hand_computation() {
        let actual = [60.0, 70.0, 80.0];
        let predicted = [62.0, 68.0, 80.0];
        assert!((mean_squared_error(&actual, &predicted) - 8.0 / 3.0).abs() < 1e-12);
        let r2 = r2_score(&actual, &predicted).unwrap();
        assert!((r2 - (1.0 - 8.0 / 200.0)).abs() < 1e-12);
    }

    #[test]
    fn constant_targets_leave_r2_undefined() {
        assert_eq!(r2_score(&[70.0, 70.0], &[69.0, 71.0]), None);
        assert_eq!(r2_score(&[70.0], &[69.0]), None);
    }

    #[test]
    fn flags_are_independent_of_tier() {
        let flags = advice_flags(&record(3.0, Some(18.0), Some(1.0)), 55.0, SchemaVariant::Detailed);
        assert_eq!(
            flags,
            vec![
                AdviceFlag::IncreaseStudyHours,
                AdviceFlag::ImproveContinuousAssessment,
                AdviceFlag::BalanceActivities
            ]
        );

        let flags = advice_flags(&record(6.0, Some(28.0), Some(1.0)), 85.0, SchemaVariant::Detailed);
        assert!(flags.is_empty());
    }

    #[test]
    fn ca_flag_only_applies_to_detailed_schema() {
        let flags = advice_flags(&record(6.0, Some(10.0), Some(0.0)), 40.0, SchemaVariant::Basic);
        assert!(flags.is_empty());
    }

    #[test]
    fn advice_uses_actual_grade() {
        let advice = Advice::for_record(&record(5.0, Some(18.0), None), 67.0, SchemaVariant::Detailed);
        assert_eq!(advice.tier, AdviceTier::Good);
        assert_eq!(advice.headline, "Good Progress - Room for Improvement");
        assert_eq!(advice.flags, vec![AdviceFlag::ImproveContinuousAssessment]);
    }
}
