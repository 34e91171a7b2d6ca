//! Weighted aggregation of the five metrics into an overall score.
//!
//! ```text
//! raw     = Σ metric_i × weight_i
//! overall = round2(clamp(raw, 0, 100))
//! ```
//!
//! The category is taken from the rounded score, top-down, first match wins:
//! `>= 90` Excellent, `>= 75` Good, `>= 50` Average, otherwise Poor.

use std::cmp::Ordering;

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StoreError};
use crate::metrics::MetricSet;
use crate::models::{
    MetricScore, PerformanceCategory, ScoreBreakdown, ScoreResult, Student, StudentScore,
};
use crate::store::RecordStore;

const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Weights {
    pub attendance: f64,
    pub task_mark: f64,
    pub behaviour: f64,
    pub feedback: f64,
    pub course_completion: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            attendance: 0.20,
            task_mark: 0.30,
            behaviour: 0.15,
            feedback: 0.20,
            course_completion: 0.15,
        }
    }
}

impl Weights {
    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }

    fn as_array(&self) -> [f64; 5] {
        [
            self.attendance,
            self.task_mark,
            self.behaviour,
            self.feedback,
            self.course_completion,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.as_array().iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(ConfigError::InvalidWeights(format!(
                "weight {bad} is not a finite non-negative number"
            )));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ConfigError::InvalidWeights(format!(
                "weights sum to {sum}, expected 1.0"
            )));
        }
        Ok(())
    }
}

/// What a metric with no underlying data contributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDataPolicy {
    /// Count the metric as 0.
    #[default]
    Zero,
    /// Leave the metric out and rescale the remaining weights to 1.0.
    Renormalize,
}

impl std::fmt::Display for MissingDataPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingDataPolicy::Zero => f.write_str("zero"),
            MissingDataPolicy::Renormalize => f.write_str("renormalize"),
        }
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn classify(overall_score: f64) -> PerformanceCategory {
    if overall_score >= 90.0 {
        PerformanceCategory::Excellent
    } else if overall_score >= 75.0 {
        PerformanceCategory::Good
    } else if overall_score >= 50.0 {
        PerformanceCategory::Average
    } else {
        PerformanceCategory::Poor
    }
}

pub fn aggregate(metrics: &MetricSet, weights: &Weights, policy: MissingDataPolicy) -> ScoreResult {
    let terms = [
        (metrics.attendance, weights.attendance),
        (metrics.task_mark, weights.task_mark),
        (metrics.behaviour, weights.behaviour),
        (metrics.feedback, weights.feedback),
        (metrics.course_completion, weights.course_completion),
    ];

    let raw = match policy {
        MissingDataPolicy::Zero => terms
            .iter()
            .map(|(value, weight)| value.unwrap_or(0.0) * weight)
            .sum::<f64>(),
        MissingDataPolicy::Renormalize => {
            let defined_weight: f64 = terms
                .iter()
                .filter(|(value, _)| value.is_some())
                .map(|(_, weight)| weight)
                .sum();
            if defined_weight > 0.0 {
                terms
                    .iter()
                    .filter_map(|(value, weight)| value.map(|v| v * weight))
                    .sum::<f64>()
                    / defined_weight
            } else {
                0.0
            }
        }
    };

    let overall_score = round2(raw.clamp(0.0, 100.0));

    ScoreResult {
        overall_score,
        category: classify(overall_score),
        breakdown: ScoreBreakdown {
            attendance: metric_score(metrics.attendance, weights.attendance),
            task_mark: metric_score(metrics.task_mark, weights.task_mark),
            behaviour: metric_score(metrics.behaviour, weights.behaviour),
            feedback: metric_score(metrics.feedback, weights.feedback),
            course_completion: metric_score(metrics.course_completion, weights.course_completion),
        },
    }
}

fn metric_score(value: Option<f64>, weight: f64) -> MetricScore {
    MetricScore {
        value: round2(value.unwrap_or(0.0)),
        weight,
        measured: value.is_some(),
    }
}

/// Score one student from a single snapshot of their records.
pub async fn score_student<S: RecordStore + ?Sized>(
    store: &S,
    student: &Student,
    weights: &Weights,
    policy: MissingDataPolicy,
) -> Result<ScoreResult, StoreError> {
    let snapshot = store.snapshot(student.id).await?;
    let metrics = MetricSet::from_snapshot(&snapshot);
    let result = aggregate(&metrics, weights, policy);

    tracing::debug!(
        student = %student.code,
        score = result.overall_score,
        category = %result.category,
        "scored student"
    );

    Ok(result)
}

/// Score every student, best first. Students are independent, so up to
/// `parallelism` of them are scored at once.
pub async fn score_all<S: RecordStore + ?Sized>(
    store: &S,
    weights: &Weights,
    policy: MissingDataPolicy,
    parallelism: usize,
) -> Result<Vec<StudentScore>, StoreError> {
    let students = store.list_students().await?;
    let total = students.len();

    let mut scores: Vec<StudentScore> = stream::iter(students)
        .map(|student| async move {
            let result = score_student(store, &student, weights, policy).await?;
            Ok::<_, StoreError>(StudentScore { student, result })
        })
        .buffer_unordered(parallelism.max(1))
        .try_collect()
        .await?;

    scores.sort_by(|a, b| {
        b.result
            .overall_score
            .partial_cmp(&a.result.overall_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.student.name.cmp(&b.student.name))
    });

    tracing::info!(students = total, "scored all students");
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AttendanceRecord, AttendanceStatus, BehaviourRating, Course, FeedbackCategory,
        FeedbackRecord, Task, TaskStatus,
    };
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn zero_filled(metrics: &MetricSet) -> ScoreResult {
        aggregate(metrics, &Weights::default(), MissingDataPolicy::Zero)
    }

    fn renormalized(metrics: &MetricSet) -> ScoreResult {
        aggregate(metrics, &Weights::default(), MissingDataPolicy::Renormalize)
    }

    #[test]
    fn default_weights_sum_to_one() {
        let weights = Weights::default();
        assert!(approx(weights.sum(), 1.0));
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn rejects_weights_that_do_not_sum_to_one() {
        let weights = Weights {
            attendance: 0.5,
            ..Weights::default()
        };
        assert!(matches!(weights.validate(), Err(ConfigError::InvalidWeights(_))));
    }

    #[test]
    fn rejects_negative_weights() {
        let weights = Weights {
            attendance: -0.1,
            task_mark: 0.6,
            ..Weights::default()
        };
        assert!(matches!(weights.validate(), Err(ConfigError::InvalidWeights(_))));
    }

    #[test]
    fn no_data_scores_zero_and_poor() {
        let result = zero_filled(&MetricSet::default());
        assert_eq!(result.overall_score, 0.0);
        assert_eq!(result.category, PerformanceCategory::Poor);
        assert_eq!(result.breakdown.unmeasured().len(), 5);
    }

    #[test]
    fn perfect_metrics_score_one_hundred() {
        let result = zero_filled(&MetricSet::uniform(100.0));
        assert_eq!(result.overall_score, 100.0);
        assert_eq!(result.category, PerformanceCategory::Excellent);
    }

    #[test]
    fn over_completion_is_clamped_in_aggregate_only() {
        let metrics = MetricSet {
            course_completion: Some(400.0),
            ..MetricSet::uniform(100.0)
        };
        let result = zero_filled(&metrics);
        assert_eq!(result.overall_score, 100.0);
        assert_eq!(result.breakdown.course_completion.value, 400.0);
    }

    #[test]
    fn overall_score_stays_in_range() {
        for value in [0.0, 12.5, 49.99, 75.0, 99.99, 100.0, 250.0] {
            let result = zero_filled(&MetricSet::uniform(value));
            assert!((0.0..=100.0).contains(&result.overall_score), "{value}");
        }
    }

    #[test]
    fn category_boundaries_include_lower_edge() {
        assert_eq!(classify(90.0), PerformanceCategory::Excellent);
        assert_eq!(classify(89.99), PerformanceCategory::Good);
        assert_eq!(classify(75.0), PerformanceCategory::Good);
        assert_eq!(classify(74.99), PerformanceCategory::Average);
        assert_eq!(classify(50.0), PerformanceCategory::Average);
        assert_eq!(classify(49.99), PerformanceCategory::Poor);
    }

    #[test]
    fn uniform_ninety_lands_on_excellent() {
        let result = zero_filled(&MetricSet::uniform(90.0));
        assert_eq!(result.overall_score, 90.0);
        assert_eq!(result.category, PerformanceCategory::Excellent);
    }

    #[test]
    fn weighted_example_is_good() {
        let metrics = MetricSet {
            attendance: Some(80.0),
            task_mark: Some(85.0),
            behaviour: Some(75.0),
            feedback: Some(66.67),
            course_completion: Some(70.0),
        };
        let result = zero_filled(&metrics);
        assert!(approx(result.overall_score, 76.58));
        assert_eq!(result.category, PerformanceCategory::Good);
        assert!(approx(result.breakdown.feedback.value, 66.67));
        assert!(approx(result.breakdown.task_mark.weight, 0.30));
    }

    #[test]
    fn breakdown_values_are_rounded() {
        let metrics = MetricSet {
            attendance: Some(200.0 / 3.0),
            ..MetricSet::default()
        };
        let result = zero_filled(&metrics);
        assert!(approx(result.breakdown.attendance.value, 66.67));
        assert!(result.breakdown.attendance.measured);
        assert!(!result.breakdown.feedback.measured);
    }

    #[test]
    fn renormalize_ignores_missing_metrics() {
        let metrics = MetricSet {
            attendance: Some(80.0),
            task_mark: Some(90.0),
            ..MetricSet::default()
        };
        let zero = zero_filled(&metrics);
        let rescaled = renormalized(&metrics);

        assert!(approx(zero.overall_score, 43.0));
        assert!(approx(rescaled.overall_score, 86.0));
        assert_eq!(rescaled.category, PerformanceCategory::Good);
        assert!(approx(rescaled.breakdown.attendance.weight, 0.20));
    }

    #[test]
    fn renormalize_with_no_data_is_zero() {
        let result = renormalized(&MetricSet::default());
        assert_eq!(result.overall_score, 0.0);
        assert_eq!(result.category, PerformanceCategory::Poor);
    }

    #[test]
    fn aggregate_is_deterministic() {
        let metrics = MetricSet {
            attendance: Some(61.0),
            task_mark: Some(72.5),
            behaviour: None,
            feedback: Some(33.33),
            course_completion: Some(110.0),
        };
        let first = zero_filled(&metrics);
        let second = zero_filled(&metrics);
        assert_eq!(first, second);
    }

    fn student(code: &str, name: &str, course_id: Option<Uuid>) -> Student {
        Student {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: name.to_string(),
            email: format!("{}@example.com", code.to_lowercase()),
            course_id,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn populated_store() -> (InMemoryStore, Student, Student) {
        let course = Course {
            id: Uuid::new_v4(),
            name: "Web Development Basics".to_string(),
            expected_task_count: 10,
        };
        let strong = student("INT001", "Avery Lee", Some(course.id));
        let idle = student("INT002", "Jules Moreno", None);

        let mut store = InMemoryStore::new();
        store.add_course(course.clone());
        store.add_student(strong.clone());
        store.add_student(idle.clone());

        for (d, status) in [
            (20, AttendanceStatus::Present),
            (21, AttendanceStatus::Present),
            (22, AttendanceStatus::Absent),
        ] {
            store.record_attendance(AttendanceRecord {
                student_id: strong.id,
                date: day(d),
                status,
            });
        }
        for i in 0..7 {
            store.add_task(Task {
                student_id: strong.id,
                course_id: Some(course.id),
                title: format!("task {i}"),
                status: TaskStatus::Completed,
                mark: 85.0,
            });
        }
        store.add_task(Task {
            student_id: strong.id,
            course_id: Some(course.id),
            title: "unfinished".to_string(),
            status: TaskStatus::Pending,
            mark: 0.0,
        });
        store.rate_behaviour(BehaviourRating {
            student_id: strong.id,
            date: day(20),
            rating: 4,
            recorded_by: "admin".to_string(),
        });
        for category in [FeedbackCategory::Good, FeedbackCategory::Good] {
            store.add_feedback(FeedbackRecord {
                student_id: strong.id,
                task_id: None,
                category,
                comments: String::new(),
            });
        }

        (store, strong, idle)
    }

    #[tokio::test]
    async fn scores_student_from_records() {
        let (store, strong, _) = populated_store();
        let result = score_student(&store, &strong, &Weights::default(), MissingDataPolicy::Zero)
            .await
            .unwrap();

        // 66.67*.2 + 85*.3 + 75*.15 + 66.67*.2 + 70*.15
        assert!(approx(result.overall_score, 73.92));
        assert_eq!(result.category, PerformanceCategory::Average);
        assert!(approx(result.breakdown.attendance.value, 66.67));
        assert!(approx(result.breakdown.course_completion.value, 70.0));
    }

    #[tokio::test]
    async fn student_without_records_scores_zero() {
        let (store, _, idle) = populated_store();
        let result = score_student(&store, &idle, &Weights::default(), MissingDataPolicy::Zero)
            .await
            .unwrap();
        assert_eq!(result.overall_score, 0.0);
        assert_eq!(result.category, PerformanceCategory::Poor);
    }

    #[tokio::test]
    async fn score_all_ranks_best_first() {
        let (store, strong, idle) = populated_store();
        let scores = score_all(&store, &Weights::default(), MissingDataPolicy::Zero, 4)
            .await
            .unwrap();

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].student, strong);
        assert_eq!(scores[1].student, idle);
    }

    #[tokio::test]
    async fn score_all_handles_zero_parallelism() {
        let (store, _, _) = populated_store();
        let scores = score_all(&store, &Weights::default(), MissingDataPolicy::Zero, 0)
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
    }
}
