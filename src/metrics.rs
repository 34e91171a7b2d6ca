//! Per-metric calculators.
//!
//! Every calculator maps raw query results for one student onto the common
//! 0-100 scale. `None` means the student has no data for that metric; the
//! aggregator decides what a missing metric is worth.

use serde::Serialize;

use crate::models::{Course, FeedbackCategory};

/// Raw query results for one student, fetched together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSnapshot {
    pub attendance_total: u64,
    pub attendance_present: u64,
    pub average_task_mark: Option<f64>,
    pub feedback: Vec<FeedbackCategory>,
    pub average_behaviour_rating: Option<f64>,
    pub course: Option<Course>,
    pub completed_course_tasks: u64,
}

/// The five normalized metrics before weighting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricSet {
    pub attendance: Option<f64>,
    pub task_mark: Option<f64>,
    pub behaviour: Option<f64>,
    pub feedback: Option<f64>,
    pub course_completion: Option<f64>,
}

impl MetricSet {
    pub fn from_snapshot(snapshot: &MetricSnapshot) -> Self {
        Self {
            attendance: attendance_rate(snapshot.attendance_total, snapshot.attendance_present),
            task_mark: average_task_mark(snapshot.average_task_mark),
            behaviour: behaviour_score(snapshot.average_behaviour_rating),
            feedback: feedback_score(&snapshot.feedback),
            course_completion: course_completion(
                snapshot.course.as_ref().map(|course| course.expected_task_count),
                snapshot.completed_course_tasks,
            ),
        }
    }

    /// Every metric at the same value, mostly useful for tests and previews.
    pub fn uniform(value: f64) -> Self {
        Self {
            attendance: Some(value),
            task_mark: Some(value),
            behaviour: Some(value),
            feedback: Some(value),
            course_completion: Some(value),
        }
    }
}

pub fn attendance_rate(total_recorded_days: u64, present_days: u64) -> Option<f64> {
    if total_recorded_days == 0 {
        return None;
    }
    Some(100.0 * present_days as f64 / total_recorded_days as f64)
}

/// Marks are already on the 0-100 scale; the store only averages completed tasks.
pub fn average_task_mark(mean_completed_mark: Option<f64>) -> Option<f64> {
    mean_completed_mark
}

pub fn feedback_score(categories: &[FeedbackCategory]) -> Option<f64> {
    let ordinals: Vec<f64> = categories.iter().map(|c| c.ordinal() as f64).collect();
    mean(&ordinals).map(|avg| 100.0 * avg / FeedbackCategory::MAX_ORDINAL as f64)
}

/// Rescales a 1-5 rating mean so that 1 maps to 0 and 5 maps to 100.
pub fn behaviour_score(mean_rating: Option<f64>) -> Option<f64> {
    mean_rating.map(|avg| 100.0 * (avg - 1.0) / 4.0)
}

/// Not capped at 100: over-completion stays visible in the breakdown.
pub fn course_completion(expected_task_count: Option<u32>, completed_tasks: u64) -> Option<f64> {
    match expected_task_count {
        Some(expected) if expected > 0 => {
            Some(100.0 * completed_tasks as f64 / expected as f64)
        }
        _ => None,
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
