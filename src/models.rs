use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: Uuid,
    /// Human-facing identifier such as `INT001`.
    pub code: String,
    pub name: String,
    pub email: String,
    pub course_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Course {
    pub id: Uuid,
    pub name: String,
    pub expected_task_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub student_id: Uuid,
    pub course_id: Option<Uuid>,
    pub title: String,
    pub status: TaskStatus,
    /// Only meaningful once the task is completed.
    pub mark: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceRecord {
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BehaviourRating {
    pub student_id: Uuid,
    pub date: NaiveDate,
    /// 1 (poor) to 5 (excellent).
    pub rating: i32,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackCategory {
    Poor,
    Average,
    Good,
    Excellent,
}

impl FeedbackCategory {
    pub const MAX_ORDINAL: u8 = 3;

    pub fn ordinal(self) -> u8 {
        match self {
            FeedbackCategory::Poor => 0,
            FeedbackCategory::Average => 1,
            FeedbackCategory::Good => 2,
            FeedbackCategory::Excellent => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackCategory::Poor => "Poor",
            FeedbackCategory::Average => "Average",
            FeedbackCategory::Good => "Good",
            FeedbackCategory::Excellent => "Excellent",
        }
    }
}

impl FromStr for FeedbackCategory {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Poor" => Ok(FeedbackCategory::Poor),
            "Average" => Ok(FeedbackCategory::Average),
            "Good" => Ok(FeedbackCategory::Good),
            "Excellent" => Ok(FeedbackCategory::Excellent),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub student_id: Uuid,
    pub task_id: Option<Uuid>,
    pub category: FeedbackCategory,
    pub comments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PerformanceCategory {
    Poor,
    Average,
    Good,
    Excellent,
}

impl fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PerformanceCategory::Poor => "Poor",
            PerformanceCategory::Average => "Average",
            PerformanceCategory::Good => "Good",
            PerformanceCategory::Excellent => "Excellent",
        };
        f.write_str(label)
    }
}

/// One line of the score breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricScore {
    pub value: f64,
    pub weight: f64,
    /// False when the metric had no data and fell back to its default.
    pub measured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub attendance: MetricScore,
    pub task_mark: MetricScore,
    pub behaviour: MetricScore,
    pub feedback: MetricScore,
    pub course_completion: MetricScore,
}

impl ScoreBreakdown {
    pub fn entries(&self) -> [(&'static str, &MetricScore); 5] {
        [
            ("attendance", &self.attendance),
            ("task_mark", &self.task_mark),
            ("behaviour", &self.behaviour),
            ("feedback", &self.feedback),
            ("course_completion", &self.course_completion),
        ]
    }

    pub fn unmeasured(&self) -> Vec<&'static str> {
        self.entries()
            .into_iter()
            .filter(|(_, metric)| !metric.measured)
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    pub overall_score: f64,
    pub category: PerformanceCategory,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentScore {
    pub student: Student,
    pub result: ScoreResult,
}
