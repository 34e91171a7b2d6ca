use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{PerformanceCategory, StudentScore};
use crate::score::{MissingDataPolicy, Weights};

pub fn summarize_by_category(scores: &[StudentScore]) -> BTreeMap<PerformanceCategory, usize> {
    let mut counts = BTreeMap::new();
    for score in scores {
        *counts.entry(score.result.category).or_insert(0) += 1;
    }
    counts
}

pub fn average_score(scores: &[StudentScore]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let total: f64 = scores.iter().map(|s| s.result.overall_score).sum();
    Some(total / scores.len() as f64)
}

/// Markdown performance overview. `scores` is expected best-first.
pub fn build_report(
    generated_on: NaiveDate,
    weights: &Weights,
    policy: MissingDataPolicy,
    scores: &[StudentScore],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Intern Performance Overview");
    let _ = writeln!(
        output,
        "Generated on {} for {} students (missing data counted as: {})",
        generated_on,
        scores.len(),
        policy
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weights");
    let _ = writeln!(
        output,
        "attendance {:.2}, task mark {:.2}, behaviour {:.2}, feedback {:.2}, course completion {:.2}",
        weights.attendance,
        weights.task_mark,
        weights.behaviour,
        weights.feedback,
        weights.course_completion
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Mix");

    if scores.is_empty() {
        let _ = writeln!(output, "No students on record.");
        return output;
    }

    let counts = summarize_by_category(scores);
    for category in [
        PerformanceCategory::Excellent,
        PerformanceCategory::Good,
        PerformanceCategory::Average,
        PerformanceCategory::Poor,
    ] {
        let _ = writeln!(
            output,
            "- {}: {}",
            category,
            counts.get(&category).copied().unwrap_or(0)
        );
    }
    if let Some(avg) = average_score(scores) {
        let _ = writeln!(output, "- Cohort average: {:.2}", avg);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Ranking");
    let _ = writeln!(
        output,
        "| # | Student | Code | Score | Category | Attendance | Task mark | Behaviour | Feedback | Completion |"
    );
    let _ = writeln!(output, "|---|---|---|---|---|---|---|---|---|---|");
    for (rank, score) in scores.iter().enumerate() {
        let b = &score.result.breakdown;
        let _ = writeln!(
            output,
            "| {} | {} | {} | {:.2} | {} | {:.2} | {:.2} | {:.2} | {:.2} | {:.2} |",
            rank + 1,
            score.student.name,
            score.student.code,
            score.result.overall_score,
            score.result.category,
            b.attendance.value,
            b.task_mark.value,
            b.behaviour.value,
            b.feedback.value,
            b.course_completion.value
        );
    }

    let incomplete: Vec<&StudentScore> = scores
        .iter()
        .filter(|s| !s.result.breakdown.unmeasured().is_empty())
        .collect();

    let _ = writeln!(output);
    let _ = writeln!(output, "## Missing Data");

    if incomplete.is_empty() {
        let _ = writeln!(output, "Every student has data for every metric.");
    } else {
        for score in incomplete {
            let _ = writeln!(
                output,
                "- {} ({}): no data for {}",
                score.student.name,
                score.student.code,
                score.result.breakdown.unmeasured().join(", ")
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricSet;
    use crate::models::Student;
    use crate::score::aggregate;
    use uuid::Uuid;

    fn scored(code: &str, name: &str, metrics: MetricSet) -> StudentScore {
        StudentScore {
            student: Student {
                id: Uuid::new_v4(),
                code: code.to_string(),
                name: name.to_string(),
                email: format!("{}@example.com", code.to_lowercase()),
                course_id: None,
            },
            result: aggregate(&metrics, &Weights::default(), MissingDataPolicy::Zero),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 2).unwrap()
    }

    #[test]
    fn counts_students_per_category() {
        let scores = vec![
            scored("INT001", "Avery Lee", MetricSet::uniform(95.0)),
            scored("INT002", "Jules Moreno", MetricSet::uniform(92.0)),
            scored("INT003", "Kiara Patel", MetricSet::default()),
        ];
        let counts = summarize_by_category(&scores);
        assert_eq!(counts.get(&PerformanceCategory::Excellent), Some(&2));
        assert_eq!(counts.get(&PerformanceCategory::Poor), Some(&1));
        assert_eq!(counts.get(&PerformanceCategory::Good), None);
    }

    #[test]
    fn average_of_no_scores_is_none() {
        assert_eq!(average_score(&[]), None);
        let scores = vec![
            scored("INT001", "Avery Lee", MetricSet::uniform(80.0)),
            scored("INT002", "Jules Moreno", MetricSet::uniform(60.0)),
        ];
        let avg = average_score(&scores).unwrap();
        assert!((avg - 70.0).abs() < 1e-9);
    }

    #[test]
    fn report_ranks_and_flags_missing_data() {
        let scores = vec![
            scored("INT001", "Avery Lee", MetricSet::uniform(95.0)),
            scored(
                "INT002",
                "Jules Moreno",
                MetricSet {
                    attendance: Some(70.0),
                    ..MetricSet::default()
                },
            ),
        ];
        let report = build_report(today(), &Weights::default(), MissingDataPolicy::Zero, &scores);

        assert!(report.contains("# Intern Performance Overview"));
        assert!(report.contains("Generated on 2026-02-02 for 2 students"));
        assert!(report.contains("- Excellent: 1"));
        assert!(report.contains("| 1 | Avery Lee | INT001 | 95.00 | Excellent |"));
        assert!(report.contains(
            "- Jules Moreno (INT002): no data for task_mark, behaviour, feedback, course_completion"
        ));
        assert!(!report.contains("Avery Lee (INT001): no data"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(
            today(),
            &Weights::default(),
            MissingDataPolicy::Renormalize,
            &[],
        );
        assert!(report.contains("missing data counted as: renormalize"));
        assert!(report.contains("No students on record."));
        assert!(!report.contains("## Ranking"));
    }
}
