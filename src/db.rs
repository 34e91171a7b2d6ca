use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use crate::error::StoreError;
use crate::metrics::MetricSnapshot;
use crate::models::{Course, FeedbackCategory, Student};
use crate::store::{AttendanceCount, RecordStore};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("schema migrations applied");
    Ok(())
}

/// Postgres-backed record store. Only issues reads.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        code: row.get("student_code"),
        name: row.get("full_name"),
        email: row.get("email"),
        course_id: row.get("course_id"),
    }
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

async fn count_attendance<'e, E: PgExecutor<'e>>(
    executor: E,
    student_id: Uuid,
) -> Result<AttendanceCount, StoreError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS total, \
         COUNT(*) FILTER (WHERE status = 'present') AS present \
         FROM intern_performance.attendance WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_one(executor)
    .await?;

    Ok(AttendanceCount {
        total: non_negative("attendance total", row.get("total"))?,
        present: non_negative("attendance present", row.get("present"))?,
    })
}

async fn average_completed_task_mark<'e, E: PgExecutor<'e>>(
    executor: E,
    student_id: Uuid,
) -> Result<Option<f64>, StoreError> {
    let row = sqlx::query(
        "SELECT AVG(mark) AS avg_mark FROM intern_performance.tasks \
         WHERE student_id = $1 AND status = 'completed'",
    )
    .bind(student_id)
    .fetch_one(executor)
    .await?;

    Ok(row.get("avg_mark"))
}

async fn feedback_categories<'e, E: PgExecutor<'e>>(
    executor: E,
    student_id: Uuid,
) -> Result<Vec<FeedbackCategory>, StoreError> {
    let rows = sqlx::query("SELECT category FROM intern_performance.feedback WHERE student_id = $1")
        .bind(student_id)
        .fetch_all(executor)
        .await?;

    let mut categories = Vec::with_capacity(rows.len());
    for row in rows {
        let label: String = row.get("category");
        match label.parse::<FeedbackCategory>() {
            Ok(category) => categories.push(category),
            Err(unknown) => {
                tracing::warn!(%student_id, label = %unknown, "skipping unknown feedback category");
            }
        }
    }
    Ok(categories)
}

async fn average_behaviour_rating<'e, E: PgExecutor<'e>>(
    executor: E,
    student_id: Uuid,
) -> Result<Option<f64>, StoreError> {
    // AVG over an integer column is NUMERIC in Postgres.
    let row = sqlx::query(
        "SELECT AVG(rating)::DOUBLE PRECISION AS avg_rating \
         FROM intern_performance.behaviour_ratings WHERE student_id = $1",
    )
    .bind(student_id)
    .fetch_one(executor)
    .await?;

    Ok(row.get("avg_rating"))
}

async fn assigned_course<'e, E: PgExecutor<'e>>(
    executor: E,
    student_id: Uuid,
) -> Result<Option<Course>, StoreError> {
    let row = sqlx::query(
        "SELECT c.id AS course_id, c.name, c.expected_task_count \
         FROM intern_performance.students s \
         LEFT JOIN intern_performance.courses c ON c.id = s.course_id \
         WHERE s.id = $1",
    )
    .bind(student_id)
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| StoreError::UnknownStudent(student_id.to_string()))?;

    let Some(course_id) = row.get::<Option<Uuid>, _>("course_id") else {
        return Ok(None);
    };
    let expected: i32 = row.get("expected_task_count");
    let expected_task_count = u32::try_from(expected).map_err(|_| StoreError::InvalidValue {
        field: "expected_task_count",
        value: expected.to_string(),
    })?;

    Ok(Some(Course {
        id: course_id,
        name: row.get("name"),
        expected_task_count,
    }))
}

async fn completed_task_count<'e, E: PgExecutor<'e>>(
    executor: E,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<u64, StoreError> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS completed FROM intern_performance.tasks \
         WHERE student_id = $1 AND course_id = $2 AND status = 'completed'",
    )
    .bind(student_id)
    .bind(course_id)
    .fetch_one(executor)
    .await?;

    non_negative("completed tasks", row.get("completed"))
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, student_code, full_name, email, course_id \
             FROM intern_performance.students ORDER BY full_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(student_from_row).collect())
    }

    async fn find_student(&self, code: &str) -> Result<Option<Student>, StoreError> {
        let row = sqlx::query(
            "SELECT id, student_code, full_name, email, course_id \
             FROM intern_performance.students WHERE student_code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(student_from_row))
    }

    async fn count_attendance(&self, student_id: Uuid) -> Result<AttendanceCount, StoreError> {
        count_attendance(&self.pool, student_id).await
    }

    async fn average_completed_task_mark(
        &self,
        student_id: Uuid,
    ) -> Result<Option<f64>, StoreError> {
        average_completed_task_mark(&self.pool, student_id).await
    }

    async fn feedback_categories(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<FeedbackCategory>, StoreError> {
        feedback_categories(&self.pool, student_id).await
    }

    async fn average_behaviour_rating(&self, student_id: Uuid) -> Result<Option<f64>, StoreError> {
        average_behaviour_rating(&self.pool, student_id).await
    }

    async fn assigned_course(&self, student_id: Uuid) -> Result<Option<Course>, StoreError> {
        assigned_course(&self.pool, student_id).await
    }

    async fn completed_task_count(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<u64, StoreError> {
        completed_task_count(&self.pool, student_id, course_id).await
    }

    /// All six reads run in one read-only repeatable-read transaction, so every
    /// metric sees the same data.
    async fn snapshot(&self, student_id: Uuid) -> Result<MetricSnapshot, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let attendance = count_attendance(&mut *tx, student_id).await?;
        let average_task_mark = average_completed_task_mark(&mut *tx, student_id).await?;
        let feedback = feedback_categories(&mut *tx, student_id).await?;
        let average_behaviour_rating = average_behaviour_rating(&mut *tx, student_id).await?;
        let course = assigned_course(&mut *tx, student_id).await?;
        let completed_course_tasks = match &course {
            Some(course) => completed_task_count(&mut *tx, student_id, course.id).await?,
            None => 0,
        };

        tx.commit().await?;

        Ok(MetricSnapshot {
            attendance_total: attendance.total,
            attendance_present: attendance.present,
            average_task_mark,
            feedback,
            average_behaviour_rating,
            course,
            completed_course_tasks,
        })
    }
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let courses = vec![
        ("Web Development Basics", 10),
        ("Data Science Fundamentals", 8),
        ("Mobile App Development", 12),
        ("Cloud Computing Essentials", 7),
        ("Cybersecurity Basics", 9),
    ];

    for (name, expected_task_count) in &courses {
        sqlx::query(
            r#"
            INSERT INTO intern_performance.courses (id, name, expected_task_count)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET expected_task_count = EXCLUDED.expected_task_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(*expected_task_count)
        .execute(pool)
        .await?;
    }

    let web_dev_id: Uuid =
        sqlx::query("SELECT id FROM intern_performance.courses WHERE name = $1")
            .bind("Web Development Basics")
            .fetch_one(pool)
            .await?
            .get("id");

    let students = vec![
        (
            Uuid::parse_str("6f1c8a52-93d4-4c1e-a0b7-2d5e8f3b9a41")?,
            "INT001",
            "Intern One",
            "intern1@example.com",
            Some(web_dev_id),
        ),
        (
            Uuid::parse_str("b47e2d90-5a13-4f86-9c2e-71d0a4e6c853")?,
            "INT002",
            "Intern Two",
            "intern2@example.com",
            None,
        ),
    ];

    for (id, code, name, email, course_id) in &students {
        sqlx::query(
            r#"
            INSERT INTO intern_performance.students
            (id, student_code, full_name, email, course_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, course_id = EXCLUDED.course_id
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(name)
        .bind(email)
        .bind(course_id)
        .execute(pool)
        .await?;
    }

    let intern_one: Uuid =
        sqlx::query("SELECT id FROM intern_performance.students WHERE student_code = $1")
            .bind("INT001")
            .fetch_one(pool)
            .await?
            .get("id");

    let tasks = vec![
        ("Complete Flask Tutorial", "2025-08-10", "completed", 90.0),
        ("Research ML Models", "2025-08-05", "completed", 85.0),
        ("Build Simple API", "2025-08-15", "pending", 0.0),
    ];

    for (title, due, status, mark) in tasks {
        let due_date = NaiveDate::parse_from_str(due, "%Y-%m-%d").context("invalid due date")?;
        sqlx::query(
            r#"
            INSERT INTO intern_performance.tasks
            (id, student_id, course_id, title, due_date, status, mark)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_id, title) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(intern_one)
        .bind(web_dev_id)
        .bind(title)
        .bind(due_date)
        .bind(status)
        .bind(mark)
        .execute(pool)
        .await?;
    }

    let attendance = vec![
        (NaiveDate::from_ymd_opt(2025, 7, 20).context("invalid date")?, "present"),
        (NaiveDate::from_ymd_opt(2025, 7, 21).context("invalid date")?, "present"),
        (NaiveDate::from_ymd_opt(2025, 7, 22).context("invalid date")?, "absent"),
    ];

    for (date, status) in attendance {
        sqlx::query(
            r#"
            INSERT INTO intern_performance.attendance (id, student_id, date, status)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (student_id, date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(intern_one)
        .bind(date)
        .bind(status)
        .execute(pool)
        .await?;
    }

    let feedback = vec![
        (
            "seed-feedback-001",
            FeedbackCategory::Good,
            "Good work on Flask tutorial, keep it up!",
            NaiveDate::from_ymd_opt(2025, 7, 20).context("invalid date")?,
        ),
        (
            "seed-feedback-002",
            FeedbackCategory::Excellent,
            "Excellent research skills demonstrated.",
            NaiveDate::from_ymd_opt(2025, 7, 25).context("invalid date")?,
        ),
    ];

    for (source_key, category, comments, feedback_date) in feedback {
        sqlx::query(
            r#"
            INSERT INTO intern_performance.feedback
            (id, student_id, category, comments, feedback_date, source_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(intern_one)
        .bind(category.as_str())
        .bind(comments)
        .bind(feedback_date)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    let ratings = vec![
        (NaiveDate::from_ymd_opt(2025, 7, 20).context("invalid date")?, 4),
        (NaiveDate::from_ymd_opt(2025, 7, 21).context("invalid date")?, 5),
    ];

    for (date, rating) in ratings {
        sqlx::query(
            r#"
            INSERT INTO intern_performance.behaviour_ratings
            (id, student_id, date, rating, recorded_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (student_id, date) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(intern_one)
        .bind(date)
        .bind(rating)
        .bind("admin")
        .execute(pool)
        .await?;
    }

    tracing::info!(
        courses = courses.len(),
        students = students.len(),
        "seed data inserted"
    );
    Ok(())
}
