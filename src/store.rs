//! Read-only record store contract used by the scoring engine.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::metrics::{mean, MetricSnapshot};
use crate::models::{
    AttendanceRecord, AttendanceStatus, BehaviourRating, Course, FeedbackCategory,
    FeedbackRecord, Student, Task, TaskStatus,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceCount {
    pub total: u64,
    pub present: u64,
}

/// Source of raw student records.
///
/// Implementations only ever read. `snapshot` groups the per-metric queries so
/// that a backend can answer them from one consistent view of the data.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All students, ordered by name.
    async fn list_students(&self) -> Result<Vec<Student>, StoreError>;

    /// Look up a student by their human-facing code.
    async fn find_student(&self, code: &str) -> Result<Option<Student>, StoreError>;

    async fn count_attendance(&self, student_id: Uuid) -> Result<AttendanceCount, StoreError>;

    /// Mean mark over completed tasks only.
    async fn average_completed_task_mark(&self, student_id: Uuid)
        -> Result<Option<f64>, StoreError>;

    async fn feedback_categories(&self, student_id: Uuid)
        -> Result<Vec<FeedbackCategory>, StoreError>;

    async fn average_behaviour_rating(&self, student_id: Uuid) -> Result<Option<f64>, StoreError>;

    async fn assigned_course(&self, student_id: Uuid) -> Result<Option<Course>, StoreError>;

    async fn completed_task_count(&self, student_id: Uuid, course_id: Uuid)
        -> Result<u64, StoreError>;

    async fn snapshot(&self, student_id: Uuid) -> Result<MetricSnapshot, StoreError> {
        let attendance = self.count_attendance(student_id).await?;
        let average_task_mark = self.average_completed_task_mark(student_id).await?;
        let feedback = self.feedback_categories(student_id).await?;
        let average_behaviour_rating = self.average_behaviour_rating(student_id).await?;
        let course = self.assigned_course(student_id).await?;
        let completed_course_tasks = match &course {
            Some(course) => self.completed_task_count(student_id, course.id).await?,
            None => 0,
        };

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

/// Record store backed by plain vectors.
///
/// Used for offline scoring and tests. Attendance and behaviour ratings keep
/// at most one entry per student and date; recording a second one replaces the
/// first.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    students: Vec<Student>,
    courses: Vec<Course>,
    tasks: Vec<Task>,
    attendance: Vec<AttendanceRecord>,
    behaviour: Vec<BehaviourRating>,
    feedback: Vec<FeedbackRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_course(&mut self, course: Course) {
        self.courses.push(course);
    }

    pub fn add_student(&mut self, student: Student) {
        self.students.push(student);
    }

    pub fn add_task(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn record_attendance(&mut self, record: AttendanceRecord) {
        self.attendance
            .retain(|r| !(r.student_id == record.student_id && r.date == record.date));
        self.attendance.push(record);
    }

    pub fn rate_behaviour(&mut self, rating: BehaviourRating) {
        self.behaviour
            .retain(|r| !(r.student_id == rating.student_id && r.date == rating.date));
        self.behaviour.push(rating);
    }

    pub fn add_feedback(&mut self, record: FeedbackRecord) {
        self.feedback.push(record);
    }

    fn student(&self, student_id: Uuid) -> Result<&Student, StoreError> {
        self.students
            .iter()
            .find(|s| s.id == student_id)
            .ok_or_else(|| StoreError::UnknownStudent(student_id.to_string()))
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let mut students = self.students.clone();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(students)
    }

    async fn find_student(&self, code: &str) -> Result<Option<Student>, StoreError> {
        Ok(self.students.iter().find(|s| s.code == code).cloned())
    }

    async fn count_attendance(&self, student_id: Uuid) -> Result<AttendanceCount, StoreError> {
        let mut count = AttendanceCount::default();
        for record in self.attendance.iter().filter(|r| r.student_id == student_id) {
            count.total += 1;
            if record.status == AttendanceStatus::Present {
                count.present += 1;
            }
        }
        Ok(count)
    }

    async fn average_completed_task_mark(
        &self,
        student_id: Uuid,
    ) -> Result<Option<f64>, StoreError> {
        let marks: Vec<f64> = self
            .tasks
            .iter()
            .filter(|t| t.student_id == student_id && t.status == TaskStatus::Completed)
            .map(|t| t.mark)
            .collect();
        Ok(mean(&marks))
    }

    async fn feedback_categories(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<FeedbackCategory>, StoreError> {
        Ok(self
            .feedback
            .iter()
            .filter(|f| f.student_id == student_id)
            .map(|f| f.category)
            .collect())
    }

    async fn average_behaviour_rating(&self, student_id: Uuid) -> Result<Option<f64>, StoreError> {
        let ratings: Vec<f64> = self
            .behaviour
            .iter()
            .filter(|r| r.student_id == student_id)
            .map(|r| r.rating as f64)
            .collect();
        Ok(mean(&ratings))
    }

    async fn assigned_course(&self, student_id: Uuid) -> Result<Option<Course>, StoreError> {
        let student = self.student(student_id)?;
        Ok(student
            .course_id
            .and_then(|course_id| self.courses.iter().find(|c| c.id == course_id))
            .cloned())
    }

    async fn completed_task_count(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<u64, StoreError> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| {
                t.student_id == student_id
                    && t.course_id == Some(course_id)
                    && t.status == TaskStatus::Completed
            })
            .count() as u64)
    }
}
