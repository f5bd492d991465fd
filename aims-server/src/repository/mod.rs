//! Repository abstraction for academic records.
//!
//! This module defines the `AcademicRepository` trait that abstracts storage
//! of every entity the service owns. Implementations provide different
//! backends (in-memory, SQLite). The one operation with a concurrency
//! contract is [`AcademicRepository::update_enrollment_status`]: it must be a
//! single atomic compare-and-set on the stored status.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use std::fmt;

use aims_core::{
    AdvisorAssignment, Alert, AlertId, Cohort, Course, CourseCode, Enrollment, EnrollmentEvent,
    EnrollmentId, EnrollmentStatus, Grade, Instructor, InstructorId, Offering, OfferingId,
    Student, StudentId,
};
use async_trait::async_trait;

/// Failure of the storage backend itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The backend could not perform an operation.
    Storage {
        operation: &'static str,
        message: String,
    },
    /// A stored value could not be decoded.
    Corruption { what: String },
}

impl RepositoryError {
    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            message: message.into(),
        }
    }

    pub fn corruption(what: impl Into<String>) -> Self {
        Self::Corruption { what: what.into() }
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { operation, message } => {
                write!(f, "storage error during {}: {}", operation, message)
            }
            Self::Corruption { what } => write!(f, "corrupt stored value: {}", what),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Outcome of a conditional status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The stored status matched `expected`; the record now holds the new status.
    Applied(Enrollment),
    /// The stored status had already moved on.
    Stale { current: EnrollmentStatus },
    /// No enrollment with that id.
    Missing,
}

/// Outcome of inserting an enrollment request.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// The student already holds an active enrollment in the offering.
    DuplicateActive(EnrollmentId),
}

/// Outcome of creating a record under a caller-chosen key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// A record with that key exists and was left untouched.
    AlreadyExists,
}

/// Outcome of deleting something other rows may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Missing,
    InUse,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferingFilter {
    pub course_code: Option<CourseCode>,
    pub session: Option<String>,
    pub instructor_id: Option<InstructorId>,
}

impl OfferingFilter {
    pub fn matches(&self, offering: &Offering) -> bool {
        self.course_code
            .as_ref()
            .map_or(true, |c| *c == offering.course_code)
            && self.session.as_ref().map_or(true, |s| *s == offering.session)
            && self
                .instructor_id
                .as_ref()
                .map_or(true, |i| offering.instructors.contains(i))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrollmentFilter {
    pub offering_id: Option<OfferingId>,
    pub student_id: Option<StudentId>,
    /// Restrict to a set of students (advisor scope). An empty set matches nothing.
    pub student_ids: Option<Vec<StudentId>>,
    pub status: Option<EnrollmentStatus>,
}

impl EnrollmentFilter {
    pub fn matches(&self, enrollment: &Enrollment) -> bool {
        self.offering_id
            .as_ref()
            .map_or(true, |o| *o == enrollment.offering_id)
            && self
                .student_id
                .as_ref()
                .map_or(true, |s| *s == enrollment.student_id)
            && self
                .student_ids
                .as_ref()
                .map_or(true, |set| set.contains(&enrollment.student_id))
            && self.status.map_or(true, |s| s == enrollment.enrol_status)
    }
}

/// Storage trait for everything the service persists.
///
/// Reads return `Ok(None)` for missing rows; only backend failures are errors.
#[async_trait]
pub trait AcademicRepository: Send + Sync {
    // Courses
    async fn put_course(&self, course: Course) -> Result<(), RepositoryError>;
    async fn get_course(&self, code: &CourseCode) -> Result<Option<Course>, RepositoryError>;
    async fn list_courses(&self) -> Result<Vec<Course>, RepositoryError>;
    /// Fails with `InUse` while any offering references the course.
    async fn delete_course(&self, code: &CourseCode) -> Result<DeleteOutcome, RepositoryError>;

    // Offerings
    /// Upsert: replaces the offering and its instructor list.
    async fn put_offering(&self, offering: Offering) -> Result<(), RepositoryError>;
    /// Insert-only; an existing offering with the same id is never touched.
    async fn insert_offering(&self, offering: Offering) -> Result<CreateOutcome, RepositoryError>;
    async fn get_offering(&self, id: &OfferingId) -> Result<Option<Offering>, RepositoryError>;
    async fn list_offerings(
        &self,
        filter: &OfferingFilter,
    ) -> Result<Vec<Offering>, RepositoryError>;
    /// Fails with `InUse` while any enrollment references the offering.
    async fn delete_offering(&self, id: &OfferingId) -> Result<DeleteOutcome, RepositoryError>;

    // People
    async fn put_student(&self, student: Student) -> Result<(), RepositoryError>;
    async fn get_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError>;
    /// Students of the given cohorts, or all students when `cohorts` is `None`.
    async fn list_students(
        &self,
        cohorts: Option<&[Cohort]>,
    ) -> Result<Vec<Student>, RepositoryError>;
    async fn put_instructor(&self, instructor: Instructor) -> Result<(), RepositoryError>;
    async fn get_instructor(
        &self,
        id: &InstructorId,
    ) -> Result<Option<Instructor>, RepositoryError>;
    async fn list_instructors(&self) -> Result<Vec<Instructor>, RepositoryError>;

    // Advisor assignments (one advisor per cohort, upsert on cohort)
    async fn put_advisor_assignment(
        &self,
        assignment: AdvisorAssignment,
    ) -> Result<(), RepositoryError>;
    async fn list_advisor_assignments(
        &self,
        advisor_id: Option<&InstructorId>,
    ) -> Result<Vec<AdvisorAssignment>, RepositoryError>;
    async fn delete_advisor_assignment(&self, cohort: &Cohort) -> Result<bool, RepositoryError>;

    // Enrollments
    async fn insert_enrollment(
        &self,
        enrollment: Enrollment,
    ) -> Result<InsertOutcome, RepositoryError>;
    async fn get_enrollment(
        &self,
        id: &EnrollmentId,
    ) -> Result<Option<Enrollment>, RepositoryError>;
    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<Enrollment>, RepositoryError>;
    /// Atomically move an enrollment from `expected` to `next`.
    ///
    /// The write happens only if the stored status still equals `expected`.
    /// `grade` is written together with the status when given.
    async fn update_enrollment_status(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentStatus,
        next: EnrollmentStatus,
        grade: Option<Grade>,
        now: i64,
    ) -> Result<StatusUpdate, RepositoryError>;

    // Enrollment history
    async fn log_event(&self, event: &EnrollmentEvent) -> Result<(), RepositoryError>;
    /// Most recent first.
    async fn get_enrollment_events(
        &self,
        id: &EnrollmentId,
        limit: usize,
    ) -> Result<Vec<EnrollmentEvent>, RepositoryError>;

    // Alerts
    async fn insert_alert(&self, alert: Alert) -> Result<(), RepositoryError>;
    /// Most recent first.
    async fn list_alerts(&self) -> Result<Vec<Alert>, RepositoryError>;
    async fn delete_alert(&self, id: &AlertId) -> Result<bool, RepositoryError>;
}

/// Current unix timestamp in seconds.
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aims_core::EnrolType;

    fn enrollment(student: &str, offering: &str, status: EnrollmentStatus) -> Enrollment {
        let mut e = Enrollment::request(
            EnrollmentId::from(format!("{}-{}", student, offering)),
            StudentId::from(student),
            OfferingId::from(offering),
            EnrolType::Credit,
            0,
        );
        e.enrol_status = status;
        e
    }

    #[test]
    fn test_default_filter_matches_everything() {
        let e = enrollment("s1", "o1", EnrollmentStatus::Enrolled);
        assert!(EnrollmentFilter::default().matches(&e));
    }

    #[test]
    fn test_empty_student_set_matches_nothing() {
        let e = enrollment("s1", "o1", EnrollmentStatus::Enrolled);
        let filter = EnrollmentFilter {
            student_ids: Some(vec![]),
            ..Default::default()
        };
        assert!(!filter.matches(&e));
    }

    #[test]
    fn test_filter_combines_fields() {
        let e = enrollment("s1", "o1", EnrollmentStatus::PendingAdvisor);
        let filter = EnrollmentFilter {
            offering_id: Some(OfferingId::from("o1")),
            status: Some(EnrollmentStatus::PendingAdvisor),
            student_ids: Some(vec![StudentId::from("s1"), StudentId::from("s2")]),
            ..Default::default()
        };
        assert!(filter.matches(&e));
        let other = EnrollmentFilter {
            status: Some(EnrollmentStatus::Enrolled),
            ..filter
        };
        assert!(!other.matches(&e));
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::storage("get_enrollment", "disk I/O error");
        assert_eq!(
            err.to_string(),
            "storage error during get_enrollment: disk I/O error"
        );
    }
}
