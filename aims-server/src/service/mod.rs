//! Application service: enrollment workflow, scoped queries and catalog
//! administration on top of an [`AcademicRepository`].
//!
//! Every operation takes the acting [`Actor`] and enforces the role and scope
//! rules before touching storage. Handlers stay thin and map [`ServiceError`]
//! to HTTP responses.

mod bulk;
mod catalog;
mod enrollments;
mod records;


pub use bulk::{BulkItem, BulkItemError, BulkOutcome};
pub use catalog::{NewAlert, NewOffering, OfferingUpdate};

use std::fmt;
use std::sync::Arc;

use aims_core::{EnrollmentId, InstructorId, Offering, Role, Student, UserId};

use crate::repository::{AcademicRepository, RepositoryError};

/// Maximum number of history events returned for one enrollment.
pub const MAX_HISTORY_EVENTS: usize = 100;

/// Who is making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<UserId>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.user_id, self.role)
    }
}

/// Errors surfaced by service operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    NotFound(String),
    Forbidden(String),
    InvalidTransition(String),
    /// The record changed between read and write, or the caller's expected
    /// status is stale.
    Conflict(String),
    UpstreamUnavailable(RepositoryError),
    BadRequest(String),
    Unauthenticated(String),
    AlreadyEnrolled(EnrollmentId),
    InUse(String),
}

impl ServiceError {
    /// Stable machine-checkable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Conflict(_) => "conflict",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::AlreadyEnrolled(_) => "already_enrolled",
            Self::InUse(_) => "in_use",
        }
    }

    pub(crate) fn not_found(what: &str, id: impl fmt::Display) -> Self {
        Self::NotFound(format!("{} {} not found", what, id))
    }

    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg)
            | Self::Forbidden(msg)
            | Self::InvalidTransition(msg)
            | Self::Conflict(msg)
            | Self::BadRequest(msg)
            | Self::Unauthenticated(msg)
            | Self::InUse(msg) => f.write_str(msg),
            Self::UpstreamUnavailable(e) => write!(f, "persistence unavailable: {}", e),
            Self::AlreadyEnrolled(existing) => write!(
                f,
                "student already holds active enrollment {} in this offering",
                existing
            ),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        Self::UpstreamUnavailable(e)
    }
}

/// The academic service. Cheap to clone; all state lives in the repository.
#[derive(Clone)]
pub struct AcademicService {
    repository: Arc<dyn AcademicRepository>,
}

impl AcademicService {
    pub fn new(repository: Arc<dyn AcademicRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn AcademicRepository> {
        &self.repository
    }

    fn require_admin(&self, actor: &Actor, what: &str) -> Result<(), ServiceError> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!("only admins may {}", what)))
        }
    }

    async fn load_offering(
        &self,
        id: &aims_core::OfferingId,
    ) -> Result<Offering, ServiceError> {
        self.repository
            .get_offering(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("offering", id))
    }

    async fn load_student(&self, id: &aims_core::StudentId) -> Result<Student, ServiceError> {
        self.repository
            .get_student(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("student", id))
    }

    /// Whether `advisor` is assigned to the student's cohort.
    async fn advises(&self, advisor: &UserId, student: &Student) -> Result<bool, ServiceError> {
        let assignments = self
            .repository
            .list_advisor_assignments(Some(&InstructorId::from(advisor)))
            .await?;
        let cohort = student.cohort();
        Ok(assignments.iter().any(|a| a.cohort == cohort))
    }

    /// Whether the actor may see the given student's enrollments and record.
    async fn can_view_student(
        &self,
        actor: &Actor,
        student_id: &aims_core::StudentId,
    ) -> Result<bool, ServiceError> {
        match actor.role {
            Role::Admin => Ok(true),
            Role::Student => Ok(*student_id == actor.user_id),
            Role::Advisor => match self.repository.get_student(student_id).await? {
                Some(student) => self.advises(&actor.user_id, &student).await,
                None => Ok(false),
            },
            Role::Instructor => Ok(false),
        }
    }
}
