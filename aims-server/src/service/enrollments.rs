//! Enrollment requests, transitions and scoped enrollment queries.

use aims_core::{
    plan, Action, EnrolType, Enrollment, EnrollmentEvent, EnrollmentId, EnrollmentStatus, Grade,
    InstructorId, Intent, OfferingId, Role, Student, StudentId, TransitionError,
};
use tracing::{info, warn};

use super::{AcademicService, Actor, ServiceError, MAX_HISTORY_EVENTS};
use crate::repository::{now_secs, EnrollmentFilter, InsertOutcome, StatusUpdate};

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::Invalid { .. } => Self::InvalidTransition(e.to_string()),
            TransitionError::Forbidden { .. } => Self::Forbidden(e.to_string()),
        }
    }
}

impl AcademicService {
    /// Submit an enrollment request for the acting student.
    pub async fn enroll(
        &self,
        actor: &Actor,
        offering_id: &OfferingId,
        enrol_type: EnrolType,
    ) -> Result<Enrollment, ServiceError> {
        if actor.role != Role::Student {
            return Err(ServiceError::forbidden(
                "only students may request enrollment",
            ));
        }
        let student_id = StudentId::from(&actor.user_id);
        self.load_student(&student_id).await?;
        self.load_offering(offering_id).await?;

        let enrollment = Enrollment::request(
            EnrollmentId::from(uuid::Uuid::new_v4().to_string()),
            student_id,
            offering_id.clone(),
            enrol_type,
            now_secs(),
        );

        match self.repository.insert_enrollment(enrollment.clone()).await? {
            InsertOutcome::Inserted => {
                info!(
                    "Enrollment {} requested by {} for offering {} ({})",
                    enrollment.enrollment_id, actor.user_id, offering_id, enrol_type
                );
                Ok(enrollment)
            }
            InsertOutcome::DuplicateActive(existing) => {
                Err(ServiceError::AlreadyEnrolled(existing))
            }
        }
    }

    /// Fetch one enrollment the actor is allowed to see.
    pub async fn get_enrollment(
        &self,
        actor: &Actor,
        id: &EnrollmentId,
    ) -> Result<Enrollment, ServiceError> {
        let enrollment = self.load_enrollment(id).await?;
        if !self.can_view_enrollment(actor, &enrollment).await? {
            return Err(ServiceError::forbidden(format!(
                "{} may not view enrollment {}",
                actor, id
            )));
        }
        Ok(enrollment)
    }

    /// Transition history of one enrollment, most recent first.
    pub async fn history(
        &self,
        actor: &Actor,
        id: &EnrollmentId,
    ) -> Result<Vec<EnrollmentEvent>, ServiceError> {
        self.get_enrollment(actor, id).await?;
        Ok(self
            .repository
            .get_enrollment_events(id, MAX_HISTORY_EVENTS)
            .await?)
    }

    /// Move an enrollment along one edge of the transition table.
    ///
    /// A `completed` target needs a grade; use [`AcademicService::complete`].
    pub async fn transition(
        &self,
        actor: &Actor,
        id: &EnrollmentId,
        intent: Intent,
        expected: Option<EnrollmentStatus>,
    ) -> Result<Enrollment, ServiceError> {
        self.apply(actor, id, intent, expected, None).await
    }

    /// Post a grade, completing an enrolled record.
    pub async fn complete(
        &self,
        actor: &Actor,
        id: &EnrollmentId,
        grade: Grade,
        expected: Option<EnrollmentStatus>,
    ) -> Result<Enrollment, ServiceError> {
        self.apply(actor, id, Intent::Action(Action::Complete), expected, Some(grade))
            .await
    }

    /// The single write path for enrollment status.
    pub(super) async fn apply(
        &self,
        actor: &Actor,
        id: &EnrollmentId,
        intent: Intent,
        expected: Option<EnrollmentStatus>,
        grade: Option<Grade>,
    ) -> Result<Enrollment, ServiceError> {
        let current = self.load_enrollment(id).await?;
        // Out-of-scope callers learn nothing about the record's status.
        self.check_transition_scope(actor, &current).await?;
        let from = current.enrol_status;

        if let Some(expected) = expected {
            if expected != from {
                return Err(ServiceError::Conflict(format!(
                    "enrollment {} is `{}`, not `{}`",
                    id, from, expected
                )));
            }
        }

        let edge = plan(from, intent, actor.role)?;

        if edge.to == EnrollmentStatus::Completed && grade.is_none() {
            return Err(ServiceError::BadRequest(
                "a grade is required to complete an enrollment".to_string(),
            ));
        }

        let now = now_secs();
        let updated = match self
            .repository
            .update_enrollment_status(id, from, edge.to, grade, now)
            .await?
        {
            StatusUpdate::Applied(enrollment) => enrollment,
            StatusUpdate::Stale { current } => {
                return Err(ServiceError::Conflict(format!(
                    "enrollment {} moved to `{}` while `{}` was being applied",
                    id, current, edge.action
                )))
            }
            StatusUpdate::Missing => return Err(ServiceError::not_found("enrollment", id)),
        };

        info!(
            "Enrollment {}: {} -> {} by {}",
            id, from, edge.to, actor
        );

        let event = EnrollmentEvent {
            id: 0,
            enrollment_id: id.clone(),
            from_status: from,
            to_status: edge.to,
            actor_id: actor.user_id.clone(),
            actor_role: actor.role,
            recorded_at: now,
        };
        if let Err(e) = self.repository.log_event(&event).await {
            warn!("Failed to record history for enrollment {}: {}", id, e);
        }

        Ok(updated)
    }

    /// Instructors must teach the offering, advisors must advise the
    /// student's cohort, students may only move their own records.
    async fn check_transition_scope(
        &self,
        actor: &Actor,
        enrollment: &Enrollment,
    ) -> Result<(), ServiceError> {
        let allowed = match actor.role {
            Role::Admin => true,
            Role::Student => enrollment.student_id == actor.user_id,
            Role::Instructor => match self.repository.get_offering(&enrollment.offering_id).await? {
                Some(offering) => offering.is_taught_by(&actor.user_id),
                None => false,
            },
            Role::Advisor => match self.repository.get_student(&enrollment.student_id).await? {
                Some(student) => self.advises(&actor.user_id, &student).await?,
                None => false,
            },
        };
        if allowed {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "{} is not responsible for enrollment {}",
                actor, enrollment.enrollment_id
            )))
        }
    }

    async fn can_view_enrollment(
        &self,
        actor: &Actor,
        enrollment: &Enrollment,
    ) -> Result<bool, ServiceError> {
        match actor.role {
            Role::Instructor => Ok(self
                .repository
                .get_offering(&enrollment.offering_id)
                .await?
                .map_or(false, |o| o.is_taught_by(&actor.user_id))),
            _ => self.can_view_student(actor, &enrollment.student_id).await,
        }
    }

    pub(super) async fn load_enrollment(
        &self,
        id: &EnrollmentId,
    ) -> Result<Enrollment, ServiceError> {
        self.repository
            .get_enrollment(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("enrollment", id))
    }

    /// Enrollments of one offering, for its instructors and admins.
    pub async fn list_offering_enrollments(
        &self,
        actor: &Actor,
        offering_id: &OfferingId,
        status: Option<EnrollmentStatus>,
    ) -> Result<Vec<Enrollment>, ServiceError> {
        let offering = self.load_offering(offering_id).await?;
        let allowed = actor.is_admin()
            || (actor.role == Role::Instructor && offering.is_taught_by(&actor.user_id));
        if !allowed {
            return Err(ServiceError::forbidden(format!(
                "{} does not teach offering {}",
                actor, offering_id
            )));
        }
        Ok(self
            .repository
            .list_enrollments(&EnrollmentFilter {
                offering_id: Some(offering_id.clone()),
                status,
                ..Default::default()
            })
            .await?)
    }

    /// Enrollments of one student, for the student, their advisor and admins.
    pub async fn list_student_enrollments(
        &self,
        actor: &Actor,
        student_id: &StudentId,
    ) -> Result<Vec<Enrollment>, ServiceError> {
        self.load_student(student_id).await?;
        if !self.can_view_student(actor, student_id).await? {
            return Err(ServiceError::forbidden(format!(
                "{} may not view enrollments of {}",
                actor, student_id
            )));
        }
        Ok(self
            .repository
            .list_enrollments(&EnrollmentFilter {
                student_id: Some(student_id.clone()),
                ..Default::default()
            })
            .await?)
    }

    /// Students in the cohorts assigned to `advisor_id`.
    pub async fn advisees(
        &self,
        actor: &Actor,
        advisor_id: &InstructorId,
    ) -> Result<Vec<Student>, ServiceError> {
        self.check_advisor_scope(actor, advisor_id)?;
        self.advisee_students(advisor_id).await
    }

    /// Enrollments of an advisor's advisees ("my pending works").
    pub async fn list_advisor_enrollments(
        &self,
        actor: &Actor,
        advisor_id: &InstructorId,
        status: Option<EnrollmentStatus>,
        offering_id: Option<OfferingId>,
    ) -> Result<Vec<Enrollment>, ServiceError> {
        self.check_advisor_scope(actor, advisor_id)?;
        let student_ids = self
            .advisee_students(advisor_id)
            .await?
            .into_iter()
            .map(|s| s.student_id)
            .collect();
        Ok(self
            .repository
            .list_enrollments(&EnrollmentFilter {
                offering_id,
                student_ids: Some(student_ids),
                status,
                ..Default::default()
            })
            .await?)
    }

    pub(super) fn check_advisor_scope(
        &self,
        actor: &Actor,
        advisor_id: &InstructorId,
    ) -> Result<(), ServiceError> {
        let own = actor.role == Role::Advisor && *advisor_id == actor.user_id;
        if own || actor.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "{} may not act for advisor {}",
                actor, advisor_id
            )))
        }
    }

    pub(super) async fn advisee_students(
        &self,
        advisor_id: &InstructorId,
    ) -> Result<Vec<Student>, ServiceError> {
        let cohorts: Vec<_> = self
            .repository
            .list_advisor_assignments(Some(advisor_id))
            .await?
            .into_iter()
            .map(|a| a.cohort)
            .collect();
        Ok(self.repository.list_students(Some(&cohorts)).await?)
    }
}
