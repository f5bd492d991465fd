//! Catalog, people, advisor assignments and alerts.

use aims_core::{
    AdvisorAssignment, Alert, AlertId, Cohort, Course, CourseCode, Instructor, InstructorId,
    Offering, OfferingId, Role, Student, StudentId,
};
use serde::Deserialize;
use tracing::info;

use super::{AcademicService, Actor, ServiceError};
use crate::repository::{now_secs, CreateOutcome, DeleteOutcome, OfferingFilter};

/// Request body for creating an offering.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOffering {
    #[serde(default)]
    pub offering_id: Option<OfferingId>,
    pub course_code: CourseCode,
    pub session: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub slot: Option<String>,
    #[serde(default)]
    pub instructors: Vec<InstructorId>,
    /// Required when an admin creates the offering; an instructor creating
    /// one becomes its coordinator.
    #[serde(default)]
    pub coordinator_id: Option<InstructorId>,
}

/// Partial update of an offering; absent fields are kept.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferingUpdate {
    #[serde(default)]
    pub instructors: Option<Vec<InstructorId>>,
    #[serde(default)]
    pub coordinator_id: Option<InstructorId>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub slot: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAlert {
    pub message: String,
}

fn delete_result(outcome: DeleteOutcome, what: &str, id: &str) -> Result<(), ServiceError> {
    match outcome {
        DeleteOutcome::Deleted => Ok(()),
        DeleteOutcome::Missing => Err(ServiceError::not_found(what, id)),
        DeleteOutcome::InUse => Err(ServiceError::InUse(format!(
            "{} {} is still referenced",
            what, id
        ))),
    }
}

impl AcademicService {
    // =========================================================================
    // Courses
    // =========================================================================

    pub async fn list_courses(&self) -> Result<Vec<Course>, ServiceError> {
        Ok(self.repository.list_courses().await?)
    }

    pub async fn get_course(&self, code: &CourseCode) -> Result<Course, ServiceError> {
        self.repository
            .get_course(code)
            .await?
            .ok_or_else(|| ServiceError::not_found("course", code))
    }

    pub async fn put_course(&self, actor: &Actor, course: Course) -> Result<Course, ServiceError> {
        self.require_admin(actor, "edit the course catalog")?;
        course.validate().map_err(ServiceError::BadRequest)?;
        self.repository.put_course(course.clone()).await?;
        info!("Course {} saved by {}", course.course_code, actor);
        Ok(course)
    }

    pub async fn delete_course(&self, actor: &Actor, code: &CourseCode) -> Result<(), ServiceError> {
        self.require_admin(actor, "edit the course catalog")?;
        let outcome = self.repository.delete_course(code).await?;
        delete_result(outcome, "course", code.as_str())
    }

    // =========================================================================
    // Offerings
    // =========================================================================

    pub async fn list_offerings(
        &self,
        filter: &OfferingFilter,
    ) -> Result<Vec<Offering>, ServiceError> {
        Ok(self.repository.list_offerings(filter).await?)
    }

    pub async fn get_offering(&self, id: &OfferingId) -> Result<Offering, ServiceError> {
        self.load_offering(id).await
    }

    pub async fn create_offering(
        &self,
        actor: &Actor,
        request: NewOffering,
    ) -> Result<Offering, ServiceError> {
        let mut instructors = request.instructors;
        let coordinator_id = match actor.role {
            Role::Instructor => {
                let me = InstructorId::from(&actor.user_id);
                if !instructors.contains(&me) {
                    instructors.insert(0, me.clone());
                }
                me
            }
            Role::Admin => request.coordinator_id.ok_or_else(|| {
                ServiceError::BadRequest("coordinator_id is required".to_string())
            })?,
            _ => {
                return Err(ServiceError::forbidden(
                    "only instructors and admins may create offerings",
                ))
            }
        };
        if !instructors.contains(&coordinator_id) {
            instructors.push(coordinator_id.clone());
        }

        if self
            .repository
            .get_course(&request.course_code)
            .await?
            .is_none()
        {
            return Err(ServiceError::not_found("course", &request.course_code));
        }

        let offering_id = request
            .offering_id
            .unwrap_or_else(|| OfferingId::from(uuid::Uuid::new_v4().to_string()));
        let offering = Offering {
            offering_id,
            course_code: request.course_code,
            session: request.session,
            section: request.section,
            slot: request.slot,
            instructors,
            coordinator_id,
        };
        offering.validate().map_err(ServiceError::BadRequest)?;
        match self.repository.insert_offering(offering.clone()).await? {
            CreateOutcome::Created => {}
            CreateOutcome::AlreadyExists => {
                return Err(ServiceError::Conflict(format!(
                    "offering {} already exists",
                    offering.offering_id
                )))
            }
        }
        info!(
            "Offering {} of {} created by {}",
            offering.offering_id, offering.course_code, actor
        );
        Ok(offering)
    }

    pub async fn update_offering(
        &self,
        actor: &Actor,
        id: &OfferingId,
        update: OfferingUpdate,
    ) -> Result<Offering, ServiceError> {
        let mut offering = self.load_offering(id).await?;
        self.require_coordinator(actor, &offering)?;

        if let Some(instructors) = update.instructors {
            offering.instructors = instructors;
        }
        if let Some(coordinator_id) = update.coordinator_id {
            offering.coordinator_id = coordinator_id;
        }
        if update.section.is_some() {
            offering.section = update.section;
        }
        if update.slot.is_some() {
            offering.slot = update.slot;
        }
        offering.validate().map_err(ServiceError::BadRequest)?;
        self.repository.put_offering(offering.clone()).await?;
        info!("Offering {} updated by {}", id, actor);
        Ok(offering)
    }

    pub async fn delete_offering(&self, actor: &Actor, id: &OfferingId) -> Result<(), ServiceError> {
        let offering = self.load_offering(id).await?;
        self.require_coordinator(actor, &offering)?;
        let outcome = self.repository.delete_offering(id).await?;
        delete_result(outcome, "offering", id.as_str())
    }

    fn require_coordinator(&self, actor: &Actor, offering: &Offering) -> Result<(), ServiceError> {
        let coordinator = actor.role == Role::Instructor && offering.is_coordinated_by(&actor.user_id);
        if coordinator || actor.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "only the coordinator of {} or an admin may change it",
                offering.offering_id
            )))
        }
    }

    // =========================================================================
    // People
    // =========================================================================

    pub async fn put_student(&self, actor: &Actor, student: Student) -> Result<Student, ServiceError> {
        self.require_admin(actor, "register students")?;
        if student.student_id.as_str().trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "student_id must not be empty".to_string(),
            ));
        }
        self.repository.put_student(student.clone()).await?;
        Ok(student)
    }

    pub async fn get_student(&self, actor: &Actor, id: &StudentId) -> Result<Student, ServiceError> {
        if actor.role == Role::Student && *id != actor.user_id {
            return Err(ServiceError::forbidden("students may only view themselves"));
        }
        self.load_student(id).await
    }

    pub async fn list_students(
        &self,
        actor: &Actor,
        cohort: Option<Cohort>,
    ) -> Result<Vec<Student>, ServiceError> {
        if !actor.role.is_staff() {
            return Err(ServiceError::forbidden("only staff may list students"));
        }
        let cohorts = cohort.map(|c| vec![c]);
        Ok(self.repository.list_students(cohorts.as_deref()).await?)
    }

    pub async fn put_instructor(
        &self,
        actor: &Actor,
        instructor: Instructor,
    ) -> Result<Instructor, ServiceError> {
        self.require_admin(actor, "register instructors")?;
        if instructor.instructor_id.as_str().trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "instructor_id must not be empty".to_string(),
            ));
        }
        self.repository.put_instructor(instructor.clone()).await?;
        Ok(instructor)
    }

    pub async fn get_instructor(&self, id: &InstructorId) -> Result<Instructor, ServiceError> {
        self.repository
            .get_instructor(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("instructor", id))
    }

    pub async fn list_instructors(&self) -> Result<Vec<Instructor>, ServiceError> {
        Ok(self.repository.list_instructors().await?)
    }

    // =========================================================================
    // Advisor assignments
    // =========================================================================

    pub async fn put_advisor_assignment(
        &self,
        actor: &Actor,
        assignment: AdvisorAssignment,
    ) -> Result<AdvisorAssignment, ServiceError> {
        self.require_admin(actor, "assign advisors")?;
        if self
            .repository
            .get_instructor(&assignment.advisor_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::not_found("instructor", &assignment.advisor_id));
        }
        self.repository
            .put_advisor_assignment(assignment.clone())
            .await?;
        info!(
            "Advisor {} assigned to {} by {}",
            assignment.advisor_id, assignment.cohort, actor
        );
        Ok(assignment)
    }

    pub async fn list_advisor_assignments(
        &self,
        actor: &Actor,
        advisor_id: Option<&InstructorId>,
    ) -> Result<Vec<AdvisorAssignment>, ServiceError> {
        self.require_admin(actor, "list advisor assignments")?;
        Ok(self.repository.list_advisor_assignments(advisor_id).await?)
    }

    pub async fn delete_advisor_assignment(
        &self,
        actor: &Actor,
        cohort: &Cohort,
    ) -> Result<(), ServiceError> {
        self.require_admin(actor, "assign advisors")?;
        if self.repository.delete_advisor_assignment(cohort).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("advisor assignment for", cohort))
        }
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    pub async fn create_alert(&self, actor: &Actor, request: NewAlert) -> Result<Alert, ServiceError> {
        self.require_admin(actor, "post alerts")?;
        if request.message.trim().is_empty() {
            return Err(ServiceError::BadRequest(
                "message must not be empty".to_string(),
            ));
        }
        let alert = Alert {
            alert_id: AlertId::from(uuid::Uuid::new_v4().to_string()),
            owner_id: actor.user_id.clone(),
            message: request.message,
            created_at: now_secs(),
        };
        self.repository.insert_alert(alert.clone()).await?;
        Ok(alert)
    }

    pub async fn list_alerts(&self) -> Result<Vec<Alert>, ServiceError> {
        Ok(self.repository.list_alerts().await?)
    }

    pub async fn delete_alert(&self, actor: &Actor, id: &AlertId) -> Result<(), ServiceError> {
        self.require_admin(actor, "delete alerts")?;
        if self.repository.delete_alert(id).await? {
            Ok(())
        } else {
            Err(ServiceError::not_found("alert", id))
        }
    }
}
