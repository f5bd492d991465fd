//! Bulk approval.
//!
//! Each listed record is approved independently through the single-record
//! write path, with the status observed at listing time as its expected
//! status. Items run concurrently; a failed item never rolls back or cancels
//! the others.

use aims_core::{
    Action, Enrollment, EnrollmentId, EnrollmentStatus, InstructorId, Intent, OfferingId, Role,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AcademicService, Actor, ServiceError};
use crate::repository::EnrollmentFilter;

/// Machine-checkable failure of one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemError {
    pub code: String,
    pub message: String,
}

/// Outcome for one enrollment in a bulk run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    pub enrollment_id: EnrollmentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EnrollmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BulkItemError>,
}

/// Aggregate result of a bulk run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkItem>,
}

impl BulkOutcome {
    fn from_results(results: Vec<BulkItem>) -> Self {
        let succeeded = results.iter().filter(|r| r.error.is_none()).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

impl AcademicService {
    /// Approve every `pending instructor approval` record of an offering.
    pub async fn approve_all_for_offering(
        &self,
        actor: &Actor,
        offering_id: &OfferingId,
    ) -> Result<BulkOutcome, ServiceError> {
        let offering = self.load_offering(offering_id).await?;
        let allowed = actor.is_admin()
            || (actor.role == Role::Instructor && offering.is_taught_by(&actor.user_id));
        if !allowed {
            return Err(ServiceError::forbidden(format!(
                "{} may not approve requests for offering {}",
                actor, offering_id
            )));
        }

        let pending = self
            .repository
            .list_enrollments(&EnrollmentFilter {
                offering_id: Some(offering_id.clone()),
                status: Some(EnrollmentStatus::PendingInstructor),
                ..Default::default()
            })
            .await?;

        let outcome = self.approve_each(actor, pending).await;
        info!(
            "Bulk approval for offering {} by {}: {} succeeded, {} failed",
            offering_id, actor, outcome.succeeded, outcome.failed
        );
        Ok(outcome)
    }

    /// Approve every `pending advisor approval` record of an advisor's
    /// advisees, optionally within one offering.
    pub async fn approve_all_for_advisor(
        &self,
        actor: &Actor,
        advisor_id: &InstructorId,
        offering_id: Option<OfferingId>,
    ) -> Result<BulkOutcome, ServiceError> {
        // Admins cannot take advisor edges, so only the advisor may run this.
        if actor.role != Role::Advisor || *advisor_id != actor.user_id {
            return Err(ServiceError::forbidden(format!(
                "{} may not approve on behalf of advisor {}",
                actor, advisor_id
            )));
        }

        let student_ids = self
            .advisee_students(advisor_id)
            .await?
            .into_iter()
            .map(|s| s.student_id)
            .collect();
        let pending = self
            .repository
            .list_enrollments(&EnrollmentFilter {
                offering_id,
                student_ids: Some(student_ids),
                status: Some(EnrollmentStatus::PendingAdvisor),
                ..Default::default()
            })
            .await?;

        let outcome = self.approve_each(actor, pending).await;
        info!(
            "Bulk approval for advisees of {}: {} succeeded, {} failed",
            advisor_id, outcome.succeeded, outcome.failed
        );
        Ok(outcome)
    }

    async fn approve_each(&self, actor: &Actor, listed: Vec<Enrollment>) -> BulkOutcome {
        let runs = listed.iter().map(|enrollment| {
            self.apply(
                actor,
                &enrollment.enrollment_id,
                Intent::Action(Action::Approve),
                Some(enrollment.enrol_status),
                None,
            )
        });
        let results = join_all(runs)
            .await
            .into_iter()
            .zip(listed.iter())
            .map(|(result, enrollment)| match result {
                Ok(updated) => BulkItem {
                    enrollment_id: updated.enrollment_id,
                    status: Some(updated.enrol_status),
                    error: None,
                },
                Err(e) => BulkItem {
                    enrollment_id: enrollment.enrollment_id.clone(),
                    status: None,
                    error: Some(BulkItemError {
                        code: e.code().to_string(),
                        message: e.to_string(),
                    }),
                },
            })
            .collect();
        BulkOutcome::from_results(results)
    }
}
