//! Enrollment records and their approval lifecycle.
//!
//! - `status`: the closed status vocabulary and enrollment categories
//! - `transition`: the transition table and role rules

pub mod status;
pub mod transition;

pub use status::*;
pub use transition::*;

use serde::{Deserialize, Serialize};

use crate::ids::{EnrollmentId, OfferingId, StudentId, UserId};
use crate::record::Grade;

/// A student's registration against one offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub enrollment_id: EnrollmentId,
    pub student_id: StudentId,
    pub offering_id: OfferingId,
    pub enrol_type: EnrolType,
    pub enrol_status: EnrollmentStatus,
    #[serde(default)]
    pub grade: Option<Grade>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Enrollment {
    /// A fresh request in the initial state.
    pub fn request(
        enrollment_id: EnrollmentId,
        student_id: StudentId,
        offering_id: OfferingId,
        enrol_type: EnrolType,
        now: i64,
    ) -> Self {
        Self {
            enrollment_id,
            student_id,
            offering_id,
            enrol_type,
            enrol_status: EnrollmentStatus::INITIAL,
            grade: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One applied status change, kept as the enrollment's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentEvent {
    #[serde(default)]
    pub id: i64,
    pub enrollment_id: EnrollmentId,
    pub from_status: EnrollmentStatus,
    pub to_status: EnrollmentStatus,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub recorded_at: i64,
}
