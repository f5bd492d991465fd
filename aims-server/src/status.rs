//! Status types for the status endpoint.
//!
//! This module summarises the enrollment workflow for operators.

use aims_core::{Enrollment, EnrollmentStatus};
use serde::Serialize;

/// Enrollment counts per status.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct StatusSummary {
    pub total_enrollments: usize,
    pub pending_instructor: usize,
    pub pending_advisor: usize,
    pub enrolled: usize,
    pub instructor_rejected: usize,
    pub advisor_rejected: usize,
    pub withdrawn: usize,
    pub dropped: usize,
    pub completed: usize,
}

/// Full status data for rendering.
#[derive(Debug, Serialize)]
pub struct StatusData {
    pub version: String,
    pub storage: String,
    pub summary: StatusSummary,
}

impl StatusData {
    /// Create status data from every stored enrollment.
    pub fn from_enrollments(
        enrollments: &[Enrollment],
        version: String,
        storage: impl Into<String>,
    ) -> Self {
        let mut summary = StatusSummary {
            total_enrollments: enrollments.len(),
            ..Default::default()
        };

        for enrollment in enrollments {
            match enrollment.enrol_status {
                EnrollmentStatus::PendingInstructor => summary.pending_instructor += 1,
                EnrollmentStatus::PendingAdvisor => summary.pending_advisor += 1,
                EnrollmentStatus::Enrolled => summary.enrolled += 1,
                EnrollmentStatus::InstructorRejected => summary.instructor_rejected += 1,
                EnrollmentStatus::AdvisorRejected => summary.advisor_rejected += 1,
                EnrollmentStatus::Withdrawn => summary.withdrawn += 1,
                EnrollmentStatus::Dropped => summary.dropped += 1,
                EnrollmentStatus::Completed => summary.completed += 1,
            }
        }

        Self {
            version,
            storage: storage.into(),
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aims_core::{EnrolType, EnrollmentId, OfferingId, StudentId};

    fn enrollment(id: &str, status: EnrollmentStatus) -> Enrollment {
        let mut e = Enrollment::request(
            EnrollmentId::from(id),
            StudentId::from("s1"),
            OfferingId::from(id),
            EnrolType::Credit,
            0,
        );
        e.enrol_status = status;
        e
    }

    #[test]
    fn test_empty_summary() {
        let data = StatusData::from_enrollments(&[], "1.0.0".to_string(), "memory");
        assert_eq!(data.summary, StatusSummary::default());
        assert_eq!(data.version, "1.0.0");
    }

    #[test]
    fn test_counts_per_status() {
        let enrollments = vec![
            enrollment("e1", EnrollmentStatus::PendingInstructor),
            enrollment("e2", EnrollmentStatus::PendingInstructor),
            enrollment("e3", EnrollmentStatus::Enrolled),
            enrollment("e4", EnrollmentStatus::Dropped),
        ];
        let data = StatusData::from_enrollments(&enrollments, "v".to_string(), "sqlite");
        assert_eq!(data.summary.total_enrollments, 4);
        assert_eq!(data.summary.pending_instructor, 2);
        assert_eq!(data.summary.enrolled, 1);
        assert_eq!(data.summary.dropped, 1);
        assert_eq!(data.summary.completed, 0);

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["summary"]["pending_instructor"], 2);
        assert_eq!(json["storage"], "sqlite");
    }
}
