//! Academic record (transcript and CGPA) of a student.

use std::collections::HashMap;

use aims_core::record::is_recordable;
use aims_core::{AcademicRecord, Course, Offering, OfferingId, RecordEntry, StudentId};
use tracing::warn;

use super::{AcademicService, Actor, ServiceError};
use crate::repository::EnrollmentFilter;

impl AcademicService {
    /// Completed enrollments of a student with credits and CGPA.
    pub async fn record(
        &self,
        actor: &Actor,
        student_id: &StudentId,
    ) -> Result<AcademicRecord, ServiceError> {
        self.load_student(student_id).await?;
        if !self.can_view_student(actor, student_id).await? {
            return Err(ServiceError::forbidden(format!(
                "{} may not view the record of {}",
                actor, student_id
            )));
        }

        let completed = self
            .repository
            .list_enrollments(&EnrollmentFilter {
                student_id: Some(student_id.clone()),
                ..Default::default()
            })
            .await?;

        let mut catalog: HashMap<OfferingId, Option<(Offering, Course)>> = HashMap::new();
        let mut entries = Vec::new();
        for enrollment in completed.into_iter().filter(is_recordable) {
            let Some(grade) = enrollment.grade else {
                continue;
            };
            if !catalog.contains_key(&enrollment.offering_id) {
                let resolved = self.resolve_course(&enrollment.offering_id).await?;
                catalog.insert(enrollment.offering_id.clone(), resolved);
            }
            let Some(Some((offering, course))) = catalog.get(&enrollment.offering_id) else {
                warn!(
                    "Leaving enrollment {} off the record of {}: offering or course missing",
                    enrollment.enrollment_id, student_id
                );
                continue;
            };
            entries.push(RecordEntry {
                enrollment_id: enrollment.enrollment_id.clone(),
                offering_id: offering.offering_id.clone(),
                course_code: course.course_code.clone(),
                title: course.title.clone(),
                session: offering.session.clone(),
                credits: course.credits,
                enrol_type: enrollment.enrol_type,
                grade,
            });
        }

        Ok(AcademicRecord::compute(student_id.clone(), entries))
    }

    async fn resolve_course(
        &self,
        offering_id: &OfferingId,
    ) -> Result<Option<(Offering, Course)>, ServiceError> {
        let Some(offering) = self.repository.get_offering(offering_id).await? else {
            return Ok(None);
        };
        let course = self.repository.get_course(&offering.course_code).await?;
        Ok(course.map(|course| (offering, course)))
    }
}
