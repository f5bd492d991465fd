//! In-memory implementation of `AcademicRepository`.
//!
//! All tables live in one struct behind a single `RwLock`, so every
//! operation (in particular the conditional status update) observes and
//! mutates a consistent snapshot. All state is lost on restart.

use std::collections::{BTreeMap, HashMap};

use aims_core::{
    AdvisorAssignment, Alert, AlertId, Cohort, Course, CourseCode, Enrollment, EnrollmentEvent,
    EnrollmentId, EnrollmentStatus, Grade, Instructor, InstructorId, Offering, OfferingId,
    Student, StudentId,
};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    AcademicRepository, CreateOutcome, DeleteOutcome, EnrollmentFilter, InsertOutcome, OfferingFilter,
    RepositoryError, StatusUpdate,
};

#[derive(Default)]
struct Tables {
    courses: BTreeMap<CourseCode, Course>,
    offerings: BTreeMap<OfferingId, Offering>,
    students: BTreeMap<StudentId, Student>,
    instructors: BTreeMap<InstructorId, Instructor>,
    advisors: BTreeMap<Cohort, InstructorId>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    events: Vec<EnrollmentEvent>,
    alerts: Vec<Alert>,
}

/// In-memory repository.
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcademicRepository for InMemoryRepository {
    async fn put_course(&self, course: Course) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.courses.insert(course.course_code.clone(), course);
        Ok(())
    }

    async fn get_course(&self, code: &CourseCode) -> Result<Option<Course>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.courses.get(code).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.courses.values().cloned().collect())
    }

    async fn delete_course(&self, code: &CourseCode) -> Result<DeleteOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.courses.contains_key(code) {
            return Ok(DeleteOutcome::Missing);
        }
        if tables.offerings.values().any(|o| o.course_code == *code) {
            return Ok(DeleteOutcome::InUse);
        }
        tables.courses.remove(code);
        Ok(DeleteOutcome::Deleted)
    }

    async fn put_offering(&self, offering: Offering) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables
            .offerings
            .insert(offering.offering_id.clone(), offering);
        Ok(())
    }

    async fn insert_offering(&self, offering: Offering) -> Result<CreateOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.offerings.contains_key(&offering.offering_id) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        tables
            .offerings
            .insert(offering.offering_id.clone(), offering);
        Ok(CreateOutcome::Created)
    }

    async fn get_offering(&self, id: &OfferingId) -> Result<Option<Offering>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.offerings.get(id).cloned())
    }

    async fn list_offerings(
        &self,
        filter: &OfferingFilter,
    ) -> Result<Vec<Offering>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .offerings
            .values()
            .filter(|o| filter.matches(o))
            .cloned()
            .collect())
    }

    async fn delete_offering(&self, id: &OfferingId) -> Result<DeleteOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.offerings.contains_key(id) {
            return Ok(DeleteOutcome::Missing);
        }
        if tables.enrollments.values().any(|e| e.offering_id == *id) {
            return Ok(DeleteOutcome::InUse);
        }
        tables.offerings.remove(id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn put_student(&self, student: Student) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.students.insert(student.student_id.clone(), student);
        Ok(())
    }

    async fn get_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.students.get(id).cloned())
    }

    async fn list_students(
        &self,
        cohorts: Option<&[Cohort]>,
    ) -> Result<Vec<Student>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .students
            .values()
            .filter(|s| cohorts.map_or(true, |c| c.contains(&s.cohort())))
            .cloned()
            .collect())
    }

    async fn put_instructor(&self, instructor: Instructor) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables
            .instructors
            .insert(instructor.instructor_id.clone(), instructor);
        Ok(())
    }

    async fn get_instructor(
        &self,
        id: &InstructorId,
    ) -> Result<Option<Instructor>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.instructors.get(id).cloned())
    }

    async fn list_instructors(&self) -> Result<Vec<Instructor>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.instructors.values().cloned().collect())
    }

    async fn put_advisor_assignment(
        &self,
        assignment: AdvisorAssignment,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables
            .advisors
            .insert(assignment.cohort, assignment.advisor_id);
        Ok(())
    }

    async fn list_advisor_assignments(
        &self,
        advisor_id: Option<&InstructorId>,
    ) -> Result<Vec<AdvisorAssignment>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .advisors
            .iter()
            .filter(|(_, advisor)| advisor_id.map_or(true, |id| *advisor == id))
            .map(|(cohort, advisor)| AdvisorAssignment {
                advisor_id: advisor.clone(),
                cohort: cohort.clone(),
            })
            .collect())
    }

    async fn delete_advisor_assignment(&self, cohort: &Cohort) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.advisors.remove(cohort).is_some())
    }

    async fn insert_enrollment(
        &self,
        enrollment: Enrollment,
    ) -> Result<InsertOutcome, RepositoryError> {
        let mut tables = self.tables.write().await;
        let existing = tables.enrollments.values().find(|e| {
            e.student_id == enrollment.student_id
                && e.offering_id == enrollment.offering_id
                && e.enrol_status.is_active()
        });
        if let Some(existing) = existing {
            return Ok(InsertOutcome::DuplicateActive(existing.enrollment_id.clone()));
        }
        tables
            .enrollments
            .insert(enrollment.enrollment_id.clone(), enrollment);
        Ok(InsertOutcome::Inserted)
    }

    async fn get_enrollment(
        &self,
        id: &EnrollmentId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.enrollments.get(id).cloned())
    }

    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut found: Vec<Enrollment> = tables
            .enrollments
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            (a.created_at, &a.enrollment_id).cmp(&(b.created_at, &b.enrollment_id))
        });
        Ok(found)
    }

    async fn update_enrollment_status(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentStatus,
        next: EnrollmentStatus,
        grade: Option<Grade>,
        now: i64,
    ) -> Result<StatusUpdate, RepositoryError> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.enrollments.get_mut(id) else {
            return Ok(StatusUpdate::Missing);
        };
        if record.enrol_status != expected {
            return Ok(StatusUpdate::Stale {
                current: record.enrol_status,
            });
        }
        record.enrol_status = next;
        if grade.is_some() {
            record.grade = grade;
        }
        record.updated_at = now;
        Ok(StatusUpdate::Applied(record.clone()))
    }

    async fn log_event(&self, event: &EnrollmentEvent) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let mut event = event.clone();
        event.id = tables.events.len() as i64 + 1;
        tables.events.push(event);
        Ok(())
    }

    async fn get_enrollment_events(
        &self,
        id: &EnrollmentId,
        limit: usize,
    ) -> Result<Vec<EnrollmentEvent>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .events
            .iter()
            .rev()
            .filter(|e| e.enrollment_id == *id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.alerts.push(alert);
        Ok(())
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut alerts = tables.alerts.clone();
        alerts.reverse();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn delete_alert(&self, id: &AlertId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let before = tables.alerts.len();
        tables.alerts.retain(|a| a.alert_id != *id);
        Ok(tables.alerts.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aims_core::{EnrolType, Role, UserId};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn request(id: &str, student: &str, offering: &str) -> Enrollment {
        Enrollment::request(
            EnrollmentId::from(id),
            StudentId::from(student),
            OfferingId::from(offering),
            EnrolType::Credit,
            100,
        )
    }

    fn course(code: &str) -> Course {
        Course {
            course_code: CourseCode::from(code),
            title: format!("Course {}", code),
            credits: 3.0,
            department: "CSE".to_string(),
            description: None,
        }
    }

    fn offering(id: &str, code: &str) -> Offering {
        Offering {
            offering_id: OfferingId::from(id),
            course_code: CourseCode::from(code),
            session: "2024-I".to_string(),
            section: None,
            slot: None,
            instructors: vec![InstructorId::from("i1")],
            coordinator_id: InstructorId::from("i1"),
        }
    }

    #[tokio::test]
    async fn test_get_returns_none_for_missing() {
        let repo = InMemoryRepository::new();
        let result = repo.get_enrollment(&EnrollmentId::from("e1")).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let repo = InMemoryRepository::new();
        let outcome = repo.insert_enrollment(request("e1", "s1", "o1")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);

        let stored = repo
            .get_enrollment(&EnrollmentId::from("e1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.enrol_status, EnrollmentStatus::PendingInstructor);
    }

    #[tokio::test]
    async fn test_duplicate_active_enrollment_is_refused() {
        let repo = InMemoryRepository::new();
        repo.insert_enrollment(request("e1", "s1", "o1")).await.unwrap();
        let outcome = repo.insert_enrollment(request("e2", "s1", "o1")).await.unwrap();
        assert_eq!(
            outcome,
            InsertOutcome::DuplicateActive(EnrollmentId::from("e1"))
        );
    }

    #[tokio::test]
    async fn test_reenrolling_after_drop_is_allowed() {
        let repo = InMemoryRepository::new();
        repo.insert_enrollment(request("e1", "s1", "o1")).await.unwrap();
        repo.update_enrollment_status(
            &EnrollmentId::from("e1"),
            EnrollmentStatus::PendingInstructor,
            EnrollmentStatus::Dropped,
            None,
            200,
        )
        .await
        .unwrap();
        let outcome = repo.insert_enrollment(request("e2", "s1", "o1")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn test_update_applies_when_expected_matches() {
        let repo = InMemoryRepository::new();
        repo.insert_enrollment(request("e1", "s1", "o1")).await.unwrap();
        let update = repo
            .update_enrollment_status(
                &EnrollmentId::from("e1"),
                EnrollmentStatus::PendingInstructor,
                EnrollmentStatus::PendingAdvisor,
                None,
                200,
            )
            .await
            .unwrap();
        match update {
            StatusUpdate::Applied(e) => {
                assert_eq!(e.enrol_status, EnrollmentStatus::PendingAdvisor);
                assert_eq!(e.updated_at, 200);
            }
            other => panic!("expected Applied, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_reports_stale_and_leaves_record() {
        let repo = InMemoryRepository::new();
        repo.insert_enrollment(request("e1", "s1", "o1")).await.unwrap();
        let update = repo
            .update_enrollment_status(
                &EnrollmentId::from("e1"),
                EnrollmentStatus::PendingAdvisor,
                EnrollmentStatus::Enrolled,
                None,
                200,
            )
            .await
            .unwrap();
        assert_eq!(
            update,
            StatusUpdate::Stale {
                current: EnrollmentStatus::PendingInstructor
            }
        );
        let stored = repo
            .get_enrollment(&EnrollmentId::from("e1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.enrol_status, EnrollmentStatus::PendingInstructor);
        assert_eq!(stored.updated_at, 100);
    }

    #[tokio::test]
    async fn test_update_missing() {
        let repo = InMemoryRepository::new();
        let update = repo
            .update_enrollment_status(
                &EnrollmentId::from("nope"),
                EnrollmentStatus::PendingInstructor,
                EnrollmentStatus::PendingAdvisor,
                None,
                1,
            )
            .await
            .unwrap();
        assert_eq!(update, StatusUpdate::Missing);
    }

    #[tokio::test]
    async fn test_delete_course_in_use() {
        let repo = InMemoryRepository::new();
        repo.put_course(course("CS101")).await.unwrap();
        repo.put_offering(offering("o1", "CS101")).await.unwrap();
        let outcome = repo.delete_course(&CourseCode::from("CS101")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::InUse);

        repo.delete_offering(&OfferingId::from("o1")).await.unwrap();
        let outcome = repo.delete_course(&CourseCode::from("CS101")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_insert_offering_never_replaces() {
        let repo = InMemoryRepository::new();
        assert_eq!(
            repo.insert_offering(offering("o1", "CS101")).await.unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            repo.insert_offering(offering("o1", "MA101")).await.unwrap(),
            CreateOutcome::AlreadyExists
        );
        let stored = repo
            .get_offering(&OfferingId::from("o1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.course_code, CourseCode::from("CS101"));
    }

    #[tokio::test]
    async fn test_advisor_assignment_is_one_per_cohort() {
        let repo = InMemoryRepository::new();
        let cohort = Cohort {
            degree: "B.Tech".to_string(),
            branch: "CSE".to_string(),
            batch: 2021,
        };
        for advisor in ["i1", "i2"] {
            repo.put_advisor_assignment(AdvisorAssignment {
                advisor_id: InstructorId::from(advisor),
                cohort: cohort.clone(),
            })
            .await
            .unwrap();
        }
        let all = repo.list_advisor_assignments(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].advisor_id, InstructorId::from("i2"));
    }

    #[tokio::test]
    async fn test_events_most_recent_first() {
        let repo = InMemoryRepository::new();
        for (i, to) in [EnrollmentStatus::PendingAdvisor, EnrollmentStatus::Enrolled]
            .into_iter()
            .enumerate()
        {
            repo.log_event(&EnrollmentEvent {
                id: 0,
                enrollment_id: EnrollmentId::from("e1"),
                from_status: EnrollmentStatus::PendingInstructor,
                to_status: to,
                actor_id: UserId::from("i1"),
                actor_role: Role::Instructor,
                recorded_at: i as i64,
            })
            .await
            .unwrap();
        }
        let events = repo
            .get_enrollment_events(&EnrollmentId::from("e1"), 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].to_status, EnrollmentStatus::Enrolled);
    }

    #[tokio::test]
    async fn test_concurrent_updates_only_one_wins() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_enrollment(request("e1", "s1", "o1")).await.unwrap();

        let mut handles = Vec::new();
        for next in [
            EnrollmentStatus::PendingAdvisor,
            EnrollmentStatus::InstructorRejected,
        ] {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.update_enrollment_status(
                    &EnrollmentId::from("e1"),
                    EnrollmentStatus::PendingInstructor,
                    next,
                    None,
                    5,
                )
                .await
                .unwrap()
            }));
        }

        let mut applied = Vec::new();
        let mut stale = 0;
        for handle in handles {
            match handle.await.unwrap() {
                StatusUpdate::Applied(e) => applied.push(e.enrol_status),
                StatusUpdate::Stale { .. } => stale += 1,
                StatusUpdate::Missing => panic!("record vanished"),
            }
        }
        assert_eq!(applied.len(), 1);
        assert_eq!(stale, 1);
        let stored = repo
            .get_enrollment(&EnrollmentId::from("e1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.enrol_status, applied[0]);
    }

    // =========================================================================
    // Property-based tests
    // =========================================================================

    fn status_strategy() -> impl Strategy<Value = EnrollmentStatus> {
        prop::sample::select(EnrollmentStatus::ALL.to_vec())
    }

    proptest! {
        /// A conditional write either applies exactly `next` or leaves the
        /// stored status untouched.
        #[test]
        fn prop_conditional_update_is_all_or_nothing(
            stored in status_strategy(),
            expected in status_strategy(),
            next in status_strategy(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let repo = InMemoryRepository::new();
                let mut e = request("e1", "s1", "o1");
                e.enrol_status = stored;
                repo.insert_enrollment(e).await.unwrap();

                let update = repo
                    .update_enrollment_status(&EnrollmentId::from("e1"), expected, next, None, 9)
                    .await
                    .unwrap();
                let after = repo
                    .get_enrollment(&EnrollmentId::from("e1"))
                    .await
                    .unwrap()
                    .unwrap();

                if stored == expected {
                    prop_assert!(matches!(update, StatusUpdate::Applied(_)));
                    prop_assert_eq!(after.enrol_status, next);
                } else {
                    prop_assert_eq!(update, StatusUpdate::Stale { current: stored });
                    prop_assert_eq!(after.enrol_status, stored);
                }
                Ok(())
            })?;
        }
    }
}
