//! Enrollment rows and their transition history.

use aims_core::{
    Enrollment, EnrollmentEvent, EnrollmentId, EnrollmentStatus, Grade, OfferingId, StudentId,
    UserId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};

use super::super::{EnrollmentFilter, InsertOutcome, RepositoryError, StatusUpdate};
use super::{decode, decode_status, skip_corrupt, sql_err, usize_to_i64_limit, SqliteRepository};

const ENROLLMENT_COLUMNS: &str =
    "enrollment_id, student_id, offering_id, enrol_type, enrol_status, grade, created_at, updated_at";

/// Raw enrollment row; vocabulary columns are decoded separately so a bad
/// value surfaces as corruption rather than a SQL error.
struct EnrollmentRow {
    enrollment_id: String,
    student_id: String,
    offering_id: String,
    enrol_type: String,
    enrol_status: String,
    grade: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl EnrollmentRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            enrollment_id: row.get(0)?,
            student_id: row.get(1)?,
            offering_id: row.get(2)?,
            enrol_type: row.get(3)?,
            enrol_status: row.get(4)?,
            grade: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<Enrollment, RepositoryError> {
        let grade = match self.grade.as_deref() {
            Some(g) => Some(decode::<Grade>(g, "grade")?),
            None => None,
        };
        Ok(Enrollment {
            enrol_type: decode(&self.enrol_type, "enrol_type")?,
            enrol_status: decode_status(&self.enrol_status, "enrol_status")?,
            enrollment_id: EnrollmentId(self.enrollment_id),
            student_id: StudentId(self.student_id),
            offering_id: OfferingId(self.offering_id),
            grade,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct EventRow {
    id: i64,
    enrollment_id: String,
    from_status: String,
    to_status: String,
    actor_id: String,
    actor_role: String,
    recorded_at: i64,
}

impl EventRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            enrollment_id: row.get(1)?,
            from_status: row.get(2)?,
            to_status: row.get(3)?,
            actor_id: row.get(4)?,
            actor_role: row.get(5)?,
            recorded_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<EnrollmentEvent, RepositoryError> {
        Ok(EnrollmentEvent {
            id: self.id,
            enrollment_id: EnrollmentId(self.enrollment_id),
            from_status: decode_status(&self.from_status, "from_status")?,
            to_status: decode_status(&self.to_status, "to_status")?,
            actor_id: UserId(self.actor_id),
            actor_role: decode(&self.actor_role, "actor_role")?,
            recorded_at: self.recorded_at,
        })
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn find_active(
    conn: &Connection,
    student_id: &StudentId,
    offering_id: &OfferingId,
) -> Result<Option<EnrollmentId>, RepositoryError> {
    conn.query_row(
        "SELECT enrollment_id FROM enrollments
         WHERE student_id = ?1 AND offering_id = ?2
           AND enrol_status IN (?3, ?4, ?5, ?6)
         LIMIT 1",
        params![
            student_id.as_str(),
            offering_id.as_str(),
            EnrollmentStatus::PendingInstructor.as_str(),
            EnrollmentStatus::PendingAdvisor.as_str(),
            EnrollmentStatus::Enrolled.as_str(),
            EnrollmentStatus::Completed.as_str()
        ],
        |row| Ok(EnrollmentId(row.get(0)?)),
    )
    .optional()
    .map_err(sql_err("find active enrollment"))
}

impl SqliteRepository {
    pub(super) async fn insert_enrollment_impl(
        &self,
        enrollment: Enrollment,
    ) -> Result<InsertOutcome, RepositoryError> {
        self.with_conn("insert_enrollment", move |conn| {
            let result = conn.execute(
                "INSERT INTO enrollments
                 (enrollment_id, student_id, offering_id, enrol_type, enrol_status, grade, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    enrollment.enrollment_id.as_str(),
                    enrollment.student_id.as_str(),
                    enrollment.offering_id.as_str(),
                    enrollment.enrol_type.as_str(),
                    enrollment.enrol_status.as_str(),
                    enrollment.grade.map(|g| g.as_str()),
                    enrollment.created_at,
                    enrollment.updated_at
                ],
            );
            match result {
                Ok(_) => Ok(InsertOutcome::Inserted),
                Err(e) if is_unique_violation(&e) => {
                    // Either the active-enrollment index or the primary key.
                    match find_active(conn, &enrollment.student_id, &enrollment.offering_id)? {
                        Some(existing) => Ok(InsertOutcome::DuplicateActive(existing)),
                        None => Err(RepositoryError::storage("insert_enrollment", e.to_string())),
                    }
                }
                Err(e) => Err(RepositoryError::storage("insert_enrollment", e.to_string())),
            }
        })
        .await
    }

    pub(super) async fn get_enrollment_impl(
        &self,
        id: &EnrollmentId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        let id = id.clone();
        self.with_conn("get_enrollment", move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM enrollments WHERE enrollment_id = ?1",
                        ENROLLMENT_COLUMNS
                    ),
                    params![id.as_str()],
                    EnrollmentRow::read,
                )
                .optional()
                .map_err(sql_err("get_enrollment"))?;
            row.map(EnrollmentRow::decode).transpose()
        })
        .await
    }

    pub(super) async fn list_enrollments_impl(
        &self,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        if matches!(&filter.student_ids, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }
        let filter = filter.clone();
        self.with_conn("list_enrollments", move |conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            if let Some(offering) = &filter.offering_id {
                clauses.push("offering_id = ?".to_string());
                values.push(Value::Text(offering.0.clone()));
            }
            if let Some(student) = &filter.student_id {
                clauses.push("student_id = ?".to_string());
                values.push(Value::Text(student.0.clone()));
            }
            if let Some(students) = &filter.student_ids {
                let marks = vec!["?"; students.len()].join(", ");
                clauses.push(format!("student_id IN ({})", marks));
                values.extend(students.iter().map(|s| Value::Text(s.0.clone())));
            }
            let mut sql = format!("SELECT {} FROM enrollments", ENROLLMENT_COLUMNS);
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY created_at, enrollment_id");

            let mut stmt = conn.prepare(&sql).map_err(sql_err("list_enrollments"))?;
            let rows = stmt
                .query_map(params_from_iter(values), EnrollmentRow::read)
                .map_err(sql_err("list_enrollments"))?;

            let mut enrollments = Vec::new();
            for row in rows {
                let row = row.map_err(sql_err("list_enrollments"))?;
                if let Some(enrollment) = skip_corrupt(row.decode(), "enrollments") {
                    // Status is filtered after decoding so legacy spellings match.
                    if filter.status.map_or(true, |s| s == enrollment.enrol_status) {
                        enrollments.push(enrollment);
                    }
                }
            }
            Ok(enrollments)
        })
        .await
    }

    pub(super) async fn update_enrollment_status_impl(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentStatus,
        next: EnrollmentStatus,
        grade: Option<Grade>,
        now: i64,
    ) -> Result<StatusUpdate, RepositoryError> {
        let id = id.clone();
        self.with_conn("update_enrollment_status", move |conn| {
            let updated = conn
                .query_row(
                    &format!(
                        "UPDATE enrollments
                         SET enrol_status = ?1, grade = COALESCE(?2, grade), updated_at = ?3
                         WHERE enrollment_id = ?4 AND enrol_status = ?5
                         RETURNING {}",
                        ENROLLMENT_COLUMNS
                    ),
                    params![
                        next.as_str(),
                        grade.map(|g| g.as_str()),
                        now,
                        id.as_str(),
                        expected.as_str()
                    ],
                    EnrollmentRow::read,
                )
                .optional()
                .map_err(sql_err("update_enrollment_status"))?;

            if let Some(row) = updated {
                return Ok(StatusUpdate::Applied(row.decode()?));
            }

            let current: Option<String> = conn
                .query_row(
                    "SELECT enrol_status FROM enrollments WHERE enrollment_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(sql_err("update_enrollment_status"))?;

            match current {
                Some(status) => Ok(StatusUpdate::Stale {
                    current: decode_status(&status, "enrol_status")?,
                }),
                None => Ok(StatusUpdate::Missing),
            }
        })
        .await
    }

    pub(super) async fn log_event_impl(
        &self,
        event: &EnrollmentEvent,
    ) -> Result<(), RepositoryError> {
        let event = event.clone();
        self.with_conn("log_event", move |conn| {
            conn.execute(
                "INSERT INTO enrollment_events
                 (enrollment_id, from_status, to_status, actor_id, actor_role, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.enrollment_id.as_str(),
                    event.from_status.as_str(),
                    event.to_status.as_str(),
                    event.actor_id.as_str(),
                    event.actor_role.as_str(),
                    event.recorded_at
                ],
            )
            .map_err(sql_err("log_event"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn get_enrollment_events_impl(
        &self,
        id: &EnrollmentId,
        limit: usize,
    ) -> Result<Vec<EnrollmentEvent>, RepositoryError> {
        let limit = usize_to_i64_limit(limit, "get_enrollment_events")?;
        let id = id.clone();
        self.with_conn("get_enrollment_events", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, enrollment_id, from_status, to_status, actor_id, actor_role, recorded_at
                     FROM enrollment_events
                     WHERE enrollment_id = ?1
                     ORDER BY recorded_at DESC, id DESC
                     LIMIT ?2",
                )
                .map_err(sql_err("get_enrollment_events"))?;
            let rows = stmt
                .query_map(params![id.as_str(), limit], EventRow::read)
                .map_err(sql_err("get_enrollment_events"))?;

            let mut events = Vec::new();
            for row in rows {
                let row = row.map_err(sql_err("get_enrollment_events"))?;
                if let Some(event) = skip_corrupt(row.decode(), "enrollment_events") {
                    events.push(event);
                }
            }
            Ok(events)
        })
        .await
    }
}
