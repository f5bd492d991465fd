//! SQLite implementation of `AcademicRepository`.
//!
//! This provides persistent storage that survives service restarts.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and add
//! a migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.
//!
//! # Status strings
//!
//! `enrollments.enrol_status` stores the wire string of the status. Rows
//! written by older tooling may carry the legacy spellings
//! (`student withdrawn`); those decode, and since both are terminal no
//! conditional update ever needs to match them. Any other spelling is
//! reported as corruption.

mod catalog;
mod enrollments;


use std::path::Path;
use std::sync::{Arc, Mutex};

use aims_core::{
    AdvisorAssignment, Alert, AlertId, Cohort, Course, CourseCode, Enrollment, EnrollmentEvent,
    EnrollmentId, EnrollmentStatus, Grade, Instructor, InstructorId, Offering, OfferingId,
    Student, StudentId,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{
    AcademicRepository, CreateOutcome, DeleteOutcome, EnrollmentFilter, InsertOutcome, OfferingFilter,
    RepositoryError, StatusUpdate,
};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 3;

/// SQLite-backed academic repository.
///
/// Uses `tokio::task::spawn_blocking` to run synchronous rusqlite operations
/// without blocking the async runtime. All access goes through one
/// connection guarded by a mutex, so multi-statement operations are atomic
/// with respect to each other.
pub struct SqliteRepository {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Create a new SQLite repository at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    /// Runs any pending migrations if the database exists but has an older schema.
    ///
    /// The database is configured with:
    /// - `journal_mode = WAL` for concurrent readers and crash safety
    /// - `synchronous = FULL` so acknowledged status changes survive power loss
    /// - `busy_timeout = 5000ms` to ride out other processes holding the lock
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path_ref = path.as_ref();

        let path_str = path_ref.to_string_lossy();
        let is_in_memory = path_str == ":memory:";
        if !is_in_memory && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        RepositoryError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // SQLite silently keeps DELETE mode on filesystems without shared
        // memory; in-memory databases report "memory".
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));
        if !journal_mode_ok {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "Failed to enable WAL mode: SQLite returned '{}' instead of 'wal'",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "Database schema version {} is newer than supported version {}. \
                     Please upgrade the application.",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // Version 1: catalog, people and enrollments
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS courses (
                    course_code TEXT PRIMARY KEY,
                    title TEXT NOT NULL,
                    credits REAL NOT NULL,
                    department TEXT NOT NULL,
                    description TEXT
                );

                CREATE TABLE IF NOT EXISTS offerings (
                    offering_id TEXT PRIMARY KEY,
                    course_code TEXT NOT NULL,
                    session TEXT NOT NULL,
                    section TEXT,
                    slot TEXT,
                    coordinator_id TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_offerings_course
                    ON offerings(course_code);

                CREATE TABLE IF NOT EXISTS offering_instructors (
                    offering_id TEXT NOT NULL,
                    instructor_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    PRIMARY KEY (offering_id, instructor_id)
                );
                CREATE INDEX IF NOT EXISTS idx_offering_instructors_instructor
                    ON offering_instructors(instructor_id);

                CREATE TABLE IF NOT EXISTS students (
                    student_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    degree TEXT NOT NULL,
                    branch TEXT NOT NULL,
                    batch INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_students_cohort
                    ON students(degree, branch, batch);

                CREATE TABLE IF NOT EXISTS instructors (
                    instructor_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL,
                    department TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS advisor_assignments (
                    degree TEXT NOT NULL,
                    branch TEXT NOT NULL,
                    batch INTEGER NOT NULL,
                    advisor_id TEXT NOT NULL,
                    PRIMARY KEY (degree, branch, batch)
                );

                CREATE TABLE IF NOT EXISTS enrollments (
                    enrollment_id TEXT PRIMARY KEY,
                    student_id TEXT NOT NULL,
                    offering_id TEXT NOT NULL,
                    enrol_type TEXT NOT NULL,
                    enrol_status TEXT NOT NULL,
                    grade TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_enrollments_offering
                    ON enrollments(offering_id, enrol_status);
                CREATE INDEX IF NOT EXISTS idx_enrollments_student
                    ON enrollments(student_id);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        // Version 2: at most one active enrollment per student and offering.
        // Enforced by the index so concurrent requests cannot both insert.
        if from_version < 2 {
            conn.execute_batch(
                r#"
                CREATE UNIQUE INDEX IF NOT EXISTS idx_enrollments_one_active
                    ON enrollments(student_id, offering_id)
                    WHERE enrol_status IN (
                        'pending instructor approval',
                        'pending advisor approval',
                        'enrolled',
                        'completed'
                    );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v2", e.to_string()))?;
        }

        // Version 3: transition history and alerts
        if from_version < 3 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS enrollment_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    enrollment_id TEXT NOT NULL,
                    from_status TEXT NOT NULL,
                    to_status TEXT NOT NULL,
                    actor_id TEXT NOT NULL,
                    actor_role TEXT NOT NULL,
                    recorded_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_enrollment_events_lookup
                    ON enrollment_events(enrollment_id, recorded_at DESC);

                CREATE TABLE IF NOT EXISTS alerts (
                    alert_id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    message TEXT NOT NULL,
                    created_at INTEGER NOT NULL
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v3", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    pub(super) async fn with_conn<T, F>(
        &self,
        operation: &'static str,
        f: F,
    ) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?
    }
}

// =============================================================================
// Conversion helpers
// =============================================================================

/// Convert a usize limit to i64 for SQLite LIMIT clause.
///
/// Very large usize values would wrap to negative i64 with `as`, which
/// SQLite reads as "no limit".
pub(super) fn usize_to_i64_limit(
    limit: usize,
    operation: &'static str,
) -> Result<i64, RepositoryError> {
    i64::try_from(limit).map_err(|_| {
        RepositoryError::storage(
            operation,
            format!(
                "limit {} exceeds maximum storable value ({})",
                limit,
                i64::MAX
            ),
        )
    })
}

/// Parse a stored vocabulary string, reporting corruption on failure.
pub(super) fn decode<T: std::str::FromStr>(
    value: &str,
    what: &'static str,
) -> Result<T, RepositoryError> {
    value
        .parse()
        .map_err(|_| RepositoryError::corruption(format!("{} `{}`", what, value)))
}

/// Decode a stored status column strictly; loose spellings are corruption.
///
/// A row the conditional update can never match must not look healthy.
pub(super) fn decode_status(
    value: &str,
    what: &'static str,
) -> Result<EnrollmentStatus, RepositoryError> {
    EnrollmentStatus::from_stored(value)
        .map_err(|_| RepositoryError::corruption(format!("{} `{}`", what, value)))
}

/// Map a rusqlite error for `operation`.
pub(super) fn sql_err(operation: &'static str) -> impl Fn(rusqlite::Error) -> RepositoryError {
    move |e| RepositoryError::storage(operation, e.to_string())
}

/// Log and drop a row that fails to decode in a listing.
///
/// Listings keep serving the readable rows; the broken one shows up in logs.
pub(super) fn skip_corrupt<T>(result: Result<T, RepositoryError>, table: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Skipping unreadable row in {}: {}", table, e);
            None
        }
    }
}

// =============================================================================
// AcademicRepository trait implementation
// =============================================================================

#[async_trait]
impl AcademicRepository for SqliteRepository {
    async fn put_course(&self, course: Course) -> Result<(), RepositoryError> {
        self.put_course_impl(course).await
    }

    async fn get_course(&self, code: &CourseCode) -> Result<Option<Course>, RepositoryError> {
        self.get_course_impl(code).await
    }

    async fn list_courses(&self) -> Result<Vec<Course>, RepositoryError> {
        self.list_courses_impl().await
    }

    async fn delete_course(&self, code: &CourseCode) -> Result<DeleteOutcome, RepositoryError> {
        self.delete_course_impl(code).await
    }

    async fn put_offering(&self, offering: Offering) -> Result<(), RepositoryError> {
        self.put_offering_impl(offering).await
    }

    async fn insert_offering(&self, offering: Offering) -> Result<CreateOutcome, RepositoryError> {
        self.insert_offering_impl(offering).await
    }

    async fn get_offering(&self, id: &OfferingId) -> Result<Option<Offering>, RepositoryError> {
        self.get_offering_impl(id).await
    }

    async fn list_offerings(
        &self,
        filter: &OfferingFilter,
    ) -> Result<Vec<Offering>, RepositoryError> {
        self.list_offerings_impl(filter).await
    }

    async fn delete_offering(&self, id: &OfferingId) -> Result<DeleteOutcome, RepositoryError> {
        self.delete_offering_impl(id).await
    }

    async fn put_student(&self, student: Student) -> Result<(), RepositoryError> {
        self.put_student_impl(student).await
    }

    async fn get_student(&self, id: &StudentId) -> Result<Option<Student>, RepositoryError> {
        self.get_student_impl(id).await
    }

    async fn list_students(
        &self,
        cohorts: Option<&[Cohort]>,
    ) -> Result<Vec<Student>, RepositoryError> {
        self.list_students_impl(cohorts).await
    }

    async fn put_instructor(&self, instructor: Instructor) -> Result<(), RepositoryError> {
        self.put_instructor_impl(instructor).await
    }

    async fn get_instructor(
        &self,
        id: &InstructorId,
    ) -> Result<Option<Instructor>, RepositoryError> {
        self.get_instructor_impl(id).await
    }

    async fn list_instructors(&self) -> Result<Vec<Instructor>, RepositoryError> {
        self.list_instructors_impl().await
    }

    async fn put_advisor_assignment(
        &self,
        assignment: AdvisorAssignment,
    ) -> Result<(), RepositoryError> {
        self.put_advisor_assignment_impl(assignment).await
    }

    async fn list_advisor_assignments(
        &self,
        advisor_id: Option<&InstructorId>,
    ) -> Result<Vec<AdvisorAssignment>, RepositoryError> {
        self.list_advisor_assignments_impl(advisor_id).await
    }

    async fn delete_advisor_assignment(&self, cohort: &Cohort) -> Result<bool, RepositoryError> {
        self.delete_advisor_assignment_impl(cohort).await
    }

    async fn insert_enrollment(
        &self,
        enrollment: Enrollment,
    ) -> Result<InsertOutcome, RepositoryError> {
        self.insert_enrollment_impl(enrollment).await
    }

    async fn get_enrollment(
        &self,
        id: &EnrollmentId,
    ) -> Result<Option<Enrollment>, RepositoryError> {
        self.get_enrollment_impl(id).await
    }

    async fn list_enrollments(
        &self,
        filter: &EnrollmentFilter,
    ) -> Result<Vec<Enrollment>, RepositoryError> {
        self.list_enrollments_impl(filter).await
    }

    async fn update_enrollment_status(
        &self,
        id: &EnrollmentId,
        expected: EnrollmentStatus,
        next: EnrollmentStatus,
        grade: Option<Grade>,
        now: i64,
    ) -> Result<StatusUpdate, RepositoryError> {
        self.update_enrollment_status_impl(id, expected, next, grade, now)
            .await
    }

    async fn log_event(&self, event: &EnrollmentEvent) -> Result<(), RepositoryError> {
        self.log_event_impl(event).await
    }

    async fn get_enrollment_events(
        &self,
        id: &EnrollmentId,
        limit: usize,
    ) -> Result<Vec<EnrollmentEvent>, RepositoryError> {
        self.get_enrollment_events_impl(id, limit).await
    }

    async fn insert_alert(&self, alert: Alert) -> Result<(), RepositoryError> {
        self.insert_alert_impl(alert).await
    }

    async fn list_alerts(&self) -> Result<Vec<Alert>, RepositoryError> {
        self.list_alerts_impl().await
    }

    async fn delete_alert(&self, id: &AlertId) -> Result<bool, RepositoryError> {
        self.delete_alert_impl(id).await
    }
}
