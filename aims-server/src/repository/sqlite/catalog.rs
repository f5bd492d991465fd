//! Catalog, people and alert operations for the SQLite repository.

use aims_core::{
    AdvisorAssignment, Alert, AlertId, Cohort, Course, CourseCode, Instructor, InstructorId,
    Offering, OfferingId, Student, StudentId, UserId,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::super::{CreateOutcome, DeleteOutcome, OfferingFilter, RepositoryError};
use super::{sql_err, SqliteRepository};

fn read_course(row: &rusqlite::Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        course_code: CourseCode(row.get(0)?),
        title: row.get(1)?,
        credits: row.get(2)?,
        department: row.get(3)?,
        description: row.get(4)?,
    })
}

fn read_student(row: &rusqlite::Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        student_id: StudentId(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        degree: row.get(3)?,
        branch: row.get(4)?,
        batch: row.get(5)?,
    })
}

fn read_instructor(row: &rusqlite::Row<'_>) -> rusqlite::Result<Instructor> {
    Ok(Instructor {
        instructor_id: InstructorId(row.get(0)?),
        name: row.get(1)?,
        email: row.get(2)?,
        department: row.get(3)?,
    })
}

/// Offering row without its instructor list.
fn read_offering_head(row: &rusqlite::Row<'_>) -> rusqlite::Result<Offering> {
    Ok(Offering {
        offering_id: OfferingId(row.get(0)?),
        course_code: CourseCode(row.get(1)?),
        session: row.get(2)?,
        section: row.get(3)?,
        slot: row.get(4)?,
        instructors: Vec::new(),
        coordinator_id: InstructorId(row.get(5)?),
    })
}

fn load_instructors(
    conn: &Connection,
    offering_id: &OfferingId,
) -> Result<Vec<InstructorId>, RepositoryError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT instructor_id FROM offering_instructors
             WHERE offering_id = ?1 ORDER BY position",
        )
        .map_err(sql_err("load offering instructors"))?;
    let rows = stmt
        .query_map(params![offering_id.as_str()], |row| {
            Ok(InstructorId(row.get(0)?))
        })
        .map_err(sql_err("load offering instructors"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(sql_err("load offering instructors"))
}

const OFFERING_COLUMNS: &str =
    "offering_id, course_code, session, section, slot, coordinator_id";

/// Instructor rows for `offering`, in listed order. A repeated instructor
/// fails the primary key rather than being dropped.
fn write_instructors(
    tx: &Connection,
    offering: &Offering,
    operation: &'static str,
) -> Result<(), RepositoryError> {
    for (position, instructor) in offering.instructors.iter().enumerate() {
        tx.execute(
            "INSERT INTO offering_instructors (offering_id, instructor_id, position)
             VALUES (?1, ?2, ?3)",
            params![
                offering.offering_id.as_str(),
                instructor.as_str(),
                position as i64
            ],
        )
        .map_err(sql_err(operation))?;
    }
    Ok(())
}

impl SqliteRepository {
    // =========================================================================
    // Courses
    // =========================================================================

    pub(super) async fn put_course_impl(&self, course: Course) -> Result<(), RepositoryError> {
        self.with_conn("put_course", move |conn| {
            conn.execute(
                "INSERT INTO courses (course_code, title, credits, department, description)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(course_code) DO UPDATE SET
                     title = excluded.title,
                     credits = excluded.credits,
                     department = excluded.department,
                     description = excluded.description",
                params![
                    course.course_code.as_str(),
                    course.title,
                    course.credits,
                    course.department,
                    course.description
                ],
            )
            .map_err(sql_err("put_course"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn get_course_impl(
        &self,
        code: &CourseCode,
    ) -> Result<Option<Course>, RepositoryError> {
        let code = code.clone();
        self.with_conn("get_course", move |conn| {
            conn.query_row(
                "SELECT course_code, title, credits, department, description
                 FROM courses WHERE course_code = ?1",
                params![code.as_str()],
                read_course,
            )
            .optional()
            .map_err(sql_err("get_course"))
        })
        .await
    }

    pub(super) async fn list_courses_impl(&self) -> Result<Vec<Course>, RepositoryError> {
        self.with_conn("list_courses", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT course_code, title, credits, department, description
                     FROM courses ORDER BY course_code",
                )
                .map_err(sql_err("list_courses"))?;
            let rows = stmt
                .query_map([], read_course)
                .map_err(sql_err("list_courses"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_err("list_courses"))
        })
        .await
    }

    pub(super) async fn delete_course_impl(
        &self,
        code: &CourseCode,
    ) -> Result<DeleteOutcome, RepositoryError> {
        let code = code.clone();
        self.with_conn("delete_course", move |conn| {
            let tx = conn.transaction().map_err(sql_err("delete_course"))?;
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM courses WHERE course_code = ?1)",
                    params![code.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("delete_course"))?;
            if !exists {
                return Ok(DeleteOutcome::Missing);
            }
            let in_use: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM offerings WHERE course_code = ?1)",
                    params![code.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("delete_course"))?;
            if in_use {
                return Ok(DeleteOutcome::InUse);
            }
            tx.execute(
                "DELETE FROM courses WHERE course_code = ?1",
                params![code.as_str()],
            )
            .map_err(sql_err("delete_course"))?;
            tx.commit().map_err(sql_err("delete_course"))?;
            Ok(DeleteOutcome::Deleted)
        })
        .await
    }

    // =========================================================================
    // Offerings
    // =========================================================================

    pub(super) async fn put_offering_impl(&self, offering: Offering) -> Result<(), RepositoryError> {
        self.with_conn("put_offering", move |conn| {
            let tx = conn.transaction().map_err(sql_err("put_offering"))?;
            tx.execute(
                "INSERT INTO offerings (offering_id, course_code, session, section, slot, coordinator_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(offering_id) DO UPDATE SET
                     course_code = excluded.course_code,
                     session = excluded.session,
                     section = excluded.section,
                     slot = excluded.slot,
                     coordinator_id = excluded.coordinator_id",
                params![
                    offering.offering_id.as_str(),
                    offering.course_code.as_str(),
                    offering.session,
                    offering.section,
                    offering.slot,
                    offering.coordinator_id.as_str()
                ],
            )
            .map_err(sql_err("put_offering"))?;
            tx.execute(
                "DELETE FROM offering_instructors WHERE offering_id = ?1",
                params![offering.offering_id.as_str()],
            )
            .map_err(sql_err("put_offering"))?;
            write_instructors(&tx, &offering, "put_offering")?;
            tx.commit().map_err(sql_err("put_offering"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn insert_offering_impl(
        &self,
        offering: Offering,
    ) -> Result<CreateOutcome, RepositoryError> {
        self.with_conn("insert_offering", move |conn| {
            let tx = conn.transaction().map_err(sql_err("insert_offering"))?;
            let inserted = tx
                .execute(
                    "INSERT INTO offerings (offering_id, course_code, session, section, slot, coordinator_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(offering_id) DO NOTHING",
                    params![
                        offering.offering_id.as_str(),
                        offering.course_code.as_str(),
                        offering.session,
                        offering.section,
                        offering.slot,
                        offering.coordinator_id.as_str()
                    ],
                )
                .map_err(sql_err("insert_offering"))?;
            if inserted == 0 {
                return Ok(CreateOutcome::AlreadyExists);
            }
            write_instructors(&tx, &offering, "insert_offering")?;
            tx.commit().map_err(sql_err("insert_offering"))?;
            Ok(CreateOutcome::Created)
        })
        .await
    }

    pub(super) async fn get_offering_impl(
        &self,
        id: &OfferingId,
    ) -> Result<Option<Offering>, RepositoryError> {
        let id = id.clone();
        self.with_conn("get_offering", move |conn| {
            let head = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM offerings WHERE offering_id = ?1",
                        OFFERING_COLUMNS
                    ),
                    params![id.as_str()],
                    read_offering_head,
                )
                .optional()
                .map_err(sql_err("get_offering"))?;
            match head {
                Some(mut offering) => {
                    offering.instructors = load_instructors(conn, &offering.offering_id)?;
                    Ok(Some(offering))
                }
                None => Ok(None),
            }
        })
        .await
    }

    pub(super) async fn list_offerings_impl(
        &self,
        filter: &OfferingFilter,
    ) -> Result<Vec<Offering>, RepositoryError> {
        let filter = filter.clone();
        self.with_conn("list_offerings", move |conn| {
            let mut clauses: Vec<&str> = Vec::new();
            let mut values: Vec<Value> = Vec::new();
            if let Some(code) = &filter.course_code {
                clauses.push("course_code = ?");
                values.push(Value::Text(code.0.clone()));
            }
            if let Some(session) = &filter.session {
                clauses.push("session = ?");
                values.push(Value::Text(session.clone()));
            }
            if let Some(instructor) = &filter.instructor_id {
                clauses.push(
                    "EXISTS(SELECT 1 FROM offering_instructors oi
                            WHERE oi.offering_id = offerings.offering_id
                              AND oi.instructor_id = ?)",
                );
                values.push(Value::Text(instructor.0.clone()));
            }
            let mut sql = format!("SELECT {} FROM offerings", OFFERING_COLUMNS);
            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY session DESC, course_code, offering_id");

            let heads = {
                let mut stmt = conn.prepare(&sql).map_err(sql_err("list_offerings"))?;
                let rows = stmt
                    .query_map(params_from_iter(values), read_offering_head)
                    .map_err(sql_err("list_offerings"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql_err("list_offerings"))?
            };

            let mut offerings = Vec::with_capacity(heads.len());
            for mut offering in heads {
                offering.instructors = load_instructors(conn, &offering.offering_id)?;
                offerings.push(offering);
            }
            Ok(offerings)
        })
        .await
    }

    pub(super) async fn delete_offering_impl(
        &self,
        id: &OfferingId,
    ) -> Result<DeleteOutcome, RepositoryError> {
        let id = id.clone();
        self.with_conn("delete_offering", move |conn| {
            let tx = conn.transaction().map_err(sql_err("delete_offering"))?;
            let exists: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM offerings WHERE offering_id = ?1)",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("delete_offering"))?;
            if !exists {
                return Ok(DeleteOutcome::Missing);
            }
            let in_use: bool = tx
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM enrollments WHERE offering_id = ?1)",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("delete_offering"))?;
            if in_use {
                return Ok(DeleteOutcome::InUse);
            }
            tx.execute(
                "DELETE FROM offering_instructors WHERE offering_id = ?1",
                params![id.as_str()],
            )
            .map_err(sql_err("delete_offering"))?;
            tx.execute(
                "DELETE FROM offerings WHERE offering_id = ?1",
                params![id.as_str()],
            )
            .map_err(sql_err("delete_offering"))?;
            tx.commit().map_err(sql_err("delete_offering"))?;
            Ok(DeleteOutcome::Deleted)
        })
        .await
    }

    // =========================================================================
    // People
    // =========================================================================

    pub(super) async fn put_student_impl(&self, student: Student) -> Result<(), RepositoryError> {
        self.with_conn("put_student", move |conn| {
            conn.execute(
                "INSERT INTO students (student_id, name, email, degree, branch, batch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(student_id) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email,
                     degree = excluded.degree,
                     branch = excluded.branch,
                     batch = excluded.batch",
                params![
                    student.student_id.as_str(),
                    student.name,
                    student.email,
                    student.degree,
                    student.branch,
                    student.batch
                ],
            )
            .map_err(sql_err("put_student"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn get_student_impl(
        &self,
        id: &StudentId,
    ) -> Result<Option<Student>, RepositoryError> {
        let id = id.clone();
        self.with_conn("get_student", move |conn| {
            conn.query_row(
                "SELECT student_id, name, email, degree, branch, batch
                 FROM students WHERE student_id = ?1",
                params![id.as_str()],
                read_student,
            )
            .optional()
            .map_err(sql_err("get_student"))
        })
        .await
    }

    pub(super) async fn list_students_impl(
        &self,
        cohorts: Option<&[Cohort]>,
    ) -> Result<Vec<Student>, RepositoryError> {
        let cohorts = cohorts.map(|c| c.to_vec());
        self.with_conn("list_students", move |conn| {
            let mut sql =
                "SELECT student_id, name, email, degree, branch, batch FROM students".to_string();
            let mut values: Vec<Value> = Vec::new();
            if let Some(cohorts) = &cohorts {
                if cohorts.is_empty() {
                    return Ok(Vec::new());
                }
                let clauses: Vec<&str> = cohorts
                    .iter()
                    .map(|_| "(degree = ? AND branch = ? AND batch = ?)")
                    .collect();
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" OR "));
                for cohort in cohorts {
                    values.push(Value::Text(cohort.degree.clone()));
                    values.push(Value::Text(cohort.branch.clone()));
                    values.push(Value::Integer(i64::from(cohort.batch)));
                }
            }
            sql.push_str(" ORDER BY student_id");

            let mut stmt = conn.prepare(&sql).map_err(sql_err("list_students"))?;
            let rows = stmt
                .query_map(params_from_iter(values), read_student)
                .map_err(sql_err("list_students"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_err("list_students"))
        })
        .await
    }

    pub(super) async fn put_instructor_impl(
        &self,
        instructor: Instructor,
    ) -> Result<(), RepositoryError> {
        self.with_conn("put_instructor", move |conn| {
            conn.execute(
                "INSERT INTO instructors (instructor_id, name, email, department)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(instructor_id) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email,
                     department = excluded.department",
                params![
                    instructor.instructor_id.as_str(),
                    instructor.name,
                    instructor.email,
                    instructor.department
                ],
            )
            .map_err(sql_err("put_instructor"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn get_instructor_impl(
        &self,
        id: &InstructorId,
    ) -> Result<Option<Instructor>, RepositoryError> {
        let id = id.clone();
        self.with_conn("get_instructor", move |conn| {
            conn.query_row(
                "SELECT instructor_id, name, email, department
                 FROM instructors WHERE instructor_id = ?1",
                params![id.as_str()],
                read_instructor,
            )
            .optional()
            .map_err(sql_err("get_instructor"))
        })
        .await
    }

    pub(super) async fn list_instructors_impl(&self) -> Result<Vec<Instructor>, RepositoryError> {
        self.with_conn("list_instructors", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT instructor_id, name, email, department
                     FROM instructors ORDER BY instructor_id",
                )
                .map_err(sql_err("list_instructors"))?;
            let rows = stmt
                .query_map([], read_instructor)
                .map_err(sql_err("list_instructors"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_err("list_instructors"))
        })
        .await
    }

    // =========================================================================
    // Advisor assignments
    // =========================================================================

    pub(super) async fn put_advisor_assignment_impl(
        &self,
        assignment: AdvisorAssignment,
    ) -> Result<(), RepositoryError> {
        self.with_conn("put_advisor_assignment", move |conn| {
            conn.execute(
                "INSERT INTO advisor_assignments (degree, branch, batch, advisor_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(degree, branch, batch) DO UPDATE SET
                     advisor_id = excluded.advisor_id",
                params![
                    assignment.cohort.degree,
                    assignment.cohort.branch,
                    assignment.cohort.batch,
                    assignment.advisor_id.as_str()
                ],
            )
            .map_err(sql_err("put_advisor_assignment"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn list_advisor_assignments_impl(
        &self,
        advisor_id: Option<&InstructorId>,
    ) -> Result<Vec<AdvisorAssignment>, RepositoryError> {
        let advisor_id = advisor_id.cloned();
        self.with_conn("list_advisor_assignments", move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT advisor_id, degree, branch, batch FROM advisor_assignments
                     WHERE ?1 IS NULL OR advisor_id = ?1
                     ORDER BY degree, branch, batch",
                )
                .map_err(sql_err("list_advisor_assignments"))?;
            let rows = stmt
                .query_map(params![advisor_id.as_ref().map(|a| a.as_str())], |row| {
                    Ok(AdvisorAssignment {
                        advisor_id: InstructorId(row.get(0)?),
                        cohort: Cohort {
                            degree: row.get(1)?,
                            branch: row.get(2)?,
                            batch: row.get(3)?,
                        },
                    })
                })
                .map_err(sql_err("list_advisor_assignments"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_err("list_advisor_assignments"))
        })
        .await
    }

    pub(super) async fn delete_advisor_assignment_impl(
        &self,
        cohort: &Cohort,
    ) -> Result<bool, RepositoryError> {
        let cohort = cohort.clone();
        self.with_conn("delete_advisor_assignment", move |conn| {
            let changed = conn
                .execute(
                    "DELETE FROM advisor_assignments
                     WHERE degree = ?1 AND branch = ?2 AND batch = ?3",
                    params![cohort.degree, cohort.branch, cohort.batch],
                )
                .map_err(sql_err("delete_advisor_assignment"))?;
            Ok(changed > 0)
        })
        .await
    }

    // =========================================================================
    // Alerts
    // =========================================================================

    pub(super) async fn insert_alert_impl(&self, alert: Alert) -> Result<(), RepositoryError> {
        self.with_conn("insert_alert", move |conn| {
            conn.execute(
                "INSERT INTO alerts (alert_id, owner_id, message, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    alert.alert_id.as_str(),
                    alert.owner_id.as_str(),
                    alert.message,
                    alert.created_at
                ],
            )
            .map_err(sql_err("insert_alert"))?;
            Ok(())
        })
        .await
    }

    pub(super) async fn list_alerts_impl(&self) -> Result<Vec<Alert>, RepositoryError> {
        self.with_conn("list_alerts", |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT alert_id, owner_id, message, created_at FROM alerts
                     ORDER BY created_at DESC, rowid DESC",
                )
                .map_err(sql_err("list_alerts"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(Alert {
                        alert_id: AlertId(row.get(0)?),
                        owner_id: UserId(row.get(1)?),
                        message: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .map_err(sql_err("list_alerts"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sql_err("list_alerts"))
        })
        .await
    }

    pub(super) async fn delete_alert_impl(&self, id: &AlertId) -> Result<bool, RepositoryError> {
        let id = id.clone();
        self.with_conn("delete_alert", move |conn| {
            let changed = conn
                .execute("DELETE FROM alerts WHERE alert_id = ?1", params![id.as_str()])
                .map_err(sql_err("delete_alert"))?;
            Ok(changed > 0)
        })
        .await
    }
}
