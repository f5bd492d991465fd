//! Catalog, people, advisor assignment and alert endpoints.

use std::sync::Arc;

use aims_core::{
    AdvisorAssignment, Alert, AlertId, Cohort, Course, CourseCode, Instructor, InstructorId,
    Offering, OfferingId, Student, StudentId,
};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::repository::OfferingFilter;
use crate::service::{Actor, NewAlert, NewOffering, OfferingUpdate, ServiceError};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ServiceError>;

/// Path and body must name the same record.
fn check_key<K: PartialEq + std::fmt::Display>(
    field: &str,
    path: &K,
    body: &K,
) -> Result<(), ServiceError> {
    if path == body {
        Ok(())
    } else {
        Err(ServiceError::BadRequest(format!(
            "{} `{}` in the body does not match `{}` in the path",
            field, body, path
        )))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct OfferingQuery {
    #[serde(default)]
    pub course_code: Option<CourseCode>,
    #[serde(default)]
    pub session: Option<String>,
    #[serde(default)]
    pub instructor_id: Option<InstructorId>,
}

/// A cohort given as query parameters; all three or none.
#[derive(Debug, Default, Deserialize)]
pub struct CohortQuery {
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub batch: Option<i32>,
    #[serde(default)]
    pub advisor_id: Option<InstructorId>,
}

impl CohortQuery {
    fn cohort(&self) -> Result<Option<Cohort>, ServiceError> {
        match (&self.degree, &self.branch, self.batch) {
            (None, None, None) => Ok(None),
            (Some(degree), Some(branch), Some(batch)) => Ok(Some(Cohort {
                degree: degree.clone(),
                branch: branch.clone(),
                batch,
            })),
            _ => Err(ServiceError::BadRequest(
                "a cohort needs degree, branch and batch together".to_string(),
            )),
        }
    }
}

// =============================================================================
// Courses
// =============================================================================

pub async fn list_courses(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Course>> {
    Ok(Json(state.service.list_courses().await?))
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(code): Path<CourseCode>,
) -> ApiResult<Course> {
    Ok(Json(state.service.get_course(&code).await?))
}

pub async fn put_course(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(code): Path<CourseCode>,
    payload: Result<Json<Course>, JsonRejection>,
) -> ApiResult<Course> {
    let Json(course) = payload?;
    check_key("course_code", &code, &course.course_code)?;
    Ok(Json(state.service.put_course(&actor, course).await?))
}

pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(code): Path<CourseCode>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_course(&actor, &code).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Offerings
// =============================================================================

pub async fn list_offerings(
    State(state): State<Arc<AppState>>,
    query: Result<Query<OfferingQuery>, QueryRejection>,
) -> ApiResult<Vec<Offering>> {
    let Query(query) = query?;
    let filter = OfferingFilter {
        course_code: query.course_code,
        session: query.session,
        instructor_id: query.instructor_id,
    };
    Ok(Json(state.service.list_offerings(&filter).await?))
}

pub async fn get_offering(
    State(state): State<Arc<AppState>>,
    Path(id): Path<OfferingId>,
) -> ApiResult<Offering> {
    Ok(Json(state.service.get_offering(&id).await?))
}

pub async fn create_offering(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<NewOffering>, JsonRejection>,
) -> Result<(StatusCode, Json<Offering>), ServiceError> {
    let Json(request) = payload?;
    let offering = state.service.create_offering(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(offering)))
}

pub async fn update_offering(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<OfferingId>,
    payload: Result<Json<OfferingUpdate>, JsonRejection>,
) -> ApiResult<Offering> {
    let Json(update) = payload?;
    Ok(Json(state.service.update_offering(&actor, &id, update).await?))
}

pub async fn delete_offering(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<OfferingId>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_offering(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// People
// =============================================================================

pub async fn list_students(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    query: Result<Query<CohortQuery>, QueryRejection>,
) -> ApiResult<Vec<Student>> {
    let Query(query) = query?;
    let cohort = query.cohort()?;
    Ok(Json(state.service.list_students(&actor, cohort).await?))
}

pub async fn get_student(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<StudentId>,
) -> ApiResult<Student> {
    Ok(Json(state.service.get_student(&actor, &id).await?))
}

pub async fn put_student(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<StudentId>,
    payload: Result<Json<Student>, JsonRejection>,
) -> ApiResult<Student> {
    let Json(student) = payload?;
    check_key("student_id", &id, &student.student_id)?;
    Ok(Json(state.service.put_student(&actor, student).await?))
}

pub async fn list_instructors(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Instructor>> {
    Ok(Json(state.service.list_instructors().await?))
}

pub async fn get_instructor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<InstructorId>,
) -> ApiResult<Instructor> {
    Ok(Json(state.service.get_instructor(&id).await?))
}

pub async fn put_instructor(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<InstructorId>,
    payload: Result<Json<Instructor>, JsonRejection>,
) -> ApiResult<Instructor> {
    let Json(instructor) = payload?;
    check_key("instructor_id", &id, &instructor.instructor_id)?;
    Ok(Json(state.service.put_instructor(&actor, instructor).await?))
}

// =============================================================================
// Advisor assignments
// =============================================================================

pub async fn list_advisor_assignments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    query: Result<Query<CohortQuery>, QueryRejection>,
) -> ApiResult<Vec<AdvisorAssignment>> {
    let Query(query) = query?;
    Ok(Json(
        state
            .service
            .list_advisor_assignments(&actor, query.advisor_id.as_ref())
            .await?,
    ))
}

pub async fn put_advisor_assignment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<AdvisorAssignment>, JsonRejection>,
) -> ApiResult<AdvisorAssignment> {
    let Json(assignment) = payload?;
    Ok(Json(
        state
            .service
            .put_advisor_assignment(&actor, assignment)
            .await?,
    ))
}

pub async fn delete_advisor_assignment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    query: Result<Query<CohortQuery>, QueryRejection>,
) -> Result<StatusCode, ServiceError> {
    let Query(query) = query?;
    let cohort = query.cohort()?.ok_or_else(|| {
        ServiceError::BadRequest("degree, branch and batch are required".to_string())
    })?;
    state
        .service
        .delete_advisor_assignment(&actor, &cohort)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Alerts
// =============================================================================

pub async fn list_alerts(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Alert>> {
    Ok(Json(state.service.list_alerts().await?))
}

pub async fn create_alert(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<NewAlert>, JsonRejection>,
) -> Result<(StatusCode, Json<Alert>), ServiceError> {
    let Json(request) = payload?;
    let alert = state.service.create_alert(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn delete_alert(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<AlertId>,
) -> Result<StatusCode, ServiceError> {
    state.service.delete_alert(&actor, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohort_query_all_or_nothing() {
        assert_eq!(CohortQuery::default().cohort().unwrap(), None);

        let full = CohortQuery {
            degree: Some("BTech".to_string()),
            branch: Some("CSE".to_string()),
            batch: Some(2021),
            advisor_id: None,
        };
        assert_eq!(full.cohort().unwrap().unwrap().batch, 2021);

        let partial = CohortQuery {
            degree: Some("BTech".to_string()),
            ..Default::default()
        };
        assert_eq!(partial.cohort().unwrap_err().code(), "bad_request");
    }

    #[test]
    fn test_check_key_rejects_mismatch() {
        let path = CourseCode::from("CS301");
        assert!(check_key("course_code", &path, &CourseCode::from("CS301")).is_ok());
        let err = check_key("course_code", &path, &CourseCode::from("MA101")).unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }
}
