//! Enrollment workflow endpoints.

use std::str::FromStr;
use std::sync::Arc;

use aims_core::{
    AcademicRecord, Action, EnrolType, Enrollment, EnrollmentEvent, EnrollmentId,
    EnrollmentStatus, Grade, InstructorId, Intent, OfferingId, Student, StudentId,
};
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::service::{Actor, BulkOutcome, ServiceError};
use crate::AppState;

type ApiResult<T> = Result<Json<T>, ServiceError>;

/// Parse one of the closed vocabularies, reporting the field on failure.
pub(super) fn parse_field<T>(field: &str, value: &str) -> Result<T, ServiceError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ServiceError::BadRequest(format!("{}: {}", field, e)))
}

fn parse_optional<T>(field: &str, value: Option<&str>) -> Result<Option<T>, ServiceError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.map(|v| parse_field(field, v)).transpose()
}

/// Decode an optional JSON body; an empty body yields the default.
fn optional_body<T>(body: &Bytes) -> Result<T, ServiceError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid request body: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub offering_id: OfferingId,
    pub enrol_type: String,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: String,
    #[serde(default)]
    pub expected_status: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub expected_status: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub offering_id: Option<OfferingId>,
}

/// POST /api/enrollments
pub async fn enroll(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    payload: Result<Json<EnrollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Enrollment>), ServiceError> {
    let Json(request) = payload?;
    let enrol_type: EnrolType = parse_field("enrol_type", &request.enrol_type)?;
    let enrollment = state
        .service
        .enroll(&actor, &request.offering_id, enrol_type)
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// GET /api/enrollments/:id
pub async fn get_enrollment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<EnrollmentId>,
) -> ApiResult<Enrollment> {
    Ok(Json(state.service.get_enrollment(&actor, &id).await?))
}

/// PATCH /api/enrollments/:id
pub async fn transition(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<EnrollmentId>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> ApiResult<Enrollment> {
    let Json(request) = payload?;
    let target: EnrollmentStatus = parse_field("status", &request.status)?;
    let expected = parse_optional("expected_status", request.expected_status.as_deref())?;
    let grade: Option<Grade> = parse_optional("grade", request.grade.as_deref())?;

    let enrollment = match (target, grade) {
        (EnrollmentStatus::Completed, Some(grade)) => {
            state.service.complete(&actor, &id, grade, expected).await?
        }
        (_, Some(_)) => {
            return Err(ServiceError::BadRequest(
                "a grade may only accompany status `completed`".to_string(),
            ))
        }
        (target, None) => {
            state
                .service
                .transition(&actor, &id, Intent::Target(target), expected)
                .await?
        }
    };
    Ok(Json(enrollment))
}

/// GET /api/enrollments/:id/history
///
/// Shares its path pattern with the action endpoint, so the last segment is
/// matched here.
pub async fn subresource(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, name)): Path<(EnrollmentId, String)>,
) -> ApiResult<Vec<EnrollmentEvent>> {
    if name != "history" {
        return Err(ServiceError::NotFound(format!(
            "no resource `{}` on enrollments",
            name
        )));
    }
    Ok(Json(state.service.history(&actor, &id).await?))
}

/// POST /api/enrollments/:id/:action
///
/// `approve`, `reject`, `withdraw` and `drop` take an optional
/// `{expected_status}` body; `grade` takes `{grade, expected_status?}`.
pub async fn act(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path((id, name)): Path<(EnrollmentId, String)>,
    body: Bytes,
) -> ApiResult<Enrollment> {
    let request: ActionRequest = optional_body(&body)?;
    let expected = parse_optional("expected_status", request.expected_status.as_deref())?;

    let enrollment = if name == "grade" {
        let grade: Grade = match request.grade.as_deref() {
            Some(grade) => parse_field("grade", grade)?,
            None => return Err(ServiceError::BadRequest("grade is required".to_string())),
        };
        state.service.complete(&actor, &id, grade, expected).await?
    } else {
        let action: Action = parse_field("action", &name)
            .map_err(|_| ServiceError::NotFound(format!("no action `{}` on enrollments", name)))?;
        if action == Action::Complete {
            return Err(ServiceError::BadRequest(
                "completion is recorded through the grade endpoint".to_string(),
            ));
        }
        state
            .service
            .transition(&actor, &id, Intent::Action(action), expected)
            .await?
    };
    Ok(Json(enrollment))
}

/// GET /api/offerings/:id/enrollments
pub async fn offering_enrollments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(offering_id): Path<OfferingId>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<Vec<Enrollment>> {
    let Query(query) = query?;
    let status = parse_optional("status", query.status.as_deref())?;
    Ok(Json(
        state
            .service
            .list_offering_enrollments(&actor, &offering_id, status)
            .await?,
    ))
}

/// POST /api/offerings/:id/enrollments/approve-all
pub async fn approve_all_for_offering(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(offering_id): Path<OfferingId>,
) -> ApiResult<BulkOutcome> {
    Ok(Json(
        state
            .service
            .approve_all_for_offering(&actor, &offering_id)
            .await?,
    ))
}

/// GET /api/advisors/:id/enrollments
pub async fn advisor_enrollments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(advisor_id): Path<InstructorId>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<Vec<Enrollment>> {
    let Query(query) = query?;
    let status = parse_optional("status", query.status.as_deref())?;
    Ok(Json(
        state
            .service
            .list_advisor_enrollments(&actor, &advisor_id, status, query.offering_id)
            .await?,
    ))
}

/// POST /api/advisors/:id/enrollments/approve-all
pub async fn approve_all_for_advisor(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(advisor_id): Path<InstructorId>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<BulkOutcome> {
    let Query(query) = query?;
    Ok(Json(
        state
            .service
            .approve_all_for_advisor(&actor, &advisor_id, query.offering_id)
            .await?,
    ))
}

/// GET /api/advisors/:id/students
pub async fn advisees(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(advisor_id): Path<InstructorId>,
) -> ApiResult<Vec<Student>> {
    Ok(Json(state.service.advisees(&actor, &advisor_id).await?))
}

/// GET /api/students/:id/enrollments
pub async fn student_enrollments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(student_id): Path<StudentId>,
) -> ApiResult<Vec<Enrollment>> {
    Ok(Json(
        state
            .service
            .list_student_enrollments(&actor, &student_id)
            .await?,
    ))
}

/// GET /api/students/:id/record
pub async fn student_record(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(student_id): Path<StudentId>,
) -> ApiResult<AcademicRecord> {
    Ok(Json(state.service.record(&actor, &student_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_body_accepts_empty() {
        let request: ActionRequest = optional_body(&Bytes::new()).unwrap();
        assert!(request.expected_status.is_none());
        let request: ActionRequest = optional_body(&Bytes::from_static(b" \n")).unwrap();
        assert!(request.grade.is_none());
    }

    #[test]
    fn test_optional_body_rejects_malformed_json() {
        let err = optional_body::<ActionRequest>(&Bytes::from_static(b"{nope")).unwrap_err();
        assert_eq!(err.code(), "bad_request");
    }

    #[test]
    fn test_parse_field_names_the_field() {
        let err = parse_field::<Grade>("grade", "Z").unwrap_err();
        assert_eq!(err.to_string(), "grade: unknown grade `Z`");
        let status: EnrollmentStatus =
            parse_field("status", "pending_instructor_approval").unwrap();
        assert_eq!(status, EnrollmentStatus::PendingInstructor);
    }
}
