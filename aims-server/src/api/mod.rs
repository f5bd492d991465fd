//! HTTP surface: the `/api` routes plus `/health`, `/help` and `/status`.

mod catalog;
mod enrollments;
mod error;
pub mod identity;

use std::sync::Arc;

use axum::{
    extract::State,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::repository::EnrollmentFilter;
use crate::service::ServiceError;
use crate::status::StatusData;
use crate::AppState;

/// The full application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/help", get(help_handler))
        .route("/status", get(status_handler))
        .nest("/api", api_router(state.clone()))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/enrollments", post(enrollments::enroll))
        .route(
            "/enrollments/:id",
            get(enrollments::get_enrollment).patch(enrollments::transition),
        )
        .route(
            "/enrollments/:id/:action",
            get(enrollments::subresource).post(enrollments::act),
        )
        .route(
            "/offerings/:id/enrollments",
            get(enrollments::offering_enrollments),
        )
        .route(
            "/offerings/:id/enrollments/approve-all",
            post(enrollments::approve_all_for_offering),
        )
        .route(
            "/advisors/:id/enrollments",
            get(enrollments::advisor_enrollments),
        )
        .route(
            "/advisors/:id/enrollments/approve-all",
            post(enrollments::approve_all_for_advisor),
        )
        .route("/advisors/:id/students", get(enrollments::advisees))
        .route(
            "/students/:id/enrollments",
            get(enrollments::student_enrollments),
        )
        .route("/students/:id/record", get(enrollments::student_record))
        .route("/courses", get(catalog::list_courses))
        .route(
            "/courses/:code",
            get(catalog::get_course)
                .put(catalog::put_course)
                .delete(catalog::delete_course),
        )
        .route(
            "/offerings",
            get(catalog::list_offerings).post(catalog::create_offering),
        )
        .route(
            "/offerings/:id",
            get(catalog::get_offering)
                .patch(catalog::update_offering)
                .delete(catalog::delete_offering),
        )
        .route("/students", get(catalog::list_students))
        .route(
            "/students/:id",
            get(catalog::get_student).put(catalog::put_student),
        )
        .route("/instructors", get(catalog::list_instructors))
        .route(
            "/instructors/:id",
            get(catalog::get_instructor).put(catalog::put_instructor),
        )
        .route(
            "/advisor-assignments",
            put(catalog::put_advisor_assignment)
                .get(catalog::list_advisor_assignments)
                .delete(catalog::delete_advisor_assignment),
        )
        .route(
            "/alerts",
            get(catalog::list_alerts).post(catalog::create_alert),
        )
        .route("/alerts/:id", axum::routing::delete(catalog::delete_alert))
        .fallback(not_found)
        .route_layer(middleware::from_fn_with_state(
            state,
            identity::require_api_token,
        ))
}

async fn not_found() -> ServiceError {
    ServiceError::NotFound("no such endpoint".to_string())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "aims"
    }))
}

async fn help_handler() -> Json<serde_json::Value> {
    fn endpoint(method: &str, path: &str, description: &str) -> serde_json::Value {
        json!({ "method": method, "path": path, "description": description })
    }

    Json(json!({
        "service": "aims",
        "version": crate::get_version(),
        "description": "Course catalog, offerings, enrollment approvals and academic records",
        "authentication": {
            "identity": format!("{} and {} headers", identity::USER_HEADER, identity::ROLE_HEADER),
            "token": "Authorization: Bearer <AIMS_API_TOKEN> on /api when configured"
        },
        "endpoints": [
            endpoint("GET", "/health", "Health check"),
            endpoint("GET", "/help", "This listing"),
            endpoint("GET", "/status", "Version and enrollment counts per status"),
            endpoint("POST", "/api/enrollments", "Request enrollment in an offering"),
            endpoint("GET", "/api/enrollments/:id", "One enrollment"),
            endpoint("PATCH", "/api/enrollments/:id", "Move an enrollment to a target status"),
            endpoint("GET", "/api/enrollments/:id/history", "Transition history, newest first"),
            endpoint("POST", "/api/enrollments/:id/:action", "approve, reject, withdraw or drop"),
            endpoint("POST", "/api/enrollments/:id/grade", "Post a grade, completing the enrollment"),
            endpoint("GET", "/api/offerings/:id/enrollments", "Enrollments of an offering"),
            endpoint("POST", "/api/offerings/:id/enrollments/approve-all", "Approve every pending instructor request"),
            endpoint("GET", "/api/advisors/:id/enrollments", "Enrollments of an advisor's advisees"),
            endpoint("POST", "/api/advisors/:id/enrollments/approve-all", "Approve every pending advisor request"),
            endpoint("GET", "/api/advisors/:id/students", "Advisees of an advisor"),
            endpoint("GET", "/api/students/:id/enrollments", "Enrollments of a student"),
            endpoint("GET", "/api/students/:id/record", "Academic record with credits and CGPA"),
            endpoint("GET|PUT|DELETE", "/api/courses[/:code]", "Course catalog"),
            endpoint("GET|POST|PATCH|DELETE", "/api/offerings[/:id]", "Course offerings"),
            endpoint("GET|PUT", "/api/students[/:id]", "Students"),
            endpoint("GET|PUT", "/api/instructors[/:id]", "Instructors"),
            endpoint("GET|PUT|DELETE", "/api/advisor-assignments", "Advisor per cohort"),
            endpoint("GET|POST|DELETE", "/api/alerts[/:id]", "Notices"),
        ],
        "configuration": {
            "optional_env_vars": [
                "PORT (default: 3000)",
                "STATE_DIR (default: current directory)",
                "AIMS_STORAGE (sqlite or memory, default: sqlite)",
                "AIMS_API_TOKEN (default: unset, /api open)"
            ]
        }
    }))
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    let enrollments = match state
        .service
        .repository()
        .list_enrollments(&EnrollmentFilter::default())
        .await
    {
        Ok(enrollments) => enrollments,
        Err(e) => return ServiceError::from(e).into_response(),
    };
    let data = StatusData::from_enrollments(&enrollments, crate::get_version(), state.storage);
    Json(data).into_response()
}
