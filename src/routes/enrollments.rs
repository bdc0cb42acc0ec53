use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Caller;
use crate::db::Db;
use crate::error::ApiError;
use crate::models::{CompleteLessonReq, Enrollment, EnrollmentDetail};
use crate::workflow;

pub fn router() -> Router<Db> {
    Router::new()
        .route("/my-enrollments", get(my_enrollments))
        // POST takes a course id; GET/DELETE take an enrollment id
        .route("/:id", post(enroll).get(get_enrollment).delete(cancel))
        .route("/:id/complete-lesson", put(complete_lesson))
}

async fn enroll(
    State(db): State<Db>,
    caller: Caller,
    Path(course_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Enrollment>), ApiError> {
    let enrollment = workflow::enroll(&db, caller.id, course_id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn my_enrollments(
    State(db): State<Db>,
    caller: Caller,
) -> Result<Json<Vec<EnrollmentDetail>>, ApiError> {
    Ok(Json(workflow::list_enrollments_for_student(&db, caller.id).await?))
}

async fn get_enrollment(
    State(db): State<Db>,
    caller: Caller,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<EnrollmentDetail>, ApiError> {
    Ok(Json(workflow::get_enrollment(&db, enrollment_id, caller.id).await?))
}

async fn complete_lesson(
    State(db): State<Db>,
    caller: Caller,
    Path(enrollment_id): Path<Uuid>,
    Json(req): Json<CompleteLessonReq>,
) -> Result<Json<EnrollmentDetail>, ApiError> {
    let detail = workflow::complete_lesson(&db, enrollment_id, caller.id, req.lesson_id).await?;
    Ok(Json(detail))
}

async fn cancel(
    State(db): State<Db>,
    caller: Caller,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    workflow::cancel_enrollment(&db, enrollment_id, caller.id).await?;
    Ok(Json(json!({ "message": "Enrollment cancelled" })))
}
