use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(#[from] ValidationErrors),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not authorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("{0}")]
    Conflict(&'static str),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(errs) => {
                json!({ "message": "validation failed", "errors": errs })
            }
            ApiError::NotFound(what) => json!({ "message": format!("{what} not found") }),
            ApiError::Unauthorized => json!({ "message": "Not authorized" }),
            ApiError::Forbidden => json!({ "message": "Forbidden" }),
            ApiError::Conflict(msg) => json!({ "message": msg }),
            ApiError::Database(err) => {
                tracing::error!(error = %err, "database error");
                json!({ "message": "Server error" })
            }
        };
        (status, Json(body)).into_response()
    }
}

/// Translate a unique-index violation into the given `Conflict`; anything
/// else stays a storage failure. Uniqueness invariants (one enrollment per
/// student/course, one rating per user, one completion per lesson, unique
/// email) are enforced by the schema, so this is where the losing side of a
/// race gets its answer.
pub fn db_conflict(err: sqlx::Error, conflict: &'static str) -> ApiError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => ApiError::Conflict(conflict),
        _ => ApiError::Database(err),
    }
}

/// Single-field validation failure for checks the derive can't express.
pub fn field_error(field: &'static str, code: &'static str) -> ValidationErrors {
    let mut errs = ValidationErrors::new();
    errs.add(field, ValidationError::new(code));
    errs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(
            ApiError::Validation(field_error("rating", "range")).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("Course").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Conflict("Already enrolled in this course").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_names_the_entity() {
        assert_eq!(ApiError::NotFound("Enrollment").to_string(), "Enrollment not found");
    }

    #[test]
    fn non_unique_violations_stay_database_errors() {
        let err = db_conflict(sqlx::Error::RowNotFound, "Already enrolled in this course");
        assert!(matches!(err, ApiError::Database(_)));
    }

    #[test]
    fn field_errors_carry_the_field() {
        let errs = field_error("category", "unknown");
        assert!(errs.field_errors().contains_key("category"));
    }
}
