use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Caller;
use crate::db::Db;
use crate::error::{db_conflict, ApiError};
use crate::models::{
    CourseCard, CourseView, CourseWithInstructorRow, InstructorDirectoryEntry, InstructorSummary,
    Profile, RegisterUserReq, Role, UpdateProfileReq, User,
};

pub fn router() -> Router<Db> {
    Router::new()
        .route("/", post(register))
        .route("/profile", get(profile).put(update_profile))
        .route("/enrolled-courses", get(enrolled_courses))
        .route("/wishlist", get(wishlist))
        .route("/wishlist/:course_id", post(add_to_wishlist).delete(remove_from_wishlist))
        .route("/instructors", get(instructors))
}

async fn register(
    State(db): State<Db>,
    Json(req): Json<RegisterUserReq>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    req.validate()?;
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, name, email, role) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.name)
    .bind(&req.email)
    .bind(req.role.unwrap_or(Role::Student))
    .fetch_one(&db)
    .await
    .map_err(|e| db_conflict(e, "Email already exists"))?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn profile(State(db): State<Db>, caller: Caller) -> Result<Json<Profile>, ApiError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(caller.id)
        .fetch_optional(&db)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    let enrolled = enrolled_course_views(&db, caller.id).await?;
    Ok(Json(Profile { user, enrolled_courses: enrolled }))
}

async fn update_profile(
    State(db): State<Db>,
    caller: Caller,
    Json(req): Json<UpdateProfileReq>,
) -> Result<Json<User>, ApiError> {
    req.validate()?;
    // the unique index on email settles a concurrent claim of the same
    // address; no read-then-check
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET name = $2, email = $3, bio = COALESCE($4, bio), \
         avatar = COALESCE($5, avatar), updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(caller.id)
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.bio)
    .bind(&req.avatar)
    .fetch_optional(&db)
    .await
    .map_err(|e| db_conflict(e, "Email already exists"))?
    .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(user))
}

async fn enrolled_courses(
    State(db): State<Db>,
    caller: Caller,
) -> Result<Json<Vec<CourseView>>, ApiError> {
    Ok(Json(enrolled_course_views(&db, caller.id).await?))
}

// Enrolled courses are a view over enrollment records, never a second copy
// that could drift from them.
async fn enrolled_course_views(db: &Db, student_id: Uuid) -> Result<Vec<CourseView>, ApiError> {
    let rows = sqlx::query_as::<_, CourseWithInstructorRow>(
        "SELECT c.*, u.name AS instructor_name, u.avatar AS instructor_avatar, \
         u.bio AS instructor_bio \
         FROM enrollments e \
         JOIN courses c ON c.id = e.course_id \
         JOIN users u ON u.id = c.instructor_id \
         WHERE e.student_id = $1 \
         ORDER BY e.enrolled_at DESC",
    )
    .bind(student_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

async fn wishlist(State(db): State<Db>, caller: Caller) -> Result<Json<Vec<CourseView>>, ApiError> {
    let rows = sqlx::query_as::<_, CourseWithInstructorRow>(
        "SELECT c.*, u.name AS instructor_name, u.avatar AS instructor_avatar, \
         u.bio AS instructor_bio \
         FROM wishlists w \
         JOIN courses c ON c.id = w.course_id \
         JOIN users u ON u.id = c.instructor_id \
         WHERE w.user_id = $1 \
         ORDER BY w.created_at DESC",
    )
    .bind(caller.id)
    .fetch_all(&db)
    .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

async fn add_to_wishlist(
    State(db): State<Db>,
    caller: Caller,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let course = sqlx::query_scalar::<_, Uuid>("SELECT id FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(&db)
        .await?;
    if course.is_none() {
        return Err(ApiError::NotFound("Course"));
    }

    let inserted = sqlx::query(
        "INSERT INTO wishlists (user_id, course_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(caller.id)
    .bind(course_id)
    .execute(&db)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict("Course already in wishlist"));
    }
    Ok(Json(json!({ "message": "Course added to wishlist" })))
}

async fn remove_from_wishlist(
    State(db): State<Db>,
    caller: Caller,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    sqlx::query("DELETE FROM wishlists WHERE user_id = $1 AND course_id = $2")
        .bind(caller.id)
        .bind(course_id)
        .execute(&db)
        .await?;
    Ok(Json(json!({ "message": "Course removed from wishlist" })))
}

async fn instructors(
    State(db): State<Db>,
) -> Result<Json<Vec<InstructorDirectoryEntry>>, ApiError> {
    let rows = sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = $1 ORDER BY name")
        .bind(Role::Instructor)
        .fetch_all(&db)
        .await?;

    let mut out = Vec::with_capacity(rows.len());
    for user in rows {
        let courses = sqlx::query_as::<_, CourseCard>(
            "SELECT id, title, image FROM courses \
             WHERE instructor_id = $1 AND is_published ORDER BY created_at DESC",
        )
        .bind(user.id)
        .fetch_all(&db)
        .await?;
        out.push(InstructorDirectoryEntry {
            instructor: InstructorSummary {
                id: user.id,
                name: user.name,
                avatar: user.avatar,
                bio: user.bio,
            },
            courses,
        });
    }
    Ok(Json(out))
}
