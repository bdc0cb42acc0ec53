use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Caller;
use crate::db::Db;
use crate::error::{field_error, ApiError};
use crate::models::{
    Category, CourseDetail, CourseListResponse, CourseView, CourseWithInstructorRow,
    CreateCourseReq, Lesson, LessonInput, RateCourseReq, RatingRow, Role, UpdateCourseReq,
};
use crate::workflow;

pub fn router() -> Router<Db> {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route("/:id", get(get_course).put(update_course).delete(delete_course))
        .route("/:id/rate", post(rate_course))
}

const COURSE_WITH_INSTRUCTOR: &str =
    "SELECT c.*, u.name AS instructor_name, u.avatar AS instructor_avatar, \
     u.bio AS instructor_bio \
     FROM courses c JOIN users u ON u.id = c.instructor_id";

#[derive(Deserialize, Debug, Default)]
struct ListCoursesQuery {
    category: Option<String>,
    search: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

async fn list_courses(
    State(db): State<Db>,
    Query(q): Query<ListCoursesQuery>,
) -> Result<Json<CourseListResponse>, ApiError> {
    let category = match q.category.as_deref() {
        None | Some("all") => None,
        Some(s) => Some(
            Category::from_str(s)
                .map_err(|_| ApiError::Validation(field_error("category", "unknown category")))?,
        ),
    };
    let search = q.search.filter(|s| !s.is_empty());
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(10).clamp(1, 100);

    const FILTER: &str = "WHERE c.is_published \
         AND ($1::course_category IS NULL OR c.category = $1) \
         AND ($2::text IS NULL OR c.title ILIKE '%' || $2 || '%' \
              OR c.description ILIKE '%' || $2 || '%')";

    let rows = sqlx::query_as::<_, CourseWithInstructorRow>(&format!(
        "{COURSE_WITH_INSTRUCTOR} {FILTER} ORDER BY c.created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(category)
    .bind(&search)
    .bind(limit)
    .bind((page - 1) * limit)
    .fetch_all(&db)
    .await?;

    let total = sqlx::query_scalar::<_, i64>(&format!(
        "SELECT count(*) FROM courses c {FILTER}"
    ))
    .bind(category)
    .bind(&search)
    .fetch_one(&db)
    .await?;

    Ok(Json(CourseListResponse {
        courses: rows.into_iter().map(Into::into).collect(),
        total,
        total_pages: (total + limit - 1) / limit,
        current_page: page,
    }))
}

async fn get_course(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetail>, ApiError> {
    Ok(Json(course_detail(&db, id).await?))
}

pub async fn course_detail(db: &Db, id: Uuid) -> Result<CourseDetail, ApiError> {
    let row = sqlx::query_as::<_, CourseWithInstructorRow>(&format!(
        "{COURSE_WITH_INSTRUCTOR} WHERE c.id = $1"
    ))
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(ApiError::NotFound("Course"))?;

    let lessons =
        sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE course_id = $1 ORDER BY position")
            .bind(id)
            .fetch_all(db)
            .await?;

    let ratings = sqlx::query_as::<_, RatingRow>(
        "SELECT r.user_id, u.name AS user_name, u.avatar AS user_avatar, \
         r.rating, r.review, r.created_at \
         FROM ratings r JOIN users u ON u.id = r.user_id \
         WHERE r.course_id = $1 ORDER BY r.created_at DESC",
    )
    .bind(id)
    .fetch_all(db)
    .await?;

    let view: CourseView = row.into();
    Ok(CourseDetail {
        course: view.course,
        instructor: view.instructor,
        lessons,
        ratings: ratings.into_iter().map(Into::into).collect(),
    })
}

async fn create_course(
    State(db): State<Db>,
    caller: Caller,
    Json(req): Json<CreateCourseReq>,
) -> Result<(StatusCode, Json<CourseDetail>), ApiError> {
    caller.require_role(&[Role::Instructor, Role::Admin])?;
    req.validate()?;

    let mut tx = db.begin().await?;
    let course_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO courses (id, title, description, category, price, image, duration, level, \
         instructor_id, requirements, learning_outcomes, tags, is_published) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(course_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.category)
    .bind(req.price)
    .bind(&req.image)
    .bind(&req.duration)
    .bind(req.level)
    .bind(caller.id)
    .bind(&req.requirements)
    .bind(&req.learning_outcomes)
    .bind(&req.tags)
    .bind(req.is_published)
    .execute(&mut *tx)
    .await?;

    insert_lessons(&mut tx, course_id, &req.lessons).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(course_detail(&db, course_id).await?)))
}

async fn update_course(
    State(db): State<Db>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateCourseReq>,
) -> Result<Json<CourseDetail>, ApiError> {
    caller.require_role(&[Role::Instructor, Role::Admin])?;
    req.validate()?;
    require_course_access(&db, &caller, id).await?;

    let mut tx = db.begin().await?;
    sqlx::query(
        "UPDATE courses SET \
           title = COALESCE($2, title), \
           description = COALESCE($3, description), \
           category = COALESCE($4::course_category, category), \
           price = COALESCE($5, price), \
           image = COALESCE($6, image), \
           duration = COALESCE($7, duration), \
           level = COALESCE($8::course_level, level), \
           requirements = COALESCE($9, requirements), \
           learning_outcomes = COALESCE($10, learning_outcomes), \
           tags = COALESCE($11, tags), \
           is_published = COALESCE($12, is_published), \
           updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(req.category)
    .bind(req.price)
    .bind(&req.image)
    .bind(&req.duration)
    .bind(req.level)
    .bind(&req.requirements)
    .bind(&req.learning_outcomes)
    .bind(&req.tags)
    .bind(req.is_published)
    .execute(&mut *tx)
    .await?;

    if let Some(lessons) = &req.lessons {
        sqlx::query("DELETE FROM lessons WHERE course_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_lessons(&mut tx, id, lessons).await?;
    }
    tx.commit().await?;

    Ok(Json(course_detail(&db, id).await?))
}

async fn delete_course(
    State(db): State<Db>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    caller.require_role(&[Role::Instructor, Role::Admin])?;
    require_course_access(&db, &caller, id).await?;

    // Lessons, enrollments, ratings and wishlist entries cascade with the
    // course row.
    sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(&db)
        .await?;
    Ok(Json(json!({ "message": "Course removed" })))
}

async fn rate_course(
    State(db): State<Db>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<RateCourseReq>,
) -> Result<Json<CourseDetail>, ApiError> {
    workflow::rate_course(&db, id, caller.id, &req).await?;
    Ok(Json(course_detail(&db, id).await?))
}

async fn require_course_access(db: &Db, caller: &Caller, id: Uuid) -> Result<(), ApiError> {
    let instructor_id =
        sqlx::query_scalar::<_, Uuid>("SELECT instructor_id FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or(ApiError::NotFound("Course"))?;
    if instructor_id != caller.id && caller.role != Role::Admin {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

async fn insert_lessons(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    course_id: Uuid,
    lessons: &[LessonInput],
) -> Result<(), ApiError> {
    for (position, lesson) in lessons.iter().enumerate() {
        sqlx::query(
            "INSERT INTO lessons (id, course_id, position, title, description, video_url, \
             duration, is_preview) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(position as i32)
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(&lesson.video_url)
        .bind(&lesson.duration)
        .bind(lesson.is_preview)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
