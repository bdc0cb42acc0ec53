// Enrollment workflow: enroll/cancel, lesson completion, progress and
// rating recomputation. Multi-step writes run in one transaction;
// uniqueness races are settled by the schema's unique indexes.

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::db::Db;
use crate::error::{db_conflict, ApiError};
use crate::models::{
    rating_summary, CompletedLesson, CourseWithInstructorRow, Enrollment, EnrollmentDetail,
    RateCourseReq,
};

pub async fn enroll(db: &Db, student_id: Uuid, course_id: Uuid) -> Result<Enrollment, ApiError> {
    let course = sqlx::query_scalar::<_, Uuid>("SELECT id FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(db)
        .await?;
    if course.is_none() {
        return Err(ApiError::NotFound("Course"));
    }

    // The enrolled-courses and enrolled-students views derive from this
    // row, so the single insert is the entire enrollment.
    sqlx::query_as::<_, Enrollment>(
        "INSERT INTO enrollments (id, student_id, course_id) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(course_id)
    .fetch_one(db)
    .await
    .map_err(|e| db_conflict(e, "Already enrolled in this course"))
}

pub async fn list_enrollments_for_student(
    db: &Db,
    student_id: Uuid,
) -> Result<Vec<EnrollmentDetail>, ApiError> {
    let enrollments = sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrollments WHERE student_id = $1 ORDER BY enrolled_at DESC",
    )
    .bind(student_id)
    .fetch_all(db)
    .await?;

    let mut out = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        out.push(populate(db, enrollment).await?);
    }
    Ok(out)
}

pub async fn get_enrollment(
    db: &Db,
    enrollment_id: Uuid,
    caller_id: Uuid,
) -> Result<EnrollmentDetail, ApiError> {
    let enrollment = sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = $1")
        .bind(enrollment_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("Enrollment"))?;
    if enrollment.student_id != caller_id {
        return Err(ApiError::Unauthorized);
    }
    populate(db, enrollment).await
}

pub async fn complete_lesson(
    db: &Db,
    enrollment_id: Uuid,
    caller_id: Uuid,
    lesson_id: Uuid,
) -> Result<EnrollmentDetail, ApiError> {
    let mut tx = db.begin().await?;

    let mut enrollment =
        sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = $1 FOR UPDATE")
            .bind(enrollment_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(ApiError::NotFound("Enrollment"))?;
    if enrollment.student_id != caller_id {
        return Err(ApiError::Unauthorized);
    }

    let lesson =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM lessons WHERE id = $1 AND course_id = $2")
            .bind(lesson_id)
            .bind(enrollment.course_id)
            .fetch_optional(&mut *tx)
            .await?;
    if lesson.is_none() {
        return Err(ApiError::NotFound("Lesson"));
    }

    let inserted = sqlx::query(
        "INSERT INTO completed_lessons (enrollment_id, lesson_id) VALUES ($1, $2) \
         ON CONFLICT DO NOTHING",
    )
    .bind(enrollment_id)
    .bind(lesson_id)
    .execute(&mut *tx)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict("Lesson already completed"));
    }

    let completed =
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM completed_lessons WHERE enrollment_id = $1")
            .bind(enrollment_id)
            .fetch_one(&mut *tx)
            .await?;
    let total = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM lessons WHERE course_id = $1")
        .bind(enrollment.course_id)
        .fetch_one(&mut *tx)
        .await?;

    enrollment.apply_progress(completed as u64, total as u64, Utc::now());

    sqlx::query(
        "UPDATE enrollments SET progress = $2, is_completed = $3, completed_at = $4, \
         certificate_issued = $5, certificate_issued_at = $6, certificate_id = $7 WHERE id = $1",
    )
    .bind(enrollment.id)
    .bind(enrollment.progress)
    .bind(enrollment.is_completed)
    .bind(enrollment.completed_at)
    .bind(enrollment.certificate_issued)
    .bind(enrollment.certificate_issued_at)
    .bind(enrollment.certificate_id.clone())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    populate(db, enrollment).await
}

pub async fn cancel_enrollment(
    db: &Db,
    enrollment_id: Uuid,
    caller_id: Uuid,
) -> Result<(), ApiError> {
    let enrollment = sqlx::query_as::<_, Enrollment>("SELECT * FROM enrollments WHERE id = $1")
        .bind(enrollment_id)
        .fetch_optional(db)
        .await?
        .ok_or(ApiError::NotFound("Enrollment"))?;
    if enrollment.student_id != caller_id {
        return Err(ApiError::Unauthorized);
    }

    // Completions cascade with the record; the derived course/student
    // views disappear with it. Certificate state dies here too.
    sqlx::query("DELETE FROM enrollments WHERE id = $1")
        .bind(enrollment_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn rate_course(
    db: &Db,
    course_id: Uuid,
    caller_id: Uuid,
    req: &RateCourseReq,
) -> Result<(), ApiError> {
    req.validate()?;

    let mut tx = db.begin().await?;

    // FOR UPDATE serializes concurrent ratings of the same course so the
    // aggregate recompute below sees every row.
    let course = sqlx::query_scalar::<_, Uuid>("SELECT id FROM courses WHERE id = $1 FOR UPDATE")
        .bind(course_id)
        .fetch_optional(&mut *tx)
        .await?;
    if course.is_none() {
        return Err(ApiError::NotFound("Course"));
    }

    let inserted = sqlx::query(
        "INSERT INTO ratings (course_id, user_id, rating, review) VALUES ($1, $2, $3, $4) \
         ON CONFLICT DO NOTHING",
    )
    .bind(course_id)
    .bind(caller_id)
    .bind(req.rating)
    .bind(&req.review)
    .execute(&mut *tx)
    .await?;
    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict("Course already rated"));
    }

    let scores = sqlx::query_scalar::<_, i32>("SELECT rating FROM ratings WHERE course_id = $1")
        .bind(course_id)
        .fetch_all(&mut *tx)
        .await?;
    let (average, count) = rating_summary(&scores);

    sqlx::query(
        "UPDATE courses SET average_rating = $2, total_ratings = $3, updated_at = now() \
         WHERE id = $1",
    )
    .bind(course_id)
    .bind(average)
    .bind(count)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn populate(db: &Db, enrollment: Enrollment) -> Result<EnrollmentDetail, ApiError> {
    let course = sqlx::query_as::<_, CourseWithInstructorRow>(
        "SELECT c.*, u.name AS instructor_name, u.avatar AS instructor_avatar, \
         u.bio AS instructor_bio \
         FROM courses c JOIN users u ON u.id = c.instructor_id WHERE c.id = $1",
    )
    .bind(enrollment.course_id)
    .fetch_one(db)
    .await?;

    let completed_lessons = sqlx::query_as::<_, CompletedLesson>(
        "SELECT lesson_id, completed_at FROM completed_lessons WHERE enrollment_id = $1 \
         ORDER BY completed_at",
    )
    .bind(enrollment.id)
    .fetch_all(db)
    .await?;

    Ok(EnrollmentDetail { enrollment, course: course.into(), completed_lessons })
}
