use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "course_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Html,
    Css,
    Javascript,
    React,
    Node,
    Python,
    Java,
    Other,
}

impl std::str::FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(Self::Html),
            "css" => Ok(Self::Css),
            "javascript" => Ok(Self::Javascript),
            "react" => Ok(Self::React),
            "node" => Ok(Self::Node),
            "python" => Ok(Self::Python),
            "java" => Ok(Self::Java),
            "other" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "course_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub price: f64,
    pub image: String,
    pub duration: String,
    pub level: Level,
    pub instructor_id: Uuid,
    pub requirements: Vec<String>,
    pub learning_outcomes: Vec<String>,
    pub tags: Vec<String>,
    pub is_published: bool,
    pub average_rating: f64,
    pub total_ratings: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub position: i32,
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<String>,
    pub is_preview: bool,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub progress: i32,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub certificate_issued: bool,
    pub certificate_issued_at: Option<DateTime<Utc>>,
    pub certificate_id: Option<String>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct CompletedLesson {
    pub lesson_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// Percentage of lessons done, rounded to the nearest integer. A course
/// with no lessons reports 0 no matter what was recorded.
pub fn lesson_progress(completed: u64, total: u64) -> i32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as i32
}

/// Aggregate rating recomputed from the full rating set: (mean, count).
/// Never derived incrementally, so it can't drift.
pub fn rating_summary(scores: &[i32]) -> (f64, i32) {
    if scores.is_empty() {
        return (0.0, 0);
    }
    let sum: i64 = scores.iter().map(|s| *s as i64).sum();
    (sum as f64 / scores.len() as f64, scores.len() as i32)
}

impl Enrollment {
    /// Re-derive progress from completion counts and apply the one-way
    /// Active -> Completed transition. Once completed, progress and the
    /// terminal fields are frozen; the certificate is issued exactly once,
    /// at the transition. Returns true when the transition fired.
    pub fn apply_progress(&mut self, completed: u64, total: u64, now: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.progress = lesson_progress(completed, total);
        if self.progress >= 100 {
            self.is_completed = true;
            self.completed_at = Some(now);
            self.certificate_issued = true;
            self.certificate_issued_at = Some(now);
            self.certificate_id = Some(format!("CERT-{}", Uuid::new_v4().simple()));
            return true;
        }
        false
    }
}

// --- populated views ---

#[derive(Serialize, Debug, Clone)]
pub struct InstructorSummary {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct CourseWithInstructorRow {
    #[sqlx(flatten)]
    pub course: Course,
    pub instructor_name: String,
    pub instructor_avatar: Option<String>,
    pub instructor_bio: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CourseView {
    #[serde(flatten)]
    pub course: Course,
    pub instructor: InstructorSummary,
}

impl From<CourseWithInstructorRow> for CourseView {
    fn from(row: CourseWithInstructorRow) -> Self {
        let instructor = InstructorSummary {
            id: row.course.instructor_id,
            name: row.instructor_name,
            avatar: row.instructor_avatar,
            bio: row.instructor_bio,
        };
        CourseView { course: row.course, instructor }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub instructor: InstructorSummary,
    pub lessons: Vec<Lesson>,
    pub ratings: Vec<RatingView>,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct RatingRow {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_avatar: Option<String>,
    pub rating: i32,
    pub review: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone)]
pub struct UserBrief {
    pub id: Uuid,
    pub name: String,
    pub avatar: Option<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct RatingView {
    pub user: UserBrief,
    pub rating: i32,
    pub review: String,
    pub created_at: DateTime<Utc>,
}

impl From<RatingRow> for RatingView {
    fn from(row: RatingRow) -> Self {
        RatingView {
            user: UserBrief { id: row.user_id, name: row.user_name, avatar: row.user_avatar },
            rating: row.rating,
            review: row.review,
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct EnrollmentDetail {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: CourseView,
    pub completed_lessons: Vec<CompletedLesson>,
}

#[derive(Serialize, Debug, Clone)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub enrolled_courses: Vec<CourseView>,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone)]
pub struct CourseCard {
    pub id: Uuid,
    pub title: String,
    pub image: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct InstructorDirectoryEntry {
    #[serde(flatten)]
    pub instructor: InstructorSummary,
    pub courses: Vec<CourseCard>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CourseListResponse {
    pub courses: Vec<CourseView>,
    pub total: i64,
    pub total_pages: i64,
    pub current_page: i64,
}

// --- request bodies, validated at the boundary ---

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct RegisterUserReq {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub role: Option<Role>,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct UpdateProfileReq {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct LessonInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub video_url: Option<String>,
    pub duration: Option<String>,
    #[serde(default)]
    pub is_preview: bool,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct CreateCourseReq {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(min = 1, max = 1000))]
    pub description: String,
    pub category: Category,
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[validate(length(min = 1))]
    pub image: String,
    #[validate(length(min = 1))]
    pub duration: String,
    pub level: Level,
    #[validate(nested)]
    #[serde(default)]
    pub lessons: Vec<LessonInput>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub learning_outcomes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Deserialize, Validate, Debug, Clone, Default)]
pub struct UpdateCourseReq {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 1000))]
    pub description: Option<String>,
    pub category: Option<Category>,
    #[validate(range(min = 0.0))]
    pub price: Option<f64>,
    #[validate(length(min = 1))]
    pub image: Option<String>,
    #[validate(length(min = 1))]
    pub duration: Option<String>,
    pub level: Option<Level>,
    #[validate(nested)]
    pub lessons: Option<Vec<LessonInput>>,
    pub requirements: Option<Vec<String>>,
    pub learning_outcomes: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub is_published: Option<bool>,
}

#[derive(Deserialize, Validate, Debug, Clone)]
pub struct RateCourseReq {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(min = 1))]
    pub review: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CompleteLessonReq {
    #[serde(rename = "lessonId")]
    pub lesson_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment() -> Enrollment {
        Enrollment {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            enrolled_at: Utc::now(),
            progress: 0,
            is_completed: false,
            completed_at: None,
            certificate_issued: false,
            certificate_issued_at: None,
            certificate_id: None,
        }
    }

    #[test]
    fn progress_is_zero_for_course_without_lessons() {
        assert_eq!(lesson_progress(0, 0), 0);
        assert_eq!(lesson_progress(3, 0), 0);
    }

    #[test]
    fn progress_rounds_to_nearest_percent() {
        assert_eq!(lesson_progress(1, 4), 25);
        assert_eq!(lesson_progress(1, 3), 33);
        assert_eq!(lesson_progress(2, 3), 67);
        assert_eq!(lesson_progress(4, 4), 100);
    }

    #[test]
    fn four_lesson_course_walkthrough() {
        let mut e = enrollment();
        let now = Utc::now();
        assert_eq!(e.progress, 0);
        assert!(!e.apply_progress(1, 4, now));
        assert_eq!(e.progress, 25);
        assert!(!e.apply_progress(2, 4, now));
        assert!(!e.apply_progress(3, 4, now));
        assert!(e.apply_progress(4, 4, now));
        assert_eq!(e.progress, 100);
        assert!(e.is_completed);
        assert_eq!(e.completed_at, Some(now));
    }

    #[test]
    fn completion_is_one_way() {
        let mut e = enrollment();
        let now = Utc::now();
        assert!(e.apply_progress(2, 2, now));
        let cert = e.certificate_id.clone();
        assert!(cert.is_some());

        // denominator grew afterwards; terminal fields stay frozen
        assert!(!e.apply_progress(2, 5, now));
        assert_eq!(e.progress, 100);
        assert!(e.is_completed);
        assert_eq!(e.certificate_id, cert);
    }

    #[test]
    fn certificate_issued_at_transition() {
        let mut e = enrollment();
        let now = Utc::now();
        e.apply_progress(1, 2, now);
        assert!(!e.certificate_issued);
        e.apply_progress(2, 2, now);
        assert!(e.certificate_issued);
        assert_eq!(e.certificate_issued_at, Some(now));
    }

    #[test]
    fn rating_summary_of_empty_set() {
        assert_eq!(rating_summary(&[]), (0.0, 0));
    }

    #[test]
    fn rating_summary_is_mean_and_count() {
        let (avg, count) = rating_summary(&[5, 4, 3]);
        assert_eq!(avg, 4.0);
        assert_eq!(count, 3);

        let (avg, count) = rating_summary(&[5, 4]);
        assert_eq!(avg, 4.5);
        assert_eq!(count, 2);
    }

    #[test]
    fn rate_request_rejects_out_of_range_and_empty_review() {
        let bad = RateCourseReq { rating: 6, review: "great".into() };
        let errs = bad.validate().unwrap_err();
        assert!(errs.field_errors().contains_key("rating"));

        let bad = RateCourseReq { rating: 3, review: String::new() };
        let errs = bad.validate().unwrap_err();
        assert!(errs.field_errors().contains_key("review"));

        let ok = RateCourseReq { rating: 1, review: "meh".into() };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn register_request_requires_valid_email() {
        let bad = RegisterUserReq { name: "Ada".into(), email: "nope".into(), role: None };
        let errs = bad.validate().unwrap_err();
        assert!(errs.field_errors().contains_key("email"));
    }

    #[test]
    fn category_parses_known_slugs_only() {
        use std::str::FromStr;

        assert_eq!(Category::from_str("react"), Ok(Category::React));
        assert_eq!(Category::from_str("node"), Ok(Category::Node));
        assert!(Category::from_str("basket-weaving").is_err());
    }

    #[test]
    fn complete_lesson_body_uses_client_field_name() {
        let req: CompleteLessonReq =
            serde_json::from_value(serde_json::json!({ "lessonId": Uuid::new_v4() })).unwrap();
        assert_ne!(req.lesson_id, Uuid::nil());
    }
}
