use axum::Router;

use crate::db::Db;

mod courses;
mod enrollments;
mod users;

pub fn router(db: Db) -> Router {
    Router::new()
        .nest("/api/courses", courses::router())
        .nest("/api/enrollments", enrollments::router())
        .nest("/api/users", users::router())
        .with_state(db)
}
