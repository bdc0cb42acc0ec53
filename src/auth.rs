use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use uuid::Uuid;

use crate::db::Db;
use crate::error::ApiError;
use crate::models::Role;

/// Authenticated caller, resolved from `Authorization: Bearer <user-id>`.
/// Token issuance lives outside this service; the bearer value is the
/// caller's user id and must match a registered user.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub id: Uuid,
    pub role: Role,
}

impl Caller {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

pub fn parse_token(token: &str) -> Option<Uuid> {
    Uuid::parse_str(token.trim()).ok()
}

#[axum::async_trait]
impl FromRequestParts<Db> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, db: &Db) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, db)
                .await
                .map_err(|_| ApiError::Unauthorized)?;
        let id = parse_token(bearer.token()).ok_or(ApiError::Unauthorized)?;

        let role = sqlx::query_scalar::<_, Role>("SELECT role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(Caller { id, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_must_be_a_uuid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_token(&id.to_string()), Some(id));
        assert_eq!(parse_token(&format!("  {id} ")), Some(id));
        assert_eq!(parse_token("not-a-uuid"), None);
        assert_eq!(parse_token(""), None);
    }

    #[test]
    fn role_gate_matches_allowed_list() {
        let caller = Caller { id: Uuid::new_v4(), role: Role::Student };
        assert!(caller.require_role(&[Role::Student]).is_ok());
        assert!(matches!(
            caller.require_role(&[Role::Instructor, Role::Admin]),
            Err(ApiError::Forbidden)
        ));
    }
}
