//! Caller identity supplied by the upstream gateway.
//!
//! The gateway authenticates the request and forwards the user id in
//! `x-user-id`; `x-user-role` is optional and defaults to a regular user.

use crate::error::AppError;
use crate::push::Role;
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    fn extract(req: &HttpRequest) -> Result<Self, AppError> {
        let header_value = req
            .headers()
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".into()))?;

        let value = header_value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid x-user-id header".into()))?;

        let id = Uuid::parse_str(value)
            .map_err(|_| AppError::Unauthorized("Invalid x-user-id header value".into()))?;

        let role = match req.headers().get(USER_ROLE_HEADER) {
            None => Role::User,
            Some(raw) => raw
                .to_str()
                .ok()
                .and_then(Role::parse)
                .ok_or_else(|| AppError::Unauthorized("Invalid x-user-role header".into()))?,
        };

        Ok(Self { id, role })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::extract(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_extracts_user_and_role() {
        let id = Uuid::new_v4();
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, id.to_string()))
            .insert_header((USER_ROLE_HEADER, "admin"))
            .to_http_request();

        let user = AuthenticatedUser::extract(&req).unwrap();
        assert_eq!(user.id, id);
        assert!(user.is_admin());
    }

    #[test]
    fn test_role_defaults_to_user() {
        let req = TestRequest::default()
            .insert_header((USER_ID_HEADER, Uuid::new_v4().to_string()))
            .to_http_request();

        assert_eq!(AuthenticatedUser::extract(&req).unwrap().role, Role::User);
    }

    #[test]
    fn test_missing_or_malformed_id_is_unauthorized() {
        let missing = TestRequest::default().to_http_request();
        assert!(matches!(
            AuthenticatedUser::extract(&missing),
            Err(AppError::Unauthorized(_))
        ));

        let malformed = TestRequest::default()
            .insert_header((USER_ID_HEADER, "not-a-uuid"))
            .to_http_request();
        assert!(matches!(
            AuthenticatedUser::extract(&malformed),
            Err(AppError::Unauthorized(_))
        ));
    }
}
