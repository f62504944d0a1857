use actix_web::error::{ErrorInternalServerError, ErrorUnauthorized};
use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::utils::auth::decode_jwt;
use crate::utils::config::Config;

/// Caller identity taken from the `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
}

pub fn extract_user_from_request(
    req: &HttpRequest,
    jwt_secret: &str,
) -> Result<AuthenticatedUser, Error> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ErrorUnauthorized("Missing authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ErrorUnauthorized("Invalid authorization format"))?;

    let claims =
        decode_jwt(token, jwt_secret).map_err(|_| ErrorUnauthorized("Invalid or expired token"))?;

    let user_id =
        Uuid::parse_str(&claims.sub).map_err(|_| ErrorUnauthorized("Invalid user ID in token"))?;

    Ok(AuthenticatedUser { user_id })
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<Config>>() {
            Some(config) => extract_user_from_request(req, &config.jwt_secret),
            None => {
                log::error!("Config missing from application data");
                Err(ErrorInternalServerError("Server misconfigured"))
            }
        };

        if let Err(e) = &result {
            log::warn!("Rejected request to {}: {}", req.path(), e);
        }

        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::auth::create_jwt;
    use actix_web::test::TestRequest;

    #[test]
    fn test_extracts_user_from_bearer_token() {
        let user_id = Uuid::new_v4();
        let token = create_jwt(user_id, "secret", 1).unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();

        let user = extract_user_from_request(&req, "secret").unwrap();
        assert_eq!(user.user_id, user_id);
    }

    #[test]
    fn test_rejects_missing_or_malformed_header() {
        let req = TestRequest::default().to_http_request();
        assert!(extract_user_from_request(&req, "secret").is_err());

        let req = TestRequest::default()
            .insert_header(("Authorization", "Token abc"))
            .to_http_request();
        assert!(extract_user_from_request(&req, "secret").is_err());
    }
}
