//! Authentication utilities
//!
//! Credential issuance and password handling live outside this service.
//! Here we only verify the HS256 tokens the auth layer hands out and expose
//! the caller's identity to route handlers through an extractor. The signing
//! secret is the instance's `server_id`.

use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use anyhow::Result;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::api::error::ApiError;
use crate::config::Settings;

/// User identity carried in the JWT `sub` claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserIdentity,
    pub exp: usize,
}

/// Create a signed token for the given identity, valid for `expires_in`
/// seconds. Used by operator tooling and tests; the public login flow is
/// handled by the external auth service with the same secret.
pub fn create_jwt(identity: UserIdentity, secret: &str, expires_in: u64) -> Result<String> {
    let expiration = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + expires_in;

    let claims = Claims {
        sub: identity,
        exp: expiration as usize,
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Verify a token and return its claims
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.sub = None;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;

    Ok(token_data.claims)
}

/// The authenticated caller, extracted from the `Authorization: Bearer`
/// header or the `access_token` cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserIdentity);

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_user(req))
    }
}

fn extract_user(req: &HttpRequest) -> Result<CurrentUser, ApiError> {
    let token = bearer_token(req)
        .or_else(|| req.cookie("access_token").map(|c| c.value().to_string()))
        .ok_or(ApiError::Unauthorized)?;

    let secret = {
        let settings = Settings::global();
        let guard = settings.read();
        guard.server_id.clone()
    };

    let claims = verify_jwt(&token, &secret).map_err(|_| ApiError::Unauthorized)?;
    Ok(CurrentUser(claims.sub))
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
    let header = req.headers().get("Authorization")?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_roundtrip() {
        let identity = UserIdentity {
            id: 7,
            username: "ada".into(),
        };
        let token = create_jwt(identity, "test-secret", 3600).unwrap();
        let claims = verify_jwt(&token, "test-secret").unwrap();
        assert_eq!(claims.sub.id, 7);
        assert_eq!(claims.sub.username, "ada");
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let identity = UserIdentity {
            id: 7,
            username: "ada".into(),
        };
        let token = create_jwt(identity, "test-secret", 3600).unwrap();
        assert!(verify_jwt(&token, "other-secret").is_err());
    }
}
