//! HS256 session token adapter.
//!
//! Implements the `SessionValidator` port for the tokens issued at login:
//! an HMAC-SHA256 signed JWT whose `id` claim is the user id and whose
//! `username` claim is the display handle.
//!
//! # Example
//!
//! ```ignore
//! let validator = JwtSessionValidator::new(config.auth.jwt_secret.clone());
//! let user = validator.validate("eyJ...").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{AuthError, AuthenticatedUser, UserId};
use crate::ports::SessionValidator;

/// Claims carried by a session token.
#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    /// User id (UUID string)
    id: String,

    username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    iss: Option<String>,

    /// Expiry timestamp (Unix epoch seconds)
    exp: i64,
}

/// Validates HS256 session tokens against a shared secret.
pub struct JwtSessionValidator {
    secret: SecretString,
}

impl JwtSessionValidator {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Issue a token for `user` that expires after `ttl`.
    ///
    /// Login lives elsewhere; this exists for tooling and tests.
    pub fn sign(&self, user: &AuthenticatedUser, ttl: Duration) -> Result<String, AuthError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AuthError::service_unavailable(format!("token lifetime out of range: {}", e)))?;
        let claims = SessionClaims {
            id: user.id.to_string(),
            username: user.username.clone(),
            iss: Some(user.id.to_string()),
            exp: (Utc::now() + ttl).timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|e| AuthError::service_unavailable(format!("failed to sign token: {}", e)))
    }

    fn decode_claims(&self, token: &str) -> Result<SessionClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let key = DecodingKey::from_secret(self.secret.expose_secret().as_bytes());

        decode::<SessionClaims>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => {
                    tracing::debug!("Session token expired");
                    AuthError::TokenExpired
                }
                _ => {
                    tracing::debug!("Session token rejected: {}", e);
                    AuthError::InvalidToken
                }
            })
    }
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.decode_claims(token)?;

        let user_id: UserId = claims.id.parse().map_err(|_| {
            tracing::debug!(claim = %claims.id, "Session token carries a malformed user id");
            AuthError::InvalidToken
        })?;

        Ok(AuthenticatedUser::new(user_id, claims.username))
    }
}

impl std::fmt::Debug for JwtSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSessionValidator")
            .field("algorithm", &"HS256")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(secret: &str) -> JwtSessionValidator {
        JwtSessionValidator::new(SecretString::new(secret.to_string()))
    }

    fn raw_token(secret: &str, id: &str, exp: i64) -> String {
        let claims = SessionClaims {
            id: id.to_string(),
            username: "alice".to_string(),
            iss: None,
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn signed_token_round_trips_identity() {
        let validator = validator("test-secret");
        let user = AuthenticatedUser::new(UserId::new(), "alice");

        let token = validator.sign(&user, Duration::from_secs(3600)).unwrap();
        let validated = validator.validate(&token).await.unwrap();

        assert_eq!(validated, user);
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_invalid() {
        let user = AuthenticatedUser::new(UserId::new(), "alice");
        let token = validator("other-secret")
            .sign(&user, Duration::from_secs(3600))
            .unwrap();

        let result = validator("test-secret").validate(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn expired_token_is_reported_as_expired() {
        let token = raw_token(
            "test-secret",
            &UserId::new().to_string(),
            Utc::now().timestamp() - 3600,
        );

        let result = validator("test-secret").validate(&token).await;
        assert!(matches!(result, Err(AuthError::TokenExpired)));
    }

    #[tokio::test]
    async fn non_uuid_user_id_is_invalid() {
        let token = raw_token("test-secret", "user-123", Utc::now().timestamp() + 3600);

        let result = validator("test-secret").validate(&token).await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let result = validator("test-secret").validate("not.a.jwt").await;
        assert!(matches!(result, Err(AuthError::InvalidToken)));
    }

    #[test]
    fn debug_does_not_print_secret() {
        let output = format!("{:?}", validator("super-secret"));
        assert!(!output.contains("super-secret"));
    }

    #[test]
    fn jwt_validator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<JwtSessionValidator>();
    }
}
