//! Authentication configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Session token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC key used to sign and verify session tokens
    pub jwt_secret: SecretString,
}

impl AuthConfig {
    /// Validate authentication configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.jwt_secret.expose_secret().trim().is_empty() {
            return Err(ValidationError::MissingRequired("AUTH__JWT_SECRET"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_secret_is_rejected() {
        let config = AuthConfig {
            jwt_secret: SecretString::new("  ".to_string()),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_is_not_printed_by_debug() {
        let config = AuthConfig {
            jwt_secret: SecretString::new("super-secret".to_string()),
        };
        assert!(!format!("{:?}", config).contains("super-secret"));
    }
}
