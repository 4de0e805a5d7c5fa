//! Signing and verification of company-scoped access tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::auth::Claims;
use crate::types::{CompanyId, UserId};

/// Token signing parameters.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC secret.
    pub secret: String,
    /// Value of the `iss` claim, checked on verification.
    pub issuer: String,
    /// Lifetime of an access token.
    pub access_token_ttl: Duration,
}

/// Token failures.
#[derive(Debug, Error)]
pub enum JwtError {
    /// Signing failed.
    #[error("failed to sign token: {0}")]
    Signing(String),

    /// Bad signature, wrong issuer or malformed token.
    #[error("invalid token: {0}")]
    Invalid(String),

    /// `exp` is in the past.
    #[error("token has expired")]
    Expired,
}

/// Issues and verifies HS256 access tokens.
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("issuer", &self.config.issuer)
            .field("access_token_ttl", &self.config.access_token_ttl)
            .finish_non_exhaustive()
    }
}

impl JwtService {
    /// Builds the keys from the configured secret.
    #[must_use]
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Signs a token letting `user_id` act on `company_id` with `role`.
    pub fn issue(
        &self,
        user_id: UserId,
        company_id: CompanyId,
        role: &str,
    ) -> Result<String, JwtError> {
        let expires_at = Utc::now() + self.config.access_token_ttl;
        let claims = Claims::new(user_id, company_id, role, &self.config.issuer, expires_at);

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Checks signature, expiry and issuer, then returns the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(issuer: &str, ttl: Duration) -> JwtService {
        JwtService::new(JwtConfig {
            secret: "closure-test-secret".to_string(),
            issuer: issuer.to_string(),
            access_token_ttl: ttl,
        })
    }

    #[test]
    fn test_issued_token_verifies() {
        let jwt = service("closure", Duration::minutes(15));
        let user_id = UserId::new();
        let company_id = CompanyId::new();

        let token = jwt.issue(user_id, company_id, "accountant").unwrap();
        let claims = jwt.verify(&token).unwrap();

        assert_eq!(claims.user_id(), user_id);
        assert_eq!(claims.company_id(), company_id);
        assert_eq!(claims.role, "accountant");
    }

    #[test]
    fn test_garbage_is_invalid() {
        let jwt = service("closure", Duration::minutes(15));
        assert!(matches!(jwt.verify("not.a.token"), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let other = service("payroll", Duration::minutes(15));
        let token = other.issue(UserId::new(), CompanyId::new(), "owner").unwrap();

        let jwt = service("closure", Duration::minutes(15));
        assert!(matches!(jwt.verify(&token), Err(JwtError::Invalid(_))));
    }

    #[test]
    fn test_expired_token() {
        let jwt = service("closure", Duration::minutes(-10));
        let token = jwt.issue(UserId::new(), CompanyId::new(), "owner").unwrap();

        assert!(matches!(jwt.verify(&token), Err(JwtError::Expired)));
    }
}
