//! Claims carried by closure service access tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CompanyId, UserId};

/// Access token claims: who acts, for which company, in which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Acting user.
    pub sub: UserId,
    /// Company whose books the token may touch.
    pub org: CompanyId,
    /// Role name, parsed by the API layer.
    pub role: String,
    /// Token issuer.
    pub iss: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

impl Claims {
    /// Builds claims issued now.
    #[must_use]
    pub fn new(
        user_id: UserId,
        company_id: CompanyId,
        role: &str,
        issuer: &str,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: user_id,
            org: company_id,
            role: role.to_string(),
            iss: issuer.to_string(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    /// Acting user.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.sub
    }

    /// Company the token is scoped to.
    #[must_use]
    pub const fn company_id(&self) -> CompanyId {
        self.org
    }
}
