//! User roles and closure permissions.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// User roles within a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Full access, can transfer ownership.
    Owner,
    /// Full access except ownership transfer.
    Admin,
    /// Keeps the books, closes periods.
    Accountant,
    /// Approves documents.
    Approver,
    /// Read-only access.
    Viewer,
}

/// Role string not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl UserRole {
    /// Returns true if this role can commit a closure and lock periods.
    #[must_use]
    pub const fn can_close_periods(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin | Self::Accountant)
    }
}

impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "accountant" => Ok(Self::Accountant),
            "approver" => Ok(Self::Approver),
            "viewer" => Ok(Self::Viewer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Accountant => write!(f, "accountant"),
            Self::Approver => write!(f, "approver"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}
