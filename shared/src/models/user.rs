//! User and role models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Marketplace roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    /// Pattern-maker selling digital patterns and trainings
    Patronista,
    /// Customer buying patterns
    Cliente,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Patronista => "patronista",
            UserRole::Cliente => "cliente",
        }
    }

    /// Roles a visitor may pick when signing up
    pub fn is_self_assignable(&self) -> bool {
        !matches!(self, UserRole::Admin)
    }

    /// Whether this role may buy from the catalog
    pub fn can_purchase(&self) -> bool {
        matches!(self, UserRole::Cliente | UserRole::Admin)
    }

    /// Whether this role may publish products
    pub fn can_sell(&self) -> bool {
        matches!(self, UserRole::Patronista | UserRole::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "patronista" => Ok(UserRole::Patronista),
            "cliente" => Ok(UserRole::Cliente),
            other => Err(DomainError::UnknownVariant {
                kind: "role",
                value: other.to_string(),
            }),
        }
    }
}

/// A user account as exposed by the API (never carries the password hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub bio: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public profile of a pattern-maker shown in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatronistaProfile {
    pub id: Uuid,
    pub full_name: String,
    pub bio: Option<String>,
    pub product_count: i64,
    pub member_since: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_round_trip_strings() {
        for role in [UserRole::Admin, UserRole::Patronista, UserRole::Cliente] {
            assert_eq!(UserRole::from_str(role.as_str()), Ok(role));
        }
        assert!(UserRole::from_str("vendedor").is_err());
    }

    #[test]
    fn test_admin_is_not_self_assignable() {
        assert!(!UserRole::Admin.is_self_assignable());
        assert!(UserRole::Patronista.is_self_assignable());
        assert!(UserRole::Cliente.is_self_assignable());
    }

    #[test]
    fn test_role_capabilities() {
        assert!(UserRole::Cliente.can_purchase());
        assert!(!UserRole::Patronista.can_purchase());
        assert!(UserRole::Patronista.can_sell());
        assert!(!UserRole::Cliente.can_sell());
    }
}
