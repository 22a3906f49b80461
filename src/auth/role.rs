//! Account roles
//!
//! The closed role enumeration for marketplace accounts. Roles are stored
//! as lowercase strings in MongoDB and in JWT claims; parsing normalizes
//! case once at the boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::AgoraError;

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular shopper - no privileged operations
    #[default]
    General,
    /// Verified seller - may delete own product listings
    Farmer,
    /// Verified reviewer - may verify/unverify product listings
    Expert,
    /// Platform administrator
    Admin,
}

impl Role {
    /// All roles a user may request elevation to.
    /// General is the starting role, not an elevation target.
    pub fn elevation_targets() -> &'static [Role] {
        &[Role::Farmer, Role::Expert]
    }

    /// Whether this role can be requested through the verification workflow
    pub fn is_elevation_target(self) -> bool {
        Self::elevation_targets().contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::General => "general",
            Role::Farmer => "farmer",
            Role::Expert => "expert",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AgoraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" => Ok(Role::General),
            "farmer" => Ok(Role::Farmer),
            "expert" => Ok(Role::Expert),
            "admin" => Ok(Role::Admin),
            other => Err(AgoraError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        assert_eq!("FARMER".parse::<Role>().unwrap(), Role::Farmer);
        assert_eq!("Expert".parse::<Role>().unwrap(), Role::Expert);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("banana".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_elevation_targets() {
        assert!(Role::Farmer.is_elevation_target());
        assert!(Role::Expert.is_elevation_target());
        assert!(!Role::General.is_elevation_target());
        assert!(!Role::Admin.is_elevation_target());
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Farmer).unwrap(), "\"farmer\"");
        let role: Role = serde_json::from_str("\"expert\"").unwrap();
        assert_eq!(role, Role::Expert);
    }
}
