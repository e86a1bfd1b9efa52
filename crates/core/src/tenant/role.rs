//! Membership roles and their total order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a user holds within one company.
///
/// Ordered from lowest to highest privilege; every authorization check is a
/// single `>=` comparison against the required role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Front-desk staff: records transactions.
    Teller = 1,
    /// Approves, rejects, and completes transactions.
    Manager = 2,
    /// Reverses transactions and manages integrations.
    Admin = 3,
    /// Company owner.
    Owner = 4,
}

impl Role {
    /// All roles, lowest first.
    pub const ALL: [Self; 4] = [Self::Teller, Self::Manager, Self::Admin, Self::Owner];

    /// Parse a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "teller" => Some(Self::Teller),
            "manager" => Some(Self::Manager),
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teller => "teller",
            Self::Manager => "manager",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    /// Numeric rank (teller = 1 .. owner = 4).
    #[must_use]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Returns true if this role meets or exceeds `required`.
    #[must_use]
    pub fn at_least(self, required: Self) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_matches_order() {
        assert_eq!(Role::Teller.rank(), 1);
        assert_eq!(Role::Manager.rank(), 2);
        assert_eq!(Role::Admin.rank(), 3);
        assert_eq!(Role::Owner.rank(), 4);
        assert!(Role::Teller < Role::Manager);
        assert!(Role::Admin < Role::Owner);
    }

    #[test]
    fn test_at_least() {
        assert!(Role::Owner.at_least(Role::Admin));
        assert!(Role::Manager.at_least(Role::Manager));
        assert!(!Role::Teller.at_least(Role::Manager));
    }

    #[test]
    fn test_parse_roundtrip_and_case() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("accountant"), None);
    }
}
