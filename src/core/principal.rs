//! Principal kinds a managed policy can be attached to

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of IAM principal
///
/// Kinds are always processed in the order of [`PrincipalKind::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// IAM user
    User,
    /// IAM role
    Role,
    /// IAM group
    Group,
}

impl PrincipalKind {
    /// All kinds, in processing order
    pub const ALL: [PrincipalKind; 3] = [PrincipalKind::User, PrincipalKind::Role, PrincipalKind::Group];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::User => "user",
            PrincipalKind::Role => "role",
            PrincipalKind::Group => "group",
        }
    }

    /// Name of the declaration field holding this kind ("users", "roles", "groups")
    pub fn plural(&self) -> &'static str {
        match self {
            PrincipalKind::User => "users",
            PrincipalKind::Role => "roles",
            PrincipalKind::Group => "groups",
        }
    }

    /// Longest name the identity service accepts for this kind
    pub fn max_name_len(&self) -> usize {
        match self {
            PrincipalKind::User | PrincipalKind::Role => 64,
            PrincipalKind::Group => 128,
        }
    }
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
