//! Policy attachment data model
//!
//! A [`PolicyAttachment`] names one managed policy and the resource that owns
//! its attachments. A [`MemberSet`] holds the principals, split by kind, that
//! the policy is (or should be) attached to.

use super::client::PolicyEntities;
use super::principal::PrincipalKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identity of a policy attachment resource
///
/// Both fields are fixed for the lifetime of the resource; changing either
/// means destroying the attachment and creating a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyAttachment {
    /// Resource name, used as the local identity once created
    pub name: String,

    /// Opaque reference to the remote managed policy (an ARN for AWS)
    pub policy_arn: String,
}

impl PolicyAttachment {
    pub fn new(name: impl Into<String>, policy_arn: impl Into<String>) -> Self {
        PolicyAttachment {
            name: name.into(),
            policy_arn: policy_arn.into(),
        }
    }
}

/// Principals grouped by kind, each group a set of names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSet {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub users: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub roles: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub groups: BTreeSet<String>,
}

impl MemberSet {
    /// Create an empty member set
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper: add users
    pub fn with_users<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(PrincipalKind::User, names);
        self
    }

    /// Builder-style helper: add roles
    pub fn with_roles<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(PrincipalKind::Role, names);
        self
    }

    /// Builder-style helper: add groups
    pub fn with_groups<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend(PrincipalKind::Group, names);
        self
    }

    /// Names of one kind
    pub fn get(&self, kind: PrincipalKind) -> &BTreeSet<String> {
        match kind {
            PrincipalKind::User => &self.users,
            PrincipalKind::Role => &self.roles,
            PrincipalKind::Group => &self.groups,
        }
    }

    pub fn get_mut(&mut self, kind: PrincipalKind) -> &mut BTreeSet<String> {
        match kind {
            PrincipalKind::User => &mut self.users,
            PrincipalKind::Role => &mut self.roles,
            PrincipalKind::Group => &mut self.groups,
        }
    }

    /// Add one principal; returns false if it was already present
    pub fn insert(&mut self, kind: PrincipalKind, name: impl Into<String>) -> bool {
        self.get_mut(kind).insert(name.into())
    }

    pub fn remove(&mut self, kind: PrincipalKind, name: &str) -> bool {
        self.get_mut(kind).remove(name)
    }

    pub fn contains(&self, kind: PrincipalKind, name: &str) -> bool {
        self.get(kind).contains(name)
    }

    pub fn extend<I, S>(&mut self, kind: PrincipalKind, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_mut(kind).extend(names.into_iter().map(Into::into));
    }

    /// True when all three kinds are empty
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.roles.is_empty() && self.groups.is_empty()
    }

    /// Total number of principals across kinds
    pub fn len(&self) -> usize {
        self.users.len() + self.roles.len() + self.groups.len()
    }

    /// Iterate `(kind, name)` pairs in processing order
    pub fn iter(&self) -> impl Iterator<Item = (PrincipalKind, &str)> + '_ {
        PrincipalKind::ALL
            .into_iter()
            .flat_map(move |kind| self.get(kind).iter().map(move |name| (kind, name.as_str())))
    }

    pub fn clear(&mut self) {
        self.users.clear();
        self.roles.clear();
        self.groups.clear();
    }
}

impl From<PolicyEntities> for MemberSet {
    fn from(entities: PolicyEntities) -> Self {
        MemberSet {
            users: entities.users.into_iter().collect(),
            roles: entities.roles.into_iter().collect(),
            groups: entities.groups.into_iter().collect(),
        }
    }
}
