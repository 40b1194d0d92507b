//! Declaration and state files
//!
//! A declaration is what the user wants, written as TOML:
//!
//! ```toml
//! name = "ops-readonly"
//! policy_arn = "arn:aws:iam::aws:policy/ReadOnlyAccess"
//! users = ["alice", "bob"]
//! groups = ["ops"]
//! ```
//!
//! State is what was last observed, stored as JSON next to it.

use super::attachment::{MemberSet, PolicyAttachment};
use super::resource::ResourceState;
use super::validation::{validate_attachment, validate_members};
use crate::error::{AttachmentError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Desired state of one policy attachment
///
/// Unknown keys are rejected: a misspelled `user = [...]` must not read as
/// "no users declared".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DeclarationFile", into = "DeclarationFile")]
pub struct Declaration {
    pub attachment: PolicyAttachment,
    pub members: MemberSet,
}

/// On-disk shape of a declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarationFile {
    name: String,
    policy_arn: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    users: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    roles: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    groups: BTreeSet<String>,
}

impl From<DeclarationFile> for Declaration {
    fn from(file: DeclarationFile) -> Self {
        Declaration {
            attachment: PolicyAttachment::new(file.name, file.policy_arn),
            members: MemberSet {
                users: file.users,
                roles: file.roles,
                groups: file.groups,
            },
        }
    }
}

impl From<Declaration> for DeclarationFile {
    fn from(decl: Declaration) -> Self {
        DeclarationFile {
            name: decl.attachment.name,
            policy_arn: decl.attachment.policy_arn,
            users: decl.members.users,
            roles: decl.members.roles,
            groups: decl.members.groups,
        }
    }
}

impl Declaration {
    pub fn new(attachment: PolicyAttachment, members: MemberSet) -> Self {
        Declaration {
            attachment,
            members,
        }
    }

    /// Parse and validate a TOML declaration
    ///
    /// Repeated principal names collapse into one.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let declaration: Declaration = toml::from_str(input)?;
        declaration.validate()?;
        Ok(declaration)
    }

    /// Load a TOML declaration from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading declaration from {:?}", path);
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| AttachmentError::Config(e.to_string()))
    }

    /// Check name, policy, and principal names
    ///
    /// An empty member set is allowed here; it is rejected when creating.
    pub fn validate(&self) -> Result<()> {
        validate_attachment(&self.attachment)?;
        validate_members(&self.members)
    }
}

impl ResourceState {
    /// Load a JSON state snapshot
    ///
    /// A missing file means the attachment has never been created.
    pub fn load_or_new<P: AsRef<Path>>(path: P, attachment: &PolicyAttachment) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No state at {:?}, starting fresh", path);
            return Ok(ResourceState::new(attachment.clone()));
        }
        Self::load(path)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the snapshot, replacing any previous one
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!("Saved state to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::principal::PrincipalKind;

    #[test]
    fn test_parse_declaration() {
        let decl = Declaration::from_toml_str(
            r#"
            name = "ops-readonly"
            policy_arn = "arn:aws:iam::aws:policy/ReadOnlyAccess"
            users = ["alice", "bob", "alice"]
            groups = ["ops"]
            "#,
        )
        .unwrap();

        assert_eq!(decl.attachment.name, "ops-readonly");
        assert_eq!(decl.members.users.len(), 2);
        assert!(decl.members.roles.is_empty());
        assert!(decl.members.contains(PrincipalKind::Group, "ops"));
    }

    #[test]
    fn test_missing_policy_arn() {
        let err = Declaration::from_toml_str(r#"name = "x""#).unwrap_err();
        assert!(matches!(err, AttachmentError::Toml(_)));
    }

    #[test]
    fn test_invalid_principal_rejected() {
        let err = Declaration::from_toml_str(
            r#"
            name = "x"
            policy_arn = "arn:aws:iam::aws:policy/ReadOnlyAccess"
            roles = ["not a role"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, AttachmentError::Validation(_)));
    }

    #[test]
    fn test_misspelled_kind_rejected() {
        let err = Declaration::from_toml_str(
            r#"
            name = "ops-readonly"
            policy_arn = "arn:aws:iam::aws:policy/ReadOnlyAccess"
            user = ["alice"]
            groups = ["ops"]
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, AttachmentError::Toml(_)));
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let decl = Declaration::new(
            PolicyAttachment::new("deploy", "arn:aws:iam::123456789012:policy/deploy"),
            MemberSet::new().with_roles(["ci", "cd"]),
        );

        let text = decl.to_toml_string().unwrap();
        assert_eq!(Declaration::from_toml_str(&text).unwrap(), decl);
    }
}
