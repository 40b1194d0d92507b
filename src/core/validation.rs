//! Validation for attachment declarations
//!
//! Everything here runs before the first remote call, so a rejected
//! declaration never leaves the remote side half-changed.

use super::attachment::{MemberSet, PolicyAttachment};
use super::principal::PrincipalKind;
use crate::error::{AttachmentError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Characters the identity service accepts in user, role, and group names
const PRINCIPAL_NAME_PATTERN: &str = r"^[A-Za-z0-9+=,.@_-]+$";

static PRINCIPAL_NAME: OnceLock<Regex> = OnceLock::new();

/// Maximum attachment name length
const MAX_ATTACHMENT_NAME: usize = 128;

/// Validate the immutable identity of an attachment
///
/// # Rules
/// - name: 1-128 characters, no whitespace or control characters
/// - policy_arn: non-empty, otherwise opaque
///
/// # Examples
///
/// ```
/// use policy_attach::{validation, PolicyAttachment};
///
/// let ok = PolicyAttachment::new("ops-readonly", "arn:aws:iam::aws:policy/ReadOnlyAccess");
/// assert!(validation::validate_attachment(&ok).is_ok());
///
/// let bad = PolicyAttachment::new("ops readonly", "arn:aws:iam::aws:policy/ReadOnlyAccess");
/// assert!(validation::validate_attachment(&bad).is_err());
/// ```
pub fn validate_attachment(attachment: &PolicyAttachment) -> Result<()> {
    let name = attachment.name.as_str();
    if name.is_empty() {
        return Err(AttachmentError::Validation(
            "attachment name cannot be empty".to_string(),
        ));
    }

    if name.chars().count() > MAX_ATTACHMENT_NAME {
        return Err(AttachmentError::Validation(format!(
            "attachment name too long (max {} characters)",
            MAX_ATTACHMENT_NAME
        )));
    }

    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AttachmentError::Validation(format!(
            "attachment name '{}' cannot contain whitespace",
            name
        )));
    }

    if attachment.policy_arn.trim().is_empty() {
        return Err(AttachmentError::Validation(format!(
            "policy_arn cannot be empty for {}",
            name
        )));
    }

    Ok(())
}

/// Validate a single principal name for its kind
pub fn validate_principal(kind: PrincipalKind, name: &str) -> Result<()> {
    check_principal(principal_regex(), kind, name)
}

/// Validate every principal in a member set
pub fn validate_members(members: &MemberSet) -> Result<()> {
    let re = principal_regex();
    for (kind, name) in members.iter() {
        check_principal(re, kind, name)?;
    }
    Ok(())
}

/// Reject a declaration that names no principals at all
pub fn require_principals(attachment: &PolicyAttachment, members: &MemberSet) -> Result<()> {
    if members.is_empty() {
        return Err(AttachmentError::Validation(format!(
            "no users, roles, or groups specified for {}",
            attachment.name
        )));
    }
    Ok(())
}

/// Compiled once per process
fn principal_regex() -> &'static Regex {
    PRINCIPAL_NAME.get_or_init(|| {
        Regex::new(PRINCIPAL_NAME_PATTERN).expect("principal name pattern is a valid regex")
    })
}

fn check_principal(re: &Regex, kind: PrincipalKind, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(AttachmentError::Validation(format!(
            "{} name cannot be empty",
            kind
        )));
    }

    if name.len() > kind.max_name_len() {
        return Err(AttachmentError::Validation(format!(
            "{} name '{}' too long (max {} characters)",
            kind,
            name,
            kind.max_name_len()
        )));
    }

    if !re.is_match(name) {
        return Err(AttachmentError::Validation(format!(
            "{} name '{}' may only contain letters, digits, and +=,.@_-",
            kind, name
        )));
    }

    Ok(())
}
