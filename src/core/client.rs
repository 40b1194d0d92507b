//! Remote identity service interface
//!
//! The reconciler never owns a connection. Every operation receives an
//! [`IdentityClient`] from its caller and issues blocking calls through it,
//! one at a time.

use super::principal::PrincipalKind;
use crate::error::RemoteError;
use serde::{Deserialize, Serialize};

/// Result of a single remote call
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Metadata returned by `GetPolicy`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyInfo {
    pub arn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_count: Option<u32>,
}

/// Principals a policy is currently attached to, as reported by
/// `ListEntitiesForPolicy`
///
/// Order carries no meaning and names may repeat across pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntities {
    pub users: Vec<String>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

/// Blocking client for the remote identity-management API
///
/// Implementations must return the service's own error for every failed
/// call; the reconciler inspects only [`RemoteError::is_not_found`].
pub trait IdentityClient {
    fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> RemoteResult<()>;
    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()>;
    fn attach_group_policy(&self, group_name: &str, policy_arn: &str) -> RemoteResult<()>;

    fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> RemoteResult<()>;
    fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()>;
    fn detach_group_policy(&self, group_name: &str, policy_arn: &str) -> RemoteResult<()>;

    /// Look up a managed policy; a missing policy is a not-found error
    fn get_policy(&self, policy_arn: &str) -> RemoteResult<PolicyInfo>;

    /// List every principal the policy is attached to
    fn list_entities_for_policy(&self, policy_arn: &str) -> RemoteResult<PolicyEntities>;

    /// Attach the policy to a principal of the given kind
    fn attach(&self, kind: PrincipalKind, principal: &str, policy_arn: &str) -> RemoteResult<()> {
        match kind {
            PrincipalKind::User => self.attach_user_policy(principal, policy_arn),
            PrincipalKind::Role => self.attach_role_policy(principal, policy_arn),
            PrincipalKind::Group => self.attach_group_policy(principal, policy_arn),
        }
    }

    /// Detach the policy from a principal of the given kind
    fn detach(&self, kind: PrincipalKind, principal: &str, policy_arn: &str) -> RemoteResult<()> {
        match kind {
            PrincipalKind::User => self.detach_user_policy(principal, policy_arn),
            PrincipalKind::Role => self.detach_role_policy(principal, policy_arn),
            PrincipalKind::Group => self.detach_group_policy(principal, policy_arn),
        }
    }
}

