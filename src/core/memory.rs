//! In-memory identity service
//!
//! Behaves like the remote identity API for the calls the reconciler makes:
//! - principals and managed policies must exist before they can be attached
//! - attaching an already-attached policy succeeds without change
//! - detaching a policy that is not attached fails with `NoSuchEntity`
//!
//! Every call is journaled, and individual calls can be made to fail, so
//! tests can assert exactly which remote calls a reconciliation issued.

use super::attachment::MemberSet;
use super::client::{IdentityClient, PolicyEntities, PolicyInfo, RemoteResult};
use super::plan::Change;
use super::principal::PrincipalKind;
use crate::error::RemoteError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A call received by the service, in arrival order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RemoteCall {
    GetPolicy {
        policy_arn: String,
    },
    ListEntitiesForPolicy {
        policy_arn: String,
    },
    Attach {
        kind: PrincipalKind,
        principal: String,
        policy_arn: String,
    },
    Detach {
        kind: PrincipalKind,
        principal: String,
        policy_arn: String,
    },
}

impl RemoteCall {
    pub fn attach(kind: PrincipalKind, principal: &str, policy_arn: &str) -> Self {
        RemoteCall::Attach {
            kind,
            principal: principal.to_string(),
            policy_arn: policy_arn.to_string(),
        }
    }

    pub fn detach(kind: PrincipalKind, principal: &str, policy_arn: &str) -> Self {
        RemoteCall::Detach {
            kind,
            principal: principal.to_string(),
            policy_arn: policy_arn.to_string(),
        }
    }

    /// True for attach and detach calls
    pub fn is_mutation(&self) -> bool {
        matches!(self, RemoteCall::Attach { .. } | RemoteCall::Detach { .. })
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    /// Registered principals
    principals: MemberSet,
    /// Managed policies: arn -> principals attached
    policies: BTreeMap<String, MemberSet>,
    calls: Vec<RemoteCall>,
    failures: HashMap<RemoteCall, RemoteError>,
}

/// Thread-safe fake of the remote identity service
#[derive(Debug, Default)]
pub struct InMemoryIdentityService {
    state: Mutex<ServiceState>,
}

impl InMemoryIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper: register a managed policy
    pub fn with_policy(self, policy_arn: &str) -> Self {
        self.create_policy(policy_arn);
        self
    }

    /// Builder-style helper: register principals
    pub fn with_principals(self, members: &MemberSet) -> Self {
        {
            let mut state = self.state.lock();
            for (kind, name) in members.iter() {
                state.principals.insert(kind, name);
            }
        }
        self
    }

    pub fn create_principal(&self, kind: PrincipalKind, name: &str) {
        self.state.lock().principals.insert(kind, name);
    }

    /// Register a managed policy with no attachments (no-op if it exists)
    pub fn create_policy(&self, policy_arn: &str) {
        self.state
            .lock()
            .policies
            .entry(policy_arn.to_string())
            .or_default();
    }

    /// Remove a managed policy and all its attachments
    pub fn delete_policy(&self, policy_arn: &str) -> bool {
        self.state.lock().policies.remove(policy_arn).is_some()
    }

    /// Principals the policy is attached to, or `None` if the policy is unknown
    pub fn attached(&self, policy_arn: &str) -> Option<MemberSet> {
        self.state.lock().policies.get(policy_arn).cloned()
    }

    /// Attach out-of-band, without journaling the call
    pub fn seed_attachment(&self, kind: PrincipalKind, principal: &str, policy_arn: &str) {
        let mut state = self.state.lock();
        state.principals.insert(kind, principal);
        state
            .policies
            .entry(policy_arn.to_string())
            .or_default()
            .insert(kind, principal);
    }

    /// Make every future occurrence of `call` fail with `error`
    pub fn fail_on(&self, call: RemoteCall, error: RemoteError) {
        self.state.lock().failures.insert(call, error);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Attach and detach calls received so far
    pub fn mutations(&self) -> Vec<RemoteCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Journal the call and return its injected failure, if any
    fn receive(state: &mut ServiceState, call: RemoteCall) -> RemoteResult<()> {
        debug!("identity service received {:?}", call);
        let injected = state.failures.get(&call).cloned();
        state.calls.push(call);
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn change(&self, change: Change, kind: PrincipalKind, principal: &str, policy_arn: &str) -> RemoteResult<()> {
        let mut state = self.state.lock();
        let call = match change {
            Change::Attach => RemoteCall::attach(kind, principal, policy_arn),
            Change::Detach => RemoteCall::detach(kind, principal, policy_arn),
        };
        Self::receive(&mut state, call)?;

        if !state.principals.contains(kind, principal) {
            return Err(RemoteError::no_such_entity(format!(
                "The {} with name {} cannot be found.",
                kind, principal
            )));
        }

        let attached = state.policies.get_mut(policy_arn).ok_or_else(|| {
            RemoteError::no_such_entity(format!("Policy {} does not exist or is not attachable.", policy_arn))
        })?;

        match change {
            Change::Attach => {
                attached.insert(kind, principal);
            }
            Change::Detach => {
                if !attached.remove(kind, principal) {
                    return Err(RemoteError::no_such_entity(format!(
                        "Policy {} was not found.",
                        policy_arn
                    )));
                }
            }
        }

        Ok(())
    }
}

impl IdentityClient for InMemoryIdentityService {
    fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> RemoteResult<()> {
        self.change(Change::Attach, PrincipalKind::User, user_name, policy_arn)
    }

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        self.change(Change::Attach, PrincipalKind::Role, role_name, policy_arn)
    }

    fn attach_group_policy(&self, group_name: &str, policy_arn: &str) -> RemoteResult<()> {
        self.change(Change::Attach, PrincipalKind::Group, group_name, policy_arn)
    }

    fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> RemoteResult<()> {
        self.change(Change::Detach, PrincipalKind::User, user_name, policy_arn)
    }

    fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        self.change(Change::Detach, PrincipalKind::Role, role_name, policy_arn)
    }

    fn detach_group_policy(&self, group_name: &str, policy_arn: &str) -> RemoteResult<()> {
        self.change(Change::Detach, PrincipalKind::Group, group_name, policy_arn)
    }

    fn get_policy(&self, policy_arn: &str) -> RemoteResult<PolicyInfo> {
        let mut state = self.state.lock();
        Self::receive(
            &mut state,
            RemoteCall::GetPolicy {
                policy_arn: policy_arn.to_string(),
            },
        )?;

        let attached = state.policies.get(policy_arn).ok_or_else(|| {
            RemoteError::no_such_entity(format!("Policy {} does not exist.", policy_arn))
        })?;

        Ok(PolicyInfo {
            arn: policy_arn.to_string(),
            policy_name: policy_arn.rsplit('/').next().map(str::to_string),
            attachment_count: Some(attached.len() as u32),
        })
    }

    fn list_entities_for_policy(&self, policy_arn: &str) -> RemoteResult<PolicyEntities> {
        let mut state = self.state.lock();
        Self::receive(
            &mut state,
            RemoteCall::ListEntitiesForPolicy {
                policy_arn: policy_arn.to_string(),
            },
        )?;

        let attached = state.policies.get(policy_arn).ok_or_else(|| {
            RemoteError::no_such_entity(format!("Policy {} does not exist.", policy_arn))
        })?;

        Ok(PolicyEntities {
            users: attached.users.iter().cloned().collect(),
            roles: attached.roles.iter().cloned().collect(),
            groups: attached.groups.iter().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARN: &str = "arn:aws:iam::123456789012:policy/test";

    #[test]
    fn test_attach_requires_principal_and_policy() {
        let service = InMemoryIdentityService::new().with_policy(ARN);

        let err = service.attach_user_policy("ghost", ARN).unwrap_err();
        assert!(err.is_not_found());

        service.create_principal(PrincipalKind::User, "alice");
        service.attach_user_policy("alice", ARN).unwrap();

        let err = service.attach_user_policy("alice", "arn:aws:iam::123456789012:policy/missing").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let service = InMemoryIdentityService::new()
            .with_policy(ARN)
            .with_principals(&MemberSet::new().with_roles(["deploy"]));

        service.attach_role_policy("deploy", ARN).unwrap();
        service.attach_role_policy("deploy", ARN).unwrap();

        assert_eq!(service.attached(ARN).unwrap(), MemberSet::new().with_roles(["deploy"]));
    }

    #[test]
    fn test_detach_unattached_fails() {
        let service = InMemoryIdentityService::new()
            .with_policy(ARN)
            .with_principals(&MemberSet::new().with_groups(["ops"]));

        let err = service.detach_group_policy("ops", ARN).unwrap_err();
        assert_eq!(err.code, "NoSuchEntity");
    }

    #[test]
    fn test_calls_are_journaled_in_order() {
        let service = InMemoryIdentityService::new().with_policy(ARN);
        service.seed_attachment(PrincipalKind::User, "alice", ARN);

        service.get_policy(ARN).unwrap();
        service.list_entities_for_policy(ARN).unwrap();
        service.detach_user_policy("alice", ARN).unwrap();

        assert_eq!(
            service.calls(),
            vec![
                RemoteCall::GetPolicy { policy_arn: ARN.to_string() },
                RemoteCall::ListEntitiesForPolicy { policy_arn: ARN.to_string() },
                RemoteCall::detach(PrincipalKind::User, "alice", ARN),
            ]
        );
        assert_eq!(service.mutations().len(), 1);

        service.clear_calls();
        assert!(service.calls().is_empty());
    }

    #[test]
    fn test_injected_failure() {
        let service = InMemoryIdentityService::new().with_policy(ARN);
        service.seed_attachment(PrincipalKind::User, "alice", ARN);
        service.fail_on(
            RemoteCall::detach(PrincipalKind::User, "alice", ARN),
            RemoteError::new("ServiceFailure", "boom"),
        );

        let err = service.detach_user_policy("alice", ARN).unwrap_err();
        assert_eq!(err.code, "ServiceFailure");
        // Injected failures leave state untouched
        assert!(service.attached(ARN).unwrap().contains(PrincipalKind::User, "alice"));

        service.clear_failures();
        service.detach_user_policy("alice", ARN).unwrap();
        assert!(service.attached(ARN).unwrap().is_empty());
    }

    #[test]
    fn test_deleted_policy_not_found() {
        let service = InMemoryIdentityService::new().with_policy(ARN);
        assert!(service.delete_policy(ARN));

        let err = service.get_policy(ARN).unwrap_err();
        assert!(err.is_not_found());
        assert!(service.attached(ARN).is_none());
    }
}
