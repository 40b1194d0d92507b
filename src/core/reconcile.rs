//! Membership reconciliation
//!
//! The four lifecycle operations of a policy attachment. Each one is a
//! one-shot, blocking run against the client it is handed:
//!
//! - `create`: attach the policy to every declared principal
//! - `read`: observe which principals the policy is attached to
//! - `update`: detach `prior - desired`, then attach `desired - prior`, per kind
//! - `delete`: detach the policy from every recorded principal
//!
//! Principal kinds are independent. A failure in one kind is recorded and the
//! remaining kinds still run; all failures are reported together as an
//! [`AggregateError`](crate::error::AggregateError). Nothing is rolled back.

use super::attachment::{MemberSet, PolicyAttachment};
use super::client::IdentityClient;
use super::plan::{ApplyReport, FailurePolicy, Operation, Plan};
use super::validation::{require_principals, validate_attachment, validate_members};
use crate::error::Result;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Difference between a prior and a desired set of names
///
/// `remove` and `add` are disjoint; names in both sets (or in neither) appear
/// in neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDiff {
    /// In prior but not desired
    pub remove: BTreeSet<String>,
    /// In desired but not prior
    pub add: BTreeSet<String>,
}

impl SetDiff {
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }

    /// Membership after applying this diff to `prior`
    pub fn apply_to(&self, prior: &BTreeSet<String>) -> BTreeSet<String> {
        prior
            .difference(&self.remove)
            .chain(self.add.iter())
            .cloned()
            .collect()
    }
}

/// Compute `remove = prior \ desired` and `add = desired \ prior`
pub fn diff(prior: &BTreeSet<String>, desired: &BTreeSet<String>) -> SetDiff {
    SetDiff {
        remove: prior.difference(desired).cloned().collect(),
        add: desired.difference(prior).cloned().collect(),
    }
}

/// What a read found on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The policy exists and is attached to these principals
    Found(MemberSet),
    /// The policy no longer exists; the caller should drop its local identity
    NotFound,
}

/// Attach the policy to every declared principal
///
/// Fails with a validation error, before any remote call, when no principal
/// is declared. Within a kind the first failing call stops that kind.
pub fn create<C>(client: &C, attachment: &PolicyAttachment, desired: &MemberSet) -> Result<ApplyReport>
where
    C: IdentityClient + ?Sized,
{
    validate_attachment(attachment)?;
    require_principals(attachment, desired)?;
    validate_members(desired)?;

    info!(
        "Creating policy attachment '{}' for {} ({} principals)",
        attachment.name,
        attachment.policy_arn,
        desired.len()
    );

    let plan = Plan::attach_all(desired);
    let report = plan
        .execute(client, &attachment.policy_arn, FailurePolicy::StopKind)
        .into_result(&attachment.name, Operation::Create)?;

    info!("Created policy attachment '{}'", attachment.name);
    Ok(report)
}

/// Observe the principals the policy is currently attached to
///
/// A missing policy is not an error: it yields [`ReadOutcome::NotFound`]
/// without listing entities. Every other remote error is returned unchanged.
pub fn read<C>(client: &C, attachment: &PolicyAttachment) -> Result<ReadOutcome>
where
    C: IdentityClient + ?Sized,
{
    match client.get_policy(&attachment.policy_arn) {
        Ok(_) => {}
        Err(err) if err.is_not_found() => {
            warn!(
                "Policy {} for attachment '{}' no longer exists",
                attachment.policy_arn, attachment.name
            );
            return Ok(ReadOutcome::NotFound);
        }
        Err(err) => return Err(err.into()),
    }

    let entities = client.list_entities_for_policy(&attachment.policy_arn)?;
    Ok(ReadOutcome::Found(MemberSet::from(entities)))
}

/// The calls [`update`] would issue, without issuing them
pub fn plan(prior: &MemberSet, desired: &MemberSet) -> Plan {
    Plan::update(prior, desired)
}

/// Move the attachment from `prior` to `desired` membership
///
/// Per kind: detach everything no longer desired, then attach everything
/// new. Unchanged kinds issue no calls. Within a kind the first failing call
/// stops that kind.
pub fn update<C>(
    client: &C,
    attachment: &PolicyAttachment,
    prior: &MemberSet,
    desired: &MemberSet,
) -> Result<ApplyReport>
where
    C: IdentityClient + ?Sized,
{
    validate_members(desired)?;

    let changes = plan(prior, desired);
    if changes.is_empty() {
        info!("Policy attachment '{}' is up to date", attachment.name);
        return Ok(ApplyReport::default());
    }

    info!(
        "Updating policy attachment '{}' ({} changes)",
        attachment.name,
        changes.len()
    );

    changes
        .execute(client, &attachment.policy_arn, FailurePolicy::StopKind)
        .into_result(&attachment.name, Operation::Update)
}

/// Detach the policy from every recorded principal
///
/// Best-effort within each kind: a failing detach does not stop the rest of
/// that kind. Errors are not special-cased, an already-detached principal
/// fails like any other remote error.
pub fn delete<C>(client: &C, attachment: &PolicyAttachment, members: &MemberSet) -> Result<ApplyReport>
where
    C: IdentityClient + ?Sized,
{
    info!(
        "Deleting policy attachment '{}' ({} principals)",
        attachment.name,
        members.len()
    );

    Plan::detach_all(members)
        .execute(client, &attachment.policy_arn, FailurePolicy::ContinueKind)
        .into_result(&attachment.name, Operation::Delete)
}
