//! Remote operation plans and apply reports
//!
//! A [`Plan`] is the ordered list of attach/detach calls a lifecycle
//! operation will issue. Executing it yields an [`ApplyReport`] with one
//! entry per planned call, so a caller can tell exactly which calls landed
//! when a run fails part-way.

use super::attachment::MemberSet;
use super::client::IdentityClient;
use super::principal::PrincipalKind;
use super::reconcile::diff;
use crate::error::{AggregateError, AttachmentError, RemoteError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle operation that produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    /// Present participle used in error messages
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Create => "attaching",
            Operation::Update => "updating",
            Operation::Delete => "detaching",
        }
    }
}

/// Direction of a single remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Attach,
    Detach,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Attach => f.write_str("attach"),
            Change::Detach => f.write_str("detach"),
        }
    }
}

/// One attach or detach call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOp {
    pub change: Change,
    pub kind: PrincipalKind,
    pub principal: String,
}

impl RemoteOp {
    pub fn attach(kind: PrincipalKind, principal: impl Into<String>) -> Self {
        RemoteOp {
            change: Change::Attach,
            kind,
            principal: principal.into(),
        }
    }

    pub fn detach(kind: PrincipalKind, principal: impl Into<String>) -> Self {
        RemoteOp {
            change: Change::Detach,
            kind,
            principal: principal.into(),
        }
    }

    /// Issue this call against the remote service
    pub fn issue<C>(&self, client: &C, policy_arn: &str) -> std::result::Result<(), RemoteError>
    where
        C: IdentityClient + ?Sized,
    {
        match self.change {
            Change::Attach => client.attach(self.kind, &self.principal, policy_arn),
            Change::Detach => client.detach(self.kind, &self.principal, policy_arn),
        }
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.change {
            Change::Attach => '+',
            Change::Detach => '-',
        };
        write!(f, "{} {} {} {}", sign, self.change, self.kind, self.principal)
    }
}

/// What to do with the rest of a kind once one of its calls fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Skip the remaining calls of the failing kind
    StopKind,
    /// Keep going through the failing kind
    ContinueKind,
}

/// Ordered remote calls, grouped by principal kind
///
/// Kinds appear in [`PrincipalKind::ALL`] order; within a kind every detach
/// precedes every attach.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    ops: Vec<RemoteOp>,
}

impl Plan {
    /// Attach the policy to every member (create)
    pub fn attach_all(members: &MemberSet) -> Self {
        Plan {
            ops: members
                .iter()
                .map(|(kind, name)| RemoteOp::attach(kind, name))
                .collect(),
        }
    }

    /// Detach the policy from every member (delete)
    pub fn detach_all(members: &MemberSet) -> Self {
        Plan {
            ops: members
                .iter()
                .map(|(kind, name)| RemoteOp::detach(kind, name))
                .collect(),
        }
    }

    /// Minimal calls that move `prior` membership to `desired` (update)
    ///
    /// Kinds whose sets are equal contribute nothing.
    pub fn update(prior: &MemberSet, desired: &MemberSet) -> Self {
        let mut ops = Vec::new();
        for kind in PrincipalKind::ALL {
            let delta = diff(prior.get(kind), desired.get(kind));
            ops.extend(delta.remove.into_iter().map(|name| RemoteOp::detach(kind, name)));
            ops.extend(delta.add.into_iter().map(|name| RemoteOp::attach(kind, name)));
        }
        Plan { ops }
    }

    pub fn ops(&self) -> &[RemoteOp] {
        &self.ops
    }

    /// Calls for a single kind, in issue order
    pub fn ops_for(&self, kind: PrincipalKind) -> impl Iterator<Item = &RemoteOp> + '_ {
        self.ops.iter().filter(move |op| op.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Issue every call, one at a time, and collect per-kind failures
    ///
    /// A failure in one kind never prevents the other kinds from running.
    pub fn execute<C>(&self, client: &C, policy_arn: &str, on_failure: FailurePolicy) -> Execution
    where
        C: IdentityClient + ?Sized,
    {
        let mut execution = Execution::default();

        for kind in PrincipalKind::ALL {
            let mut failed = false;
            for op in self.ops_for(kind) {
                if failed && on_failure == FailurePolicy::StopKind {
                    execution.report.record(op.clone(), Outcome::Skipped);
                    continue;
                }

                debug!("{} ({})", op, policy_arn);
                match op.issue(client, policy_arn) {
                    Ok(()) => execution.report.record(op.clone(), Outcome::Applied),
                    Err(err) => {
                        warn!("Failed to {} {} {}: {}", op.change, kind, op.principal, err);
                        execution.set_error(kind, err.clone());
                        execution.report.record(op.clone(), Outcome::Failed(err));
                        failed = true;
                    }
                }
            }
        }

        execution
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return write!(f, "No changes.");
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", op)?;
        }
        Ok(())
    }
}

/// Outcome of one planned call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "lowercase")]
pub enum Outcome {
    /// The remote service accepted the call
    Applied,
    /// The remote service rejected the call
    Failed(RemoteError),
    /// Never issued, because an earlier call of the same kind failed
    Skipped,
}

/// A planned call and what happened to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyEntry {
    #[serde(flatten)]
    pub op: RemoteOp,
    pub outcome: Outcome,
    pub at: DateTime<Utc>,
}

/// Journal of one plan execution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub entries: Vec<ApplyEntry>,
}

impl ApplyReport {
    fn record(&mut self, op: RemoteOp, outcome: Outcome) {
        self.entries.push(ApplyEntry {
            op,
            outcome,
            at: Utc::now(),
        });
    }

    /// Calls the remote service accepted
    pub fn applied(&self) -> impl Iterator<Item = &RemoteOp> + '_ {
        self.with_outcome(|o| matches!(o, Outcome::Applied))
    }

    /// Calls the remote service rejected
    pub fn failed(&self) -> impl Iterator<Item = &RemoteOp> + '_ {
        self.with_outcome(|o| matches!(o, Outcome::Failed(_)))
    }

    /// Calls never issued
    pub fn skipped(&self) -> impl Iterator<Item = &RemoteOp> + '_ {
        self.with_outcome(|o| matches!(o, Outcome::Skipped))
    }

    /// Number of calls actually sent to the remote service
    pub fn calls_issued(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !matches!(e.outcome, Outcome::Skipped))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn with_outcome<F>(&self, pred: F) -> impl Iterator<Item = &RemoteOp> + '_
    where
        F: Fn(&Outcome) -> bool + 'static,
    {
        self.entries
            .iter()
            .filter(move |e| pred(&e.outcome))
            .map(|e| &e.op)
    }
}

/// Result of [`Plan::execute`] before it is turned into a `Result`
#[derive(Debug, Default)]
pub struct Execution {
    pub report: ApplyReport,
    users: Option<RemoteError>,
    roles: Option<RemoteError>,
    groups: Option<RemoteError>,
}

impl Execution {
    /// Keep only the first failure per kind
    fn set_error(&mut self, kind: PrincipalKind, err: RemoteError) {
        let slot = match kind {
            PrincipalKind::User => &mut self.users,
            PrincipalKind::Role => &mut self.roles,
            PrincipalKind::Group => &mut self.groups,
        };
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.users.is_some() || self.roles.is_some() || self.groups.is_some()
    }

    /// `Ok(report)` if every kind succeeded, otherwise an aggregate error
    pub fn into_result(self, attachment: &str, operation: Operation) -> Result<ApplyReport> {
        if !self.has_errors() {
            return Ok(self.report);
        }

        Err(AttachmentError::Aggregate(AggregateError {
            attachment: attachment.to_string(),
            operation,
            users: self.users,
            roles: self.roles,
            groups: self.groups,
            report: self.report,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_all_orders_by_kind() {
        let members = MemberSet::new()
            .with_groups(["g1"])
            .with_users(["u2", "u1"])
            .with_roles(["r1"]);

        let plan = Plan::attach_all(&members);
        assert_eq!(
            plan.ops(),
            &[
                RemoteOp::attach(PrincipalKind::User, "u1"),
                RemoteOp::attach(PrincipalKind::User, "u2"),
                RemoteOp::attach(PrincipalKind::Role, "r1"),
                RemoteOp::attach(PrincipalKind::Group, "g1"),
            ]
        );
    }

    #[test]
    fn test_update_detaches_before_attaching() {
        let prior = MemberSet::new().with_roles(["r1", "r2"]);
        let desired = MemberSet::new().with_roles(["r2", "r3"]);

        let plan = Plan::update(&prior, &desired);
        assert_eq!(
            plan.ops(),
            &[
                RemoteOp::detach(PrincipalKind::Role, "r1"),
                RemoteOp::attach(PrincipalKind::Role, "r3"),
            ]
        );
    }

    #[test]
    fn test_update_unchanged_is_empty() {
        let members = MemberSet::new().with_users(["alice"]).with_groups(["ops"]);
        let plan = Plan::update(&members, &members);
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes.");
    }

    #[test]
    fn test_plan_display() {
        let plan = Plan::update(
            &MemberSet::new().with_users(["old"]),
            &MemberSet::new().with_users(["new"]),
        );
        assert_eq!(plan.to_string(), "- detach user old\n+ attach user new");
    }

    #[test]
    fn test_ops_for_kind() {
        let plan = Plan::detach_all(&MemberSet::new().with_users(["a", "b"]).with_groups(["g"]));
        assert_eq!(plan.ops_for(PrincipalKind::User).count(), 2);
        assert_eq!(plan.ops_for(PrincipalKind::Role).count(), 0);
        assert_eq!(plan.ops_for(PrincipalKind::Group).count(), 1);
        assert_eq!(plan.len(), 3);
    }

    #[test]
    fn test_execution_without_errors_is_ok() {
        let execution = Execution::default();
        let report = execution.into_result("x", Operation::Create).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn test_execution_keeps_first_error_per_kind() {
        let mut execution = Execution::default();
        execution.set_error(PrincipalKind::Role, RemoteError::new("First", "one"));
        execution.set_error(PrincipalKind::Role, RemoteError::new("Second", "two"));

        let err = execution.into_result("x", Operation::Update).unwrap_err();
        let agg = err.as_aggregate().unwrap();
        assert_eq!(agg.roles.as_ref().unwrap().code, "First");
        assert!(agg.users.is_none());
        assert!(agg.groups.is_none());
    }

    #[test]
    fn test_report_serializes_outcome() {
        let mut report = ApplyReport::default();
        report.record(RemoteOp::attach(PrincipalKind::User, "alice"), Outcome::Applied);
        report.record(
            RemoteOp::attach(PrincipalKind::User, "bob"),
            Outcome::Failed(RemoteError::no_such_entity("no user bob")),
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"][0]["outcome"]["status"], "applied");
        assert_eq!(json["entries"][0]["principal"], "alice");
        assert_eq!(json["entries"][0]["change"], "attach");
        assert_eq!(json["entries"][1]["outcome"]["status"], "failed");
        assert_eq!(json["entries"][1]["outcome"]["error"]["code"], "NoSuchEntity");
        assert_eq!(report.calls_issued(), 2);
        assert_eq!(report.failed().count(), 1);
    }
}
