//! # policy-attach - Declarative IAM Policy Attachments
//!
//! `policy-attach` keeps a managed IAM policy attached to exactly the users,
//! roles, and groups you declare. It provides:
//!
//! - **Set reconciliation**: per principal kind, detach `prior - desired` and
//!   attach `desired - prior`, nothing else
//! - **Independent kinds**: a failing kind never blocks the other two; all
//!   failures come back together in one error
//! - **Plans and reports**: see the calls before issuing them, and see which
//!   ones landed afterwards
//! - **Injected clients**: every operation takes the remote client as an
//!   argument ([`InMemoryIdentityService`] for tests, `AwsIamClient` with the
//!   `aws` feature)
//!
//! ## Quick Start
//!
//! ```rust
//! use policy_attach::{reconcile, InMemoryIdentityService, MemberSet, PolicyAttachment, Result};
//!
//! # fn main() -> Result<()> {
//! let arn = "arn:aws:iam::123456789012:policy/deploy";
//! let desired = MemberSet::new().with_users(["alice"]).with_roles(["ci"]);
//!
//! let iam = InMemoryIdentityService::new()
//!     .with_policy(arn)
//!     .with_principals(&desired);
//! let attachment = PolicyAttachment::new("deploy", arn);
//!
//! // Attach to everything declared
//! reconcile::create(&iam, &attachment, &desired)?;
//!
//! // Move to a new membership with the minimal set of calls
//! let next = MemberSet::new().with_roles(["ci"]);
//! let report = reconcile::update(&iam, &attachment, &desired, &next)?;
//! assert_eq!(report.calls_issued(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Engine Integration
//!
//! ```rust
//! use policy_attach::{
//!     Declaration, InMemoryIdentityService, MemberSet, PolicyAttachment,
//!     PolicyAttachmentResource, ReconcilableResource, Result,
//! };
//!
//! # fn main() -> Result<()> {
//! let arn = "arn:aws:iam::123456789012:policy/deploy";
//! let declaration = Declaration::new(
//!     PolicyAttachment::new("deploy", arn),
//!     MemberSet::new().with_groups(["ops"]),
//! );
//! let iam = InMemoryIdentityService::new()
//!     .with_policy(arn)
//!     .with_principals(&declaration.members);
//!
//! let mut resource = PolicyAttachmentResource::new(declaration.attachment.clone());
//! resource.create(&iam, &declaration)?;
//! assert_eq!(resource.id(), Some("deploy"));
//!
//! resource.delete(&iam)?;
//! assert_eq!(resource.id(), None);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;

#[cfg(feature = "aws")]
pub mod aws;

pub use crate::core::{
    attachment::{MemberSet, PolicyAttachment},
    client::{IdentityClient, PolicyEntities, PolicyInfo, RemoteResult},
    config::Declaration,
    memory::{InMemoryIdentityService, RemoteCall},
    plan::{ApplyEntry, ApplyReport, Change, FailurePolicy, Operation, Outcome, Plan, RemoteOp},
    principal::PrincipalKind,
    reconcile,
    reconcile::{diff, ReadOutcome, SetDiff},
    resource::{PolicyAttachmentResource, ReconcilableResource, ResourceState},
    validation,
};
pub use crate::error::{AggregateError, AttachmentError, RemoteError, Result};

#[cfg(feature = "aws")]
pub use crate::aws::AwsIamClient;
