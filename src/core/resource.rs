//! Lifecycle entry points for a host engine
//!
//! A declarative engine drives resources through four verbs. It owns the
//! persisted [`ResourceState`] and hands in the remote client on every call;
//! the resource never holds on to a connection.

use super::attachment::{MemberSet, PolicyAttachment};
use super::client::IdentityClient;
use super::config::Declaration;
use super::plan::ApplyReport;
use super::reconcile::{self, ReadOutcome};
use crate::error::{AttachmentError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Create/read/update/delete capability driven by an external engine
pub trait ReconcilableResource {
    /// Declared configuration for the resource
    type Desired;

    /// Local identity, `None` until created (or after the remote side vanished)
    fn id(&self) -> Option<&str>;

    fn create(&mut self, client: &dyn IdentityClient, desired: &Self::Desired) -> Result<()>;

    fn read(&mut self, client: &dyn IdentityClient) -> Result<()>;

    fn update(&mut self, client: &dyn IdentityClient, desired: &Self::Desired) -> Result<()>;

    fn delete(&mut self, client: &dyn IdentityClient) -> Result<()>;
}

/// Persisted state of one policy attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Local identity; set to the attachment name on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub attachment: PolicyAttachment,

    /// Membership observed by the last read
    #[serde(default)]
    pub members: MemberSet,
}

impl ResourceState {
    /// State for an attachment that has not been created yet
    pub fn new(attachment: PolicyAttachment) -> Self {
        ResourceState {
            id: None,
            attachment,
            members: MemberSet::new(),
        }
    }

    pub fn exists(&self) -> bool {
        self.id.is_some()
    }
}

/// [`ReconcilableResource`] for a managed-policy attachment
#[derive(Debug, Clone)]
pub struct PolicyAttachmentResource {
    state: ResourceState,
    last_report: Option<ApplyReport>,
}

impl PolicyAttachmentResource {
    /// Resource with no recorded state
    pub fn new(attachment: PolicyAttachment) -> Self {
        Self::from_state(ResourceState::new(attachment))
    }

    /// Resume from persisted state
    pub fn from_state(state: ResourceState) -> Self {
        PolicyAttachmentResource {
            state,
            last_report: None,
        }
    }

    pub fn state(&self) -> &ResourceState {
        &self.state
    }

    pub fn into_state(self) -> ResourceState {
        self.state
    }

    /// Report of the last successful create, update, or delete
    pub fn last_report(&self) -> Option<&ApplyReport> {
        self.last_report.as_ref()
    }

    /// Name and policy cannot change in place
    fn check_replacement(&self, desired: &Declaration) -> Result<()> {
        let current = &self.state.attachment;
        if current.name != desired.attachment.name {
            return Err(AttachmentError::Validation(format!(
                "changing name from '{}' to '{}' requires replacing the attachment",
                current.name, desired.attachment.name
            )));
        }
        if current.policy_arn != desired.attachment.policy_arn {
            return Err(AttachmentError::Validation(format!(
                "changing policy_arn of '{}' requires replacing the attachment",
                current.name
            )));
        }
        Ok(())
    }
}

impl ReconcilableResource for PolicyAttachmentResource {
    type Desired = Declaration;

    fn id(&self) -> Option<&str> {
        self.state.id.as_deref()
    }

    fn create(&mut self, client: &dyn IdentityClient, desired: &Declaration) -> Result<()> {
        let report = reconcile::create(client, &desired.attachment, &desired.members)?;

        self.state.attachment = desired.attachment.clone();
        self.state.id = Some(desired.attachment.name.clone());
        self.last_report = Some(report);

        self.read(client)
    }

    fn read(&mut self, client: &dyn IdentityClient) -> Result<()> {
        match reconcile::read(client, &self.state.attachment)? {
            ReadOutcome::Found(members) => {
                debug!(
                    "Observed {} principals on '{}'",
                    members.len(),
                    self.state.attachment.name
                );
                self.state.members = members;
            }
            ReadOutcome::NotFound => {
                info!(
                    "Dropping policy attachment '{}' from state",
                    self.state.attachment.name
                );
                self.state.id = None;
                self.state.members.clear();
            }
        }
        Ok(())
    }

    fn update(&mut self, client: &dyn IdentityClient, desired: &Declaration) -> Result<()> {
        if !self.state.exists() {
            return Err(AttachmentError::Validation(format!(
                "policy attachment '{}' has not been created",
                self.state.attachment.name
            )));
        }
        self.check_replacement(desired)?;

        let report = reconcile::update(
            client,
            &self.state.attachment,
            &self.state.members,
            &desired.members,
        )?;
        self.last_report = Some(report);

        self.read(client)
    }

    fn delete(&mut self, client: &dyn IdentityClient) -> Result<()> {
        let report = reconcile::delete(client, &self.state.attachment, &self.state.members)?;

        self.state.id = None;
        self.state.members.clear();
        self.last_report = Some(report);
        Ok(())
    }
}
