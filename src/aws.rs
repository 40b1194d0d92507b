//! AWS IAM adapter
//!
//! Implements [`IdentityClient`] on `aws-sdk-iam`. The SDK is async; the
//! reconciler is not, so each call is driven to completion on a runtime owned
//! by the client.

use crate::core::client::{IdentityClient, PolicyEntities, PolicyInfo, RemoteResult};
use crate::error::{RemoteError, Result};
use aws_config::BehaviorVersion;
use aws_sdk_iam::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_iam::Client;
use std::future::Future;
use tokio::runtime::Runtime;
use tracing::{debug, info};

/// Blocking IAM client
pub struct AwsIamClient {
    client: Client,
    runtime: Runtime,
}

impl AwsIamClient {
    /// Build a client from the default credential and region chain
    pub fn from_env() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let config = runtime.block_on(aws_config::defaults(BehaviorVersion::latest()).load());
        info!(
            "Initialized IAM client (region: {:?})",
            config.region().map(|r| r.as_ref().to_string())
        );

        Ok(AwsIamClient {
            client: Client::new(&config),
            runtime,
        })
    }

    /// Wrap an existing SDK client and runtime
    pub fn new(client: Client, runtime: Runtime) -> Self {
        AwsIamClient { client, runtime }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Keep the service's error code and message; the reconciler only looks at
/// the code
fn remote_error<E, R>(err: SdkError<E, R>) -> RemoteError
where
    E: ProvideErrorMetadata,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| match &err {
            SdkError::TimeoutError(_) => "request timed out".to_string(),
            SdkError::DispatchFailure(_) => "request could not be dispatched".to_string(),
            _ => "no message from service".to_string(),
        });
    RemoteError::new(code, message)
}

impl IdentityClient for AwsIamClient {
    fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> RemoteResult<()> {
        debug!("AttachUserPolicy {} {}", user_name, policy_arn);
        self.block_on(
            self.client
                .attach_user_policy()
                .user_name(user_name)
                .policy_arn(policy_arn)
                .send(),
        )
        .map(|_| ())
        .map_err(remote_error)
    }

    fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        debug!("AttachRolePolicy {} {}", role_name, policy_arn);
        self.block_on(
            self.client
                .attach_role_policy()
                .role_name(role_name)
                .policy_arn(policy_arn)
                .send(),
        )
        .map(|_| ())
        .map_err(remote_error)
    }

    fn attach_group_policy(&self, group_name: &str, policy_arn: &str) -> RemoteResult<()> {
        debug!("AttachGroupPolicy {} {}", group_name, policy_arn);
        self.block_on(
            self.client
                .attach_group_policy()
                .group_name(group_name)
                .policy_arn(policy_arn)
                .send(),
        )
        .map(|_| ())
        .map_err(remote_error)
    }

    fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> RemoteResult<()> {
        debug!("DetachUserPolicy {} {}", user_name, policy_arn);
        self.block_on(
            self.client
                .detach_user_policy()
                .user_name(user_name)
                .policy_arn(policy_arn)
                .send(),
        )
        .map(|_| ())
        .map_err(remote_error)
    }

    fn detach_role_policy(&self, role_name: &str, policy_arn: &str) -> RemoteResult<()> {
        debug!("DetachRolePolicy {} {}", role_name, policy_arn);
        self.block_on(
            self.client
                .detach_role_policy()
                .role_name(role_name)
                .policy_arn(policy_arn)
                .send(),
        )
        .map(|_| ())
        .map_err(remote_error)
    }

    fn detach_group_policy(&self, group_name: &str, policy_arn: &str) -> RemoteResult<()> {
        debug!("DetachGroupPolicy {} {}", group_name, policy_arn);
        self.block_on(
            self.client
                .detach_group_policy()
                .group_name(group_name)
                .policy_arn(policy_arn)
                .send(),
        )
        .map(|_| ())
        .map_err(remote_error)
    }

    fn get_policy(&self, policy_arn: &str) -> RemoteResult<PolicyInfo> {
        debug!("GetPolicy {}", policy_arn);
        let output = self
            .block_on(self.client.get_policy().policy_arn(policy_arn).send())
            .map_err(remote_error)?;

        let policy = output.policy();
        Ok(PolicyInfo {
            arn: policy
                .and_then(|p| p.arn())
                .unwrap_or(policy_arn)
                .to_string(),
            policy_name: policy.and_then(|p| p.policy_name()).map(str::to_string),
            attachment_count: policy
                .and_then(|p| p.attachment_count())
                .and_then(|n| u32::try_from(n).ok()),
        })
    }

    /// Follows `Marker` until the listing is no longer truncated
    fn list_entities_for_policy(&self, policy_arn: &str) -> RemoteResult<PolicyEntities> {
        let mut entities = PolicyEntities::default();
        let mut marker: Option<String> = None;

        loop {
            debug!("ListEntitiesForPolicy {} (marker: {:?})", policy_arn, marker);
            let output = self
                .block_on(
                    self.client
                        .list_entities_for_policy()
                        .policy_arn(policy_arn)
                        .set_marker(marker.take())
                        .send(),
                )
                .map_err(remote_error)?;

            entities.users.extend(
                output
                    .policy_users()
                    .iter()
                    .filter_map(|u| u.user_name().map(str::to_string)),
            );
            entities.roles.extend(
                output
                    .policy_roles()
                    .iter()
                    .filter_map(|r| r.role_name().map(str::to_string)),
            );
            entities.groups.extend(
                output
                    .policy_groups()
                    .iter()
                    .filter_map(|g| g.group_name().map(str::to_string)),
            );

            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(entities)
    }
}
