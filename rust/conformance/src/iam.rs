use crate::{
    arn::AccountId,
    presence::{AttachedPolicy, GroupMembership},
};
use anyhow::{self, Context};
use aws_arn::ResourceName;
use aws_smithy_types_convert::stream::PaginationStreamExt;
use futures::TryStreamExt;
use std::{future::Future, sync::Arc};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("cannot resolve account identity: {0:?}")]
    Identity(anyhow::Error),
    #[error("identity provider call failed: {0:?}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDescription {
    pub arn: String,
    pub default_version_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyVersion {
    pub version_id: String,
    /// Percent-encoded JSON, as IAM returns it.
    pub document: Option<String>,
}

/// Read-only view of the IAM control plane.
///
/// Lookups of a single resource return `None`/`false` when IAM reports the
/// entity as missing; any other failure is a [`ProviderError`].
pub trait IdentityProvider {
    fn resolve_account_id(&self) -> impl Future<Output = Result<AccountId, ProviderError>>;
    fn get_policy(&self, policy_arn: &str) -> impl Future<Output = Result<Option<PolicyDescription>, ProviderError>>;
    fn get_policy_version(
        &self,
        policy_arn: &str,
        version_id: &str,
    ) -> impl Future<Output = Result<Option<PolicyVersion>, ProviderError>>;
    fn role_exists(&self, role_name: &str) -> impl Future<Output = Result<bool, ProviderError>>;
    fn group_exists(&self, group_name: &str) -> impl Future<Output = Result<bool, ProviderError>>;
    fn user_exists(&self, user_name: &str) -> impl Future<Output = Result<bool, ProviderError>>;
    fn list_attached_role_policies(
        &self,
        role_name: &str,
    ) -> impl Future<Output = Result<Vec<AttachedPolicy>, ProviderError>>;
    fn list_attached_group_policies(
        &self,
        group_name: &str,
    ) -> impl Future<Output = Result<Vec<AttachedPolicy>, ProviderError>>;
    fn list_groups_for_user(&self, user_name: &str) -> impl Future<Output = Result<Vec<GroupMembership>, ProviderError>>;
}

pub struct AwsIdentityProvider {
    iam: Arc<aws_sdk_iam::Client>,
    sts: Arc<aws_sdk_sts::Client>,
}

impl AwsIdentityProvider {
    pub fn new(iam: Arc<aws_sdk_iam::Client>, sts: Arc<aws_sdk_sts::Client>) -> Self {
        Self { iam, sts }
    }
}

/// Collapses IAM's `NoSuchEntity` service error into `None`.
macro_rules! found {
    ($result:expr) => {
        match $result {
            Ok(output) => Ok(Some(output)),
            Err(e)
                if e.as_service_error()
                    .map_or(false, |se| se.is_no_such_entity_exception()) =>
            {
                Ok(None)
            }
            Err(e) => Err(ProviderError::InternalError(e.into())),
        }
    };
}

/// Picks the account out of an `sts:GetCallerIdentity` response, falling back
/// to the account component of the caller ARN.
pub fn account_from_caller(account: Option<String>, arn: Option<String>) -> Result<AccountId, ProviderError> {
    let account = match account {
        Some(account) => account,
        None => {
            let arn: ResourceName = arn
                .context("no account or arn returned by sts:GetCallerIdentity")
                .map_err(ProviderError::Identity)?
                .parse()
                .map_err(|e| ProviderError::Identity(anyhow::anyhow!("cannot parse caller arn: {:?}", e)))?;
            arn.account_id
                .map(|account| account.to_string())
                .context("caller arn carries no account id")
                .map_err(ProviderError::Identity)?
        }
    };

    AccountId::new(account).map_err(|e| ProviderError::Identity(e.into()))
}

impl IdentityProvider for AwsIdentityProvider {
    async fn resolve_account_id(&self) -> Result<AccountId, ProviderError> {
        let identity = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| ProviderError::Identity(e.into()))?;

        let account = account_from_caller(identity.account, identity.arn)?;
        debug!(%account, "resolved caller account");
        Ok(account)
    }

    async fn get_policy(&self, policy_arn: &str) -> Result<Option<PolicyDescription>, ProviderError> {
        debug!(policy_arn, "iam:GetPolicy");
        let output = found!(self.iam.get_policy().policy_arn(policy_arn).send().await)?;

        Ok(output.and_then(|o| o.policy).map(|policy| PolicyDescription {
            arn: policy.arn.unwrap_or_else(|| policy_arn.to_string()),
            default_version_id: policy.default_version_id,
        }))
    }

    async fn get_policy_version(&self, policy_arn: &str, version_id: &str) -> Result<Option<PolicyVersion>, ProviderError> {
        debug!(policy_arn, version_id, "iam:GetPolicyVersion");
        let output = found!(
            self.iam
                .get_policy_version()
                .policy_arn(policy_arn)
                .version_id(version_id)
                .send()
                .await
        )?;

        Ok(output.map(|o| PolicyVersion {
            version_id: version_id.to_string(),
            document: o.policy_version.and_then(|version| version.document),
        }))
    }

    async fn role_exists(&self, role_name: &str) -> Result<bool, ProviderError> {
        debug!(role_name, "iam:GetRole");
        let output = found!(self.iam.get_role().role_name(role_name).send().await)?;
        Ok(output.and_then(|o| o.role).is_some())
    }

    async fn group_exists(&self, group_name: &str) -> Result<bool, ProviderError> {
        debug!(group_name, "iam:GetGroup");
        let output = found!(self.iam.get_group().group_name(group_name).send().await)?;
        Ok(output.and_then(|o| o.group).is_some())
    }

    async fn user_exists(&self, user_name: &str) -> Result<bool, ProviderError> {
        debug!(user_name, "iam:GetUser");
        let output = found!(self.iam.get_user().user_name(user_name).send().await)?;
        Ok(output.and_then(|o| o.user).is_some())
    }

    async fn list_attached_role_policies(&self, role_name: &str) -> Result<Vec<AttachedPolicy>, ProviderError> {
        debug!(role_name, "iam:ListAttachedRolePolicies");
        self.iam
            .list_attached_role_policies()
            .role_name(role_name)
            .into_paginator()
            .items()
            .send()
            .into_stream_03x()
            .map_err(|e| ProviderError::InternalError(e.into()))
            .try_filter_map(|policy| futures::future::ready(Ok(policy.policy_name.map(AttachedPolicy::new))))
            .try_collect()
            .await
    }

    async fn list_attached_group_policies(&self, group_name: &str) -> Result<Vec<AttachedPolicy>, ProviderError> {
        debug!(group_name, "iam:ListAttachedGroupPolicies");
        self.iam
            .list_attached_group_policies()
            .group_name(group_name)
            .into_paginator()
            .items()
            .send()
            .into_stream_03x()
            .map_err(|e| ProviderError::InternalError(e.into()))
            .try_filter_map(|policy| futures::future::ready(Ok(policy.policy_name.map(AttachedPolicy::new))))
            .try_collect()
            .await
    }

    async fn list_groups_for_user(&self, user_name: &str) -> Result<Vec<GroupMembership>, ProviderError> {
        debug!(user_name, "iam:ListGroupsForUser");
        self.iam
            .list_groups_for_user()
            .user_name(user_name)
            .into_paginator()
            .items()
            .send()
            .into_stream_03x()
            .map_ok(|group| GroupMembership::new(group.group_name))
            .map_err(|e| ProviderError::InternalError(e.into()))
            .try_collect()
            .await
    }
}
