use crate::{
    arn::policy_arn,
    checker::check_conformance,
    document::{AuthorizationDocument, DecodeError},
    iam::{IdentityProvider, ProviderError},
    naming::{AccessProfile, BindingKind, ResourceBinding},
    presence::is_present,
};
use futures::{stream, StreamExt};
use serde::Serialize;
use std::fmt::{self, Display};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Policy,
    PolicyVersion,
    Role,
    Group,
    User,
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Policy => write!(f, "policy"),
            ResourceKind::PolicyVersion => write!(f, "policy version"),
            ResourceKind::Role => write!(f, "role"),
            ResourceKind::Group => write!(f, "group"),
            ResourceKind::User => write!(f, "user"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },
    #[error("{kind} {name} has no {field}")]
    MissingField {
        kind: ResourceKind,
        name: String,
        field: &'static str,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Outcome of a check that reached the comparison step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Check {
    Policy(AccessProfile),
    Binding(ResourceBinding),
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        match self {
            Check::Policy(_) => CheckKind::Policy,
            Check::Binding(binding) => binding.kind().into(),
        }
    }
}

impl Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Policy(profile) => write!(f, "{} has correct permissions", profile.policy_name()),
            Check::Binding(binding) => write!(f, "{}", binding),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Policy,
    RolePolicy,
    GroupPolicy,
    UserGroup,
}

impl From<BindingKind> for CheckKind {
    fn from(kind: BindingKind) -> Self {
        match kind {
            BindingKind::RolePolicy => CheckKind::RolePolicy,
            BindingKind::GroupPolicy => CheckKind::GroupPolicy,
            BindingKind::UserGroup => CheckKind::UserGroup,
        }
    }
}

/// Which checks a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Policies,
    Roles,
    Groups,
    Users,
}

impl Selection {
    /// The selected checks in declaration order.
    pub fn checks(self) -> Vec<Check> {
        let policies = AccessProfile::ALL.into_iter().map(Check::Policy);
        let bindings = ResourceBinding::all().into_iter().map(Check::Binding);

        match self {
            Selection::All => policies.chain(bindings).collect(),
            Selection::Policies => policies.collect(),
            Selection::Roles => bindings.filter(|c| c.kind() == CheckKind::RolePolicy).collect(),
            Selection::Groups => bindings.filter(|c| c.kind() == CheckKind::GroupPolicy).collect(),
            Selection::Users => bindings.filter(|c| c.kind() == CheckKind::UserGroup).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Failed(String),
    Error(String),
}

impl From<Result<Verdict, CheckError>> for CheckStatus {
    fn from(result: Result<Verdict, CheckError>) -> Self {
        match result {
            Ok(Verdict::Pass) => CheckStatus::Passed,
            Ok(Verdict::Fail(reason)) => CheckStatus::Failed(reason),
            Err(e) => CheckStatus::Error(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub name: String,
    pub kind: CheckKind,
    #[serde(flatten)]
    pub status: CheckStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuiteReport {
    pub checks: Vec<CheckReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|s| matches!(s, CheckStatus::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, CheckStatus::Failed(_)))
    }

    pub fn errored(&self) -> usize {
        self.count(|s| matches!(s, CheckStatus::Error(_)))
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.checks.len()
    }

    fn count(&self, predicate: impl Fn(&CheckStatus) -> bool) -> usize {
        self.checks.iter().filter(|c| predicate(&c.status)).count()
    }
}

pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runs conformance checks against whatever [`IdentityProvider`] it is given.
pub struct ConformanceSuite<P> {
    provider: P,
    concurrency: usize,
}

impl<P: IdentityProvider> ConformanceSuite<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Fetches the default version of the profile's policy and compares every
    /// statement with the profile's expected permission.
    pub async fn check_policy(&self, profile: AccessProfile) -> Result<Verdict, CheckError> {
        let name = profile.policy_name();
        let account = self.provider.resolve_account_id().await?;
        let arn = policy_arn(&account, name);

        let policy = self
            .provider
            .get_policy(&arn)
            .await?
            .ok_or_else(|| CheckError::NotFound {
                kind: ResourceKind::Policy,
                name: arn.clone(),
            })?;

        let version_id = policy.default_version_id.ok_or_else(|| CheckError::MissingField {
            kind: ResourceKind::Policy,
            name: arn.clone(),
            field: "default version",
        })?;

        let version_name = format!("{}@{}", arn, version_id);
        let encoded = self
            .provider
            .get_policy_version(&arn, &version_id)
            .await?
            .ok_or_else(|| CheckError::NotFound {
                kind: ResourceKind::PolicyVersion,
                name: version_name.clone(),
            })?
            .document
            .ok_or_else(|| CheckError::MissingField {
                kind: ResourceKind::PolicyVersion,
                name: version_name,
                field: "document",
            })?;

        let document = AuthorizationDocument::decode(&encoded)?;
        let report = check_conformance(&document, &profile.expected_permission());

        if report.conforms() {
            Ok(Verdict::Pass)
        } else {
            Ok(Verdict::Fail(report.to_string()))
        }
    }

    pub async fn check_role_attachment(&self, role_name: &str, policy_name: &str) -> Result<Verdict, CheckError> {
        if !self.provider.role_exists(role_name).await? {
            return Err(not_found(ResourceKind::Role, role_name));
        }
        let attached = self.provider.list_attached_role_policies(role_name).await?;
        Ok(presence_verdict(
            is_present(&attached, policy_name),
            format!("policy {:?} is not attached to role {:?}", policy_name, role_name),
        ))
    }

    pub async fn check_group_attachment(&self, group_name: &str, policy_name: &str) -> Result<Verdict, CheckError> {
        if !self.provider.group_exists(group_name).await? {
            return Err(not_found(ResourceKind::Group, group_name));
        }
        let attached = self.provider.list_attached_group_policies(group_name).await?;
        Ok(presence_verdict(
            is_present(&attached, policy_name),
            format!("policy {:?} is not attached to group {:?}", policy_name, group_name),
        ))
    }

    pub async fn check_user_membership(&self, user_name: &str, group_name: &str) -> Result<Verdict, CheckError> {
        if !self.provider.user_exists(user_name).await? {
            return Err(not_found(ResourceKind::User, user_name));
        }
        let groups = self.provider.list_groups_for_user(user_name).await?;
        Ok(presence_verdict(
            is_present(&groups, group_name),
            format!("user {:?} is not a member of group {:?}", user_name, group_name),
        ))
    }

    pub async fn check_binding(&self, binding: ResourceBinding) -> Result<Verdict, CheckError> {
        match binding {
            ResourceBinding::RolePolicy(_) => self.check_role_attachment(binding.subject(), binding.target()).await,
            ResourceBinding::GroupPolicy(_) => self.check_group_attachment(binding.subject(), binding.target()).await,
            ResourceBinding::UserGroup(_) => self.check_user_membership(binding.subject(), binding.target()).await,
        }
    }

    pub async fn check(&self, check: Check) -> Result<Verdict, CheckError> {
        match check {
            Check::Policy(profile) => self.check_policy(profile).await,
            Check::Binding(binding) => self.check_binding(binding).await,
        }
    }

    /// Runs the selected checks concurrently. Each check reports on its own;
    /// entries come back in declaration order.
    pub async fn run(&self, selection: Selection) -> SuiteReport {
        let checks = selection.checks();

        let mut results: Vec<(usize, CheckReport)> = stream::iter(checks.into_iter().enumerate())
            .map(|(position, check)| async move {
                let result = self.check(check).await;
                match &result {
                    Ok(Verdict::Pass) => info!(check = %check, "passed"),
                    Ok(Verdict::Fail(reason)) => info!(check = %check, reason = %reason, "failed"),
                    Err(e) => warn!(check = %check, error = %e, "errored"),
                }
                (
                    position,
                    CheckReport {
                        name: check.to_string(),
                        kind: check.kind(),
                        status: result.into(),
                    },
                )
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        results.sort_by_key(|(position, _)| *position);

        SuiteReport {
            checks: results.into_iter().map(|(_, report)| report).collect(),
        }
    }
}

fn not_found(kind: ResourceKind, name: &str) -> CheckError {
    CheckError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn presence_verdict(present: bool, reason: String) -> Verdict {
    if present {
        Verdict::Pass
    } else {
        Verdict::Fail(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::{CheckError, CheckKind, CheckStatus, ConformanceSuite, ResourceKind, Selection, Verdict};
    use crate::{
        arn::AccountId,
        document::DecodeError,
        iam::{IdentityProvider, PolicyDescription, PolicyVersion, ProviderError},
        naming::{AccessProfile, ResourceBinding},
        presence::{AttachedPolicy, GroupMembership},
    };
    use std::collections::{HashMap, HashSet};
    use tokio_test::block_on;

    const ACCOUNT: &str = "123456789012";

    #[derive(Default)]
    struct FakeIam {
        account: Option<String>,
        documents: HashMap<String, String>,
        /// Policies reported without a default version id.
        unversioned: HashSet<String>,
        /// Policies whose default version IAM reports as missing.
        missing_versions: HashSet<String>,
        /// Policies whose default version comes back without a document.
        without_document: HashSet<String>,
        roles: HashMap<String, Vec<String>>,
        groups: HashMap<String, Vec<String>>,
        users: HashMap<String, Vec<String>>,
    }

    impl FakeIam {
        fn provisioned() -> Self {
            let mut iam = FakeIam {
                account: Some(ACCOUNT.to_string()),
                ..Default::default()
            };
            iam.documents.insert(
                "FullAccessPolicyEC2".into(),
                r#"{"Version":"2012-10-17","Statement":[{"Action":"ec2:*","Effect":"Allow","Resource":"*"}]}"#.into(),
            );
            iam.documents.insert(
                "FullAccessPolicyS3".into(),
                "%7B%22Statement%22%3A%5B%7B%22Action%22%3A%22s3%3A%2A%22%2C%22Effect%22%3A%22Allow%22%2C%22Resource%22%3A%22%2A%22%7D%5D%7D".into(),
            );
            iam.documents.insert(
                "ReadAccessPolicyS3".into(),
                r#"{"Statement":[{"Action":["s3:Describe*","s3:Get*","s3:List*"],"Effect":"Allow","Resource":"*"}]}"#
                    .into(),
            );
            for profile in AccessProfile::ALL {
                iam.roles
                    .insert(profile.role_name().into(), vec![profile.policy_name().into()]);
                iam.groups.insert(
                    profile.group_name().into(),
                    vec!["Unrelated".into(), profile.policy_name().into()],
                );
                iam.users
                    .insert(profile.user_name().into(), vec![profile.group_name().into()]);
            }
            iam
        }

        fn policy_name(arn: &str) -> Option<&str> {
            arn.strip_prefix(&format!("arn:aws:iam::{}:policy/", ACCOUNT))
        }
    }

    impl IdentityProvider for FakeIam {
        async fn resolve_account_id(&self) -> Result<AccountId, ProviderError> {
            let account = self
                .account
                .clone()
                .ok_or_else(|| ProviderError::Identity(anyhow::anyhow!("no credentials")))?;
            AccountId::new(account).map_err(|e| ProviderError::Identity(e.into()))
        }

        async fn get_policy(&self, policy_arn: &str) -> Result<Option<PolicyDescription>, ProviderError> {
            Ok(Self::policy_name(policy_arn)
                .filter(|name| self.documents.contains_key(*name))
                .map(|name| PolicyDescription {
                    arn: policy_arn.to_string(),
                    default_version_id: (!self.unversioned.contains(name)).then(|| "v1".to_string()),
                }))
        }

        async fn get_policy_version(
            &self,
            policy_arn: &str,
            version_id: &str,
        ) -> Result<Option<PolicyVersion>, ProviderError> {
            assert_eq!(version_id, "v1");
            let Some(name) = Self::policy_name(policy_arn) else {
                return Ok(None);
            };
            if self.missing_versions.contains(name) {
                return Ok(None);
            }
            Ok(Some(PolicyVersion {
                version_id: version_id.to_string(),
                document: self
                    .documents
                    .get(name)
                    .filter(|_| !self.without_document.contains(name))
                    .cloned(),
            }))
        }

        async fn role_exists(&self, role_name: &str) -> Result<bool, ProviderError> {
            Ok(self.roles.contains_key(role_name))
        }

        async fn group_exists(&self, group_name: &str) -> Result<bool, ProviderError> {
            Ok(self.groups.contains_key(group_name))
        }

        async fn user_exists(&self, user_name: &str) -> Result<bool, ProviderError> {
            Ok(self.users.contains_key(user_name))
        }

        async fn list_attached_role_policies(&self, role_name: &str) -> Result<Vec<AttachedPolicy>, ProviderError> {
            Ok(self.roles[role_name].iter().map(AttachedPolicy::new).collect())
        }

        async fn list_attached_group_policies(&self, group_name: &str) -> Result<Vec<AttachedPolicy>, ProviderError> {
            Ok(self.groups[group_name].iter().map(AttachedPolicy::new).collect())
        }

        async fn list_groups_for_user(&self, user_name: &str) -> Result<Vec<GroupMembership>, ProviderError> {
            Ok(self.users[user_name].iter().map(GroupMembership::new).collect())
        }
    }

    #[test]
    fn test_provisioned_account_passes_every_check() {
        let suite = ConformanceSuite::new(FakeIam::provisioned());
        let report = block_on(suite.run(Selection::All));
        assert_eq!(report.checks.len(), 12);
        assert!(report.all_passed(), "{:#?}", report);
    }

    #[test]
    fn test_report_keeps_declaration_order() {
        let suite = ConformanceSuite::new(FakeIam::provisioned()).with_concurrency(8);
        let report = block_on(suite.run(Selection::All));
        let names: Vec<_> = report.checks.iter().map(|c| c.name.clone()).collect();
        let expected: Vec<_> = Selection::All.checks().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, expected);
        assert_eq!(report.checks[0].name, "FullAccessPolicyEC2 has correct permissions");
        assert_eq!(report.checks[0].kind, CheckKind::Policy);
    }

    #[test]
    fn test_reordered_actions_fail_policy_check() {
        let mut iam = FakeIam::provisioned();
        iam.documents.insert(
            "ReadAccessPolicyS3".into(),
            r#"{"Statement":[{"Action":["s3:Get*","s3:Describe*","s3:List*"],"Effect":"Allow","Resource":"*"}]}"#.into(),
        );
        let suite = ConformanceSuite::new(iam);
        let verdict = block_on(suite.check_policy(AccessProfile::ReadAccessS3)).unwrap();
        assert!(matches!(verdict, Verdict::Fail(reason) if reason.starts_with("statement 0: actions")));
    }

    #[test]
    fn test_empty_policy_fails_policy_check() {
        let mut iam = FakeIam::provisioned();
        iam.documents
            .insert("FullAccessPolicyEC2".into(), r#"{"Statement":[]}"#.into());
        let suite = ConformanceSuite::new(iam);
        let verdict = block_on(suite.check_policy(AccessProfile::FullAccessEc2)).unwrap();
        assert_eq!(verdict, Verdict::Fail("policy document has no statements".into()));
    }

    #[test]
    fn test_undecodable_policy_is_an_error() {
        let mut iam = FakeIam::provisioned();
        iam.documents.insert("FullAccessPolicyS3".into(), "not json".into());
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_policy(AccessProfile::FullAccessS3)).unwrap_err();
        assert!(matches!(err, CheckError::Decode(DecodeError::Json(_))));
    }

    #[test]
    fn test_missing_policy_is_an_error() {
        let mut iam = FakeIam::provisioned();
        iam.documents.remove("FullAccessPolicyS3");
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_policy(AccessProfile::FullAccessS3)).unwrap_err();
        assert!(matches!(
            err,
            CheckError::NotFound {
                kind: ResourceKind::Policy,
                ..
            }
        ));
    }

    #[test]
    fn test_policy_without_default_version_is_an_error() {
        let mut iam = FakeIam::provisioned();
        iam.unversioned.insert("FullAccessPolicyEC2".into());
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_policy(AccessProfile::FullAccessEc2)).unwrap_err();
        assert!(matches!(
            err,
            CheckError::MissingField {
                kind: ResourceKind::Policy,
                field: "default version",
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "policy arn:aws:iam::123456789012:policy/FullAccessPolicyEC2 has no default version"
        );
    }

    #[test]
    fn test_missing_policy_version_is_an_error() {
        let mut iam = FakeIam::provisioned();
        iam.missing_versions.insert("ReadAccessPolicyS3".into());
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_policy(AccessProfile::ReadAccessS3)).unwrap_err();
        assert!(matches!(
            err,
            CheckError::NotFound {
                kind: ResourceKind::PolicyVersion,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "policy version arn:aws:iam::123456789012:policy/ReadAccessPolicyS3@v1 not found"
        );
    }

    #[test]
    fn test_policy_version_without_document_is_an_error() {
        let mut iam = FakeIam::provisioned();
        iam.without_document.insert("FullAccessPolicyS3".into());
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_policy(AccessProfile::FullAccessS3)).unwrap_err();
        assert!(matches!(
            err,
            CheckError::MissingField {
                kind: ResourceKind::PolicyVersion,
                field: "document",
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_escape_in_policy_is_a_decode_error() {
        let mut iam = FakeIam::provisioned();
        iam.documents.insert(
            "FullAccessPolicyEC2".into(),
            r#"{"Statement":[{"Sid":"bad%zz","Action":"ec2:*","Effect":"Allow","Resource":"*"}]}"#.into(),
        );
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_policy(AccessProfile::FullAccessEc2)).unwrap_err();
        assert!(matches!(err, CheckError::Decode(DecodeError::PercentEncoding(_))));
    }

    #[test]
    fn test_unresolved_account_is_an_error() {
        let mut iam = FakeIam::provisioned();
        iam.account = None;
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_policy(AccessProfile::FullAccessEc2)).unwrap_err();
        assert!(matches!(err, CheckError::Provider(ProviderError::Identity(_))));
    }

    #[test]
    fn test_detached_policy_fails_role_check() {
        let mut iam = FakeIam::provisioned();
        iam.roles.insert("FullAccessRoleS3".into(), vec!["FullAccessPolicyEC2".into()]);
        let suite = ConformanceSuite::new(iam);
        let verdict = block_on(suite.check_binding(ResourceBinding::RolePolicy(AccessProfile::FullAccessS3))).unwrap();
        assert_eq!(
            verdict,
            Verdict::Fail(r#"policy "FullAccessPolicyS3" is not attached to role "FullAccessRoleS3""#.into())
        );
    }

    #[test]
    fn test_missing_user_is_an_error() {
        let mut iam = FakeIam::provisioned();
        iam.users.remove("ReadAccessUserS3");
        let suite = ConformanceSuite::new(iam);
        let err = block_on(suite.check_user_membership("ReadAccessUserS3", "ReadAccessGroupS3")).unwrap_err();
        assert_eq!(err.to_string(), "user ReadAccessUserS3 not found");
    }

    #[test]
    fn test_failing_check_does_not_affect_others() {
        let mut iam = FakeIam::provisioned();
        iam.groups.remove("FullAccessGroupEC2");
        iam.users.insert("FullAccessUserS3".into(), vec![]);
        let suite = ConformanceSuite::new(iam);
        let report = block_on(suite.run(Selection::All));

        assert_eq!(report.passed(), 10);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.errored(), 1);
        assert!(!report.all_passed());

        let group_check = report
            .checks
            .iter()
            .find(|c| c.name.starts_with(r#"Group "FullAccessGroupEC2""#))
            .unwrap();
        assert_eq!(group_check.status, CheckStatus::Error("group FullAccessGroupEC2 not found".into()));
    }

    #[test]
    fn test_selection_filters_checks() {
        assert_eq!(Selection::Policies.checks().len(), 3);
        assert!(Selection::Users
            .checks()
            .iter()
            .all(|c| c.kind() == CheckKind::UserGroup));

        let suite = ConformanceSuite::new(FakeIam::provisioned());
        let report = block_on(suite.run(Selection::Groups));
        assert_eq!(report.checks.len(), 3);
        assert!(report.checks.iter().all(|c| c.kind == CheckKind::GroupPolicy));
    }
}
