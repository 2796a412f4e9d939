use crate::{
    checker::ExpectedPermission,
    document::{Effect, OneOrMany},
};
use const_format::concatcp;
use serde::Serialize;
use std::fmt::{self, Display};

mod prefix {
    pub(super) const FULL: &str = "FullAccess";
    pub(super) const READ: &str = "ReadAccess";
}

mod kind {
    pub(super) const POLICY: &str = "Policy";
    pub(super) const ROLE: &str = "Role";
    pub(super) const GROUP: &str = "Group";
    pub(super) const USER: &str = "User";
}

mod service {
    pub(super) const EC2: &str = "EC2";
    pub(super) const S3: &str = "S3";
}

const FULL_ACCESS_POLICY_EC2: &str = concatcp!(prefix::FULL, kind::POLICY, service::EC2);
const FULL_ACCESS_ROLE_EC2: &str = concatcp!(prefix::FULL, kind::ROLE, service::EC2);
const FULL_ACCESS_GROUP_EC2: &str = concatcp!(prefix::FULL, kind::GROUP, service::EC2);
const FULL_ACCESS_USER_EC2: &str = concatcp!(prefix::FULL, kind::USER, service::EC2);

const FULL_ACCESS_POLICY_S3: &str = concatcp!(prefix::FULL, kind::POLICY, service::S3);
const FULL_ACCESS_ROLE_S3: &str = concatcp!(prefix::FULL, kind::ROLE, service::S3);
const FULL_ACCESS_GROUP_S3: &str = concatcp!(prefix::FULL, kind::GROUP, service::S3);
const FULL_ACCESS_USER_S3: &str = concatcp!(prefix::FULL, kind::USER, service::S3);

const READ_ACCESS_POLICY_S3: &str = concatcp!(prefix::READ, kind::POLICY, service::S3);
const READ_ACCESS_ROLE_S3: &str = concatcp!(prefix::READ, kind::ROLE, service::S3);
const READ_ACCESS_GROUP_S3: &str = concatcp!(prefix::READ, kind::GROUP, service::S3);
const READ_ACCESS_USER_S3: &str = concatcp!(prefix::READ, kind::USER, service::S3);

const READ_ONLY_S3_ACTIONS: [&str; 3] = ["s3:Describe*", "s3:Get*", "s3:List*"];

/// The access profiles provisioned in the account under test.
///
/// Each profile owns one policy, and a role, a group and a user that the
/// policy is expected to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum AccessProfile {
    FullAccessEc2,
    FullAccessS3,
    ReadAccessS3,
}

impl AccessProfile {
    pub const ALL: [AccessProfile; 3] = [
        AccessProfile::FullAccessEc2,
        AccessProfile::FullAccessS3,
        AccessProfile::ReadAccessS3,
    ];

    pub fn policy_name(self) -> &'static str {
        match self {
            AccessProfile::FullAccessEc2 => FULL_ACCESS_POLICY_EC2,
            AccessProfile::FullAccessS3 => FULL_ACCESS_POLICY_S3,
            AccessProfile::ReadAccessS3 => READ_ACCESS_POLICY_S3,
        }
    }

    pub fn role_name(self) -> &'static str {
        match self {
            AccessProfile::FullAccessEc2 => FULL_ACCESS_ROLE_EC2,
            AccessProfile::FullAccessS3 => FULL_ACCESS_ROLE_S3,
            AccessProfile::ReadAccessS3 => READ_ACCESS_ROLE_S3,
        }
    }

    pub fn group_name(self) -> &'static str {
        match self {
            AccessProfile::FullAccessEc2 => FULL_ACCESS_GROUP_EC2,
            AccessProfile::FullAccessS3 => FULL_ACCESS_GROUP_S3,
            AccessProfile::ReadAccessS3 => READ_ACCESS_GROUP_S3,
        }
    }

    pub fn user_name(self) -> &'static str {
        match self {
            AccessProfile::FullAccessEc2 => FULL_ACCESS_USER_EC2,
            AccessProfile::FullAccessS3 => FULL_ACCESS_USER_S3,
            AccessProfile::ReadAccessS3 => READ_ACCESS_USER_S3,
        }
    }

    pub fn expected_permission(self) -> ExpectedPermission {
        let actions = match self {
            AccessProfile::FullAccessEc2 => OneOrMany::one("ec2:*"),
            AccessProfile::FullAccessS3 => OneOrMany::one("s3:*"),
            AccessProfile::ReadAccessS3 => OneOrMany::many(READ_ONLY_S3_ACTIONS),
        };
        ExpectedPermission::new(actions, Effect::Allow)
    }

    pub fn bindings(self) -> [ResourceBinding; 3] {
        [
            ResourceBinding::RolePolicy(self),
            ResourceBinding::GroupPolicy(self),
            ResourceBinding::UserGroup(self),
        ]
    }
}

impl Display for AccessProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.policy_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    RolePolicy,
    GroupPolicy,
    UserGroup,
}

/// An association between two IAM resources that must exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceBinding {
    /// The profile's policy is attached to its role.
    RolePolicy(AccessProfile),
    /// The profile's policy is attached to its group.
    GroupPolicy(AccessProfile),
    /// The profile's user is a member of its group.
    UserGroup(AccessProfile),
}

impl ResourceBinding {
    /// Every binding, grouped by kind in declaration order.
    pub fn all() -> Vec<ResourceBinding> {
        let kinds: [fn(AccessProfile) -> ResourceBinding; 3] = [
            ResourceBinding::RolePolicy,
            ResourceBinding::GroupPolicy,
            ResourceBinding::UserGroup,
        ];
        kinds
            .into_iter()
            .flat_map(|make| AccessProfile::ALL.into_iter().map(make))
            .collect()
    }

    pub fn kind(&self) -> BindingKind {
        match self {
            ResourceBinding::RolePolicy(_) => BindingKind::RolePolicy,
            ResourceBinding::GroupPolicy(_) => BindingKind::GroupPolicy,
            ResourceBinding::UserGroup(_) => BindingKind::UserGroup,
        }
    }

    pub fn profile(&self) -> AccessProfile {
        match *self {
            ResourceBinding::RolePolicy(profile)
            | ResourceBinding::GroupPolicy(profile)
            | ResourceBinding::UserGroup(profile) => profile,
        }
    }

    /// The resource that must exist and whose listing is searched.
    pub fn subject(&self) -> &'static str {
        match *self {
            ResourceBinding::RolePolicy(profile) => profile.role_name(),
            ResourceBinding::GroupPolicy(profile) => profile.group_name(),
            ResourceBinding::UserGroup(profile) => profile.user_name(),
        }
    }

    /// The name expected in the subject's listing.
    pub fn target(&self) -> &'static str {
        match *self {
            ResourceBinding::RolePolicy(profile) | ResourceBinding::GroupPolicy(profile) => profile.policy_name(),
            ResourceBinding::UserGroup(profile) => profile.group_name(),
        }
    }
}

impl Display for ResourceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceBinding::RolePolicy(_) => write!(
                f,
                "Role {:?} has the correct policy {:?} attached",
                self.subject(),
                self.target()
            ),
            ResourceBinding::GroupPolicy(_) => write!(
                f,
                "Group {:?} has the correct policy {:?} attached",
                self.subject(),
                self.target()
            ),
            ResourceBinding::UserGroup(_) => write!(
                f,
                "User {:?} is a member of group {:?}",
                self.subject(),
                self.target()
            ),
        }
    }
}
