//! Read-only conformance checks for provisioned IAM policies, roles, groups
//! and users.

pub mod arn;
pub mod checker;
pub mod document;
pub mod iam;
pub mod naming;
pub mod presence;
pub mod suite;

pub use checker::{check_conformance, conforms, ExpectedPermission};
pub use document::{AuthorizationDocument, AuthorizationStatement, DecodeError, Effect, OneOrMany};
pub use iam::{AwsIdentityProvider, IdentityProvider, ProviderError};
pub use naming::{AccessProfile, ResourceBinding};
pub use suite::{CheckError, ConformanceSuite, Selection, SuiteReport, Verdict};
