//! Harness for the live tests under `tests/`. They need credentials for the
//! account where the access profiles are provisioned, and run with
//! `cargo test -p e2e -- --ignored`.

use aws_config::BehaviorVersion;
use conformance::{AwsIdentityProvider, ConformanceSuite};
use std::sync::Arc;

pub async fn live_suite() -> ConformanceSuite<AwsIdentityProvider> {
    let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let iam = Arc::new(aws_sdk_iam::Client::new(&sdk_config));
    let sts = Arc::new(aws_sdk_sts::Client::new(&sdk_config));
    ConformanceSuite::new(AwsIdentityProvider::new(iam, sts))
}
