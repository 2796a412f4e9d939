use std::fmt::{self, Display};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("account id must not be empty")]
pub struct EmptyAccountId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(s: impl Into<String>) -> Result<Self, EmptyAccountId> {
        let s = s.into();
        if s.is_empty() {
            return Err(EmptyAccountId);
        }
        Ok(AccountId(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully-qualified ARN of a customer managed policy.
pub fn policy_arn(account: &AccountId, policy_name: &str) -> String {
    format!(
        "arn:aws:iam::{account}:policy/{name}",
        account = account,
        name = policy_name,
    )
}
