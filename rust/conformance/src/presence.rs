use serde::Serialize;

/// A listing entry that can be matched by name.
pub trait NamedRecord {
    fn record_name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachedPolicy {
    pub policy_name: String,
}

impl AttachedPolicy {
    pub fn new(policy_name: impl Into<String>) -> Self {
        Self {
            policy_name: policy_name.into(),
        }
    }
}

impl NamedRecord for AttachedPolicy {
    fn record_name(&self) -> &str {
        &self.policy_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMembership {
    pub group_name: String,
}

impl GroupMembership {
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
        }
    }
}

impl NamedRecord for GroupMembership {
    fn record_name(&self) -> &str {
        &self.group_name
    }
}

/// Exact, case-sensitive name match against any record.
pub fn is_present<R: NamedRecord>(records: &[R], target: &str) -> bool {
    records.iter().any(|record| record.record_name() == target)
}
