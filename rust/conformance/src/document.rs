use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("policy document cannot be percent-decoded: {0}")]
    PercentEncoding(String),
    #[error("policy document does not match the expected schema: {0}")]
    Json(#[from] serde_json::Error),
}

/// A string that IAM allows to be written either as a scalar or as a list.
///
/// Equality is shape-sensitive: `"a"` and `["a"]` are different values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn one(value: impl Into<String>) -> Self {
        OneOrMany::One(value.into())
    }

    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        OneOrMany::Many(values.into_iter().map(Into::into).collect())
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, OneOrMany::One(value) if value == WILDCARD)
    }
}

impl Display for OneOrMany {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OneOrMany::One(value) => write!(f, "{:?}", value),
            OneOrMany::Many(values) => write!(f, "{:?}", values),
        }
    }
}

pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

impl Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "Allow"),
            Effect::Deny => write!(f, "Deny"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationStatement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "Action")]
    pub actions: OneOrMany,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Resource")]
    pub resource: OneOrMany,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Statements {
    Many(Vec<AuthorizationStatement>),
    One(AuthorizationStatement),
}

impl From<Statements> for Vec<AuthorizationStatement> {
    fn from(value: Statements) -> Self {
        match value {
            Statements::Many(statements) => statements,
            Statements::One(statement) => vec![statement],
        }
    }
}

fn deserialize_statements<'de, D>(deserializer: D) -> Result<Vec<AuthorizationStatement>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Statements::deserialize(deserializer).map(Into::into)
}

/// Typed view of an IAM policy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationDocument {
    #[serde(rename = "Version", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "Statement", deserialize_with = "deserialize_statements")]
    pub statements: Vec<AuthorizationStatement>,
}

impl AuthorizationDocument {
    /// Decodes a document as returned by `iam:GetPolicyVersion`, which is
    /// percent-encoded JSON.
    pub fn decode(encoded: &str) -> Result<Self, DecodeError> {
        check_escapes(encoded)?;
        let decoded = percent_decode_str(encoded)
            .decode_utf8()
            .map_err(|e| DecodeError::PercentEncoding(format!("invalid utf-8: {}", e)))?;
        Ok(serde_json::from_str(&decoded)?)
    }
}

/// Every `%` must start a two hex digit escape. `percent_decode_str` passes
/// anything else through untouched.
fn check_escapes(encoded: &str) -> Result<(), DecodeError> {
    let bytes = encoded.as_bytes();
    for (offset, _) in encoded.match_indices('%') {
        match bytes.get(offset + 1..offset + 3) {
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {}
            _ => {
                return Err(DecodeError::PercentEncoding(format!(
                    "malformed escape at byte {}",
                    offset
                )))
            }
        }
    }
    Ok(())
}
