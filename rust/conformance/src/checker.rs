use crate::document::{AuthorizationDocument, AuthorizationStatement, Effect, OneOrMany, WILDCARD};
use serde::Serialize;
use std::fmt::{self, Display};

/// The permission every statement of a policy is expected to grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectedPermission {
    pub actions: OneOrMany,
    pub effect: Effect,
}

impl ExpectedPermission {
    pub fn new(actions: OneOrMany, effect: Effect) -> Self {
        Self { actions, effect }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum Mismatch {
    Actions { expected: OneOrMany, actual: OneOrMany },
    Effect { expected: Effect, actual: Effect },
    Resource { actual: OneOrMany },
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::Actions { expected, actual } => {
                write!(f, "actions {} do not equal expected {}", actual, expected)
            }
            Mismatch::Effect { expected, actual } => {
                write!(f, "effect {} does not equal expected {}", actual, expected)
            }
            Mismatch::Resource { actual } => {
                write!(f, "resource {} is not {:?}", actual, WILDCARD)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementVerdict {
    pub index: usize,
    pub mismatches: Vec<Mismatch>,
}

impl StatementVerdict {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformanceReport {
    pub statements: Vec<StatementVerdict>,
}

impl ConformanceReport {
    /// All statements passed, and there was at least one.
    pub fn conforms(&self) -> bool {
        !self.statements.is_empty() && self.statements.iter().all(StatementVerdict::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StatementVerdict> {
        self.statements.iter().filter(|verdict| !verdict.passed())
    }
}

impl Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.statements.is_empty() {
            return write!(f, "policy document has no statements");
        }

        let reasons = self
            .failures()
            .flat_map(|verdict| {
                verdict
                    .mismatches
                    .iter()
                    .map(move |m| format!("statement {}: {}", verdict.index, m))
            })
            .collect::<Vec<_>>();

        if reasons.is_empty() {
            write!(f, "all {} statement(s) conform", self.statements.len())
        } else {
            write!(f, "{}", reasons.join("; "))
        }
    }
}

fn check_statement(index: usize, statement: &AuthorizationStatement, expected: &ExpectedPermission) -> StatementVerdict {
    let mut mismatches = vec![];

    if statement.actions != expected.actions {
        mismatches.push(Mismatch::Actions {
            expected: expected.actions.clone(),
            actual: statement.actions.clone(),
        });
    }

    if statement.effect != expected.effect {
        mismatches.push(Mismatch::Effect {
            expected: expected.effect,
            actual: statement.effect,
        });
    }

    if !statement.resource.is_wildcard() {
        mismatches.push(Mismatch::Resource {
            actual: statement.resource.clone(),
        });
    }

    StatementVerdict { index, mismatches }
}

pub fn check_conformance(document: &AuthorizationDocument, expected: &ExpectedPermission) -> ConformanceReport {
    ConformanceReport {
        statements: document
            .statements
            .iter()
            .enumerate()
            .map(|(index, statement)| check_statement(index, statement, expected))
            .collect(),
    }
}

pub fn conforms(document: &AuthorizationDocument, expected: &ExpectedPermission) -> bool {
    check_conformance(document, expected).conforms()
}
