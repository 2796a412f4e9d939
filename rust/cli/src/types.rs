use chrono::{DateTime, Utc};
use conformance::suite::{CheckReport, CheckStatus, SuiteReport};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub(crate) struct ReportOutput<'a> {
    generated_at: DateTime<Utc>,
    summary: SummaryOutput,
    checks: &'a [CheckReport],
}

#[derive(Serialize, Debug, PartialEq)]
pub(crate) struct SummaryOutput {
    total: usize,
    passed: usize,
    failed: usize,
    errored: usize,
}

impl From<&SuiteReport> for SummaryOutput {
    fn from(report: &SuiteReport) -> Self {
        Self {
            total: report.checks.len(),
            passed: report.passed(),
            failed: report.failed(),
            errored: report.errored(),
        }
    }
}

impl<'a> ReportOutput<'a> {
    pub(crate) fn new(report: &'a SuiteReport, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            summary: report.into(),
            checks: &report.checks,
        }
    }
}

pub(crate) fn render_text(report: &SuiteReport) -> String {
    let mut lines = report
        .checks
        .iter()
        .map(|check| match &check.status {
            CheckStatus::Passed => format!("PASS  {}", check.name),
            CheckStatus::Failed(reason) => format!("FAIL  {}: {}", check.name, reason),
            CheckStatus::Error(reason) => format!("ERROR {}: {}", check.name, reason),
        })
        .collect::<Vec<_>>();

    lines.push(format!(
        "{} checks: {} passed, {} failed, {} errored",
        report.checks.len(),
        report.passed(),
        report.failed(),
        report.errored()
    ));
    lines.join("\n")
}
