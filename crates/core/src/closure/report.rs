//! Closure result aggregator: the externally visible view of a run.

use closure_shared::types::ClosureRunId;
use serde::Serialize;

use super::error::ErrorKind;
use super::steps::StepFigures;
use super::types::{ClosureRun, RunError, RunMode, RunStatus, StepId, StepStatus, YearEndResult};
use crate::fiscal::{PeriodKey, PeriodKind};
use crate::ledger::{JournalPosting, PostingReference};

/// `{ success, data, errors }` envelope returned by the closure endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureReport {
    /// True only when the run finished with status `success`.
    pub success: bool,
    /// Run detail.
    pub data: ClosureReportData,
    /// Errors, the fatal one first.
    pub errors: Vec<ReportedError>,
}

/// Run detail of a report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureReportData {
    /// Run identifier.
    pub run_id: ClosureRunId,
    /// Target period.
    pub period: PeriodKey,
    /// Dry run or commit.
    pub mode: RunMode,
    /// Overall outcome.
    pub status: RunStatus,
    /// Every step of the plan, executed or not.
    pub steps: Vec<StepReport>,
    /// Warnings of the run and of every step.
    pub warnings: Vec<ReportedWarning>,
    /// Year-end figures of annual runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_end_result: Option<YearEndResult>,
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    /// Step identifier.
    pub step: StepId,
    /// Final status; `pending` means the run halted before it.
    pub status: StepStatus,
    /// Computed figures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepFigures>,
    /// Ledger entries accepted.
    pub postings: Vec<PostingReference>,
    /// Journal entries computed.
    pub journal_entries: Vec<JournalPosting>,
    /// Step warnings.
    pub warnings: Vec<String>,
    /// Failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    /// Wall time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

/// A warning with the step that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedWarning {
    /// Raising step, `None` for run-level warnings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    /// Warning text.
    pub message: String,
}

/// An error of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedError {
    /// Failing step, `None` when the run was rejected before execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<StepId>,
    /// Taxonomy class.
    pub kind: ErrorKind,
    /// Error code.
    pub code: String,
    /// Message.
    pub message: String,
    /// Whether this error halted the run.
    pub fatal: bool,
}

impl ClosureReport {
    /// HTTP status for the run: 200 on success, the rejection status for
    /// pre-flight errors, 422 for a run halted mid-way.
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self.errors.first() {
            None => 200,
            Some(ReportedError { step: None, kind, .. }) => kind.http_status_code(),
            Some(ReportedError {
                kind: ErrorKind::Internal,
                ..
            }) => 500,
            Some(_) => 422,
        }
    }
}

impl From<&ClosureRun> for ClosureReport {
    fn from(run: &ClosureRun) -> Self {
        let mut warnings: Vec<ReportedWarning> = run
            .warnings
            .iter()
            .map(|message| ReportedWarning {
                step: None,
                message: message.clone(),
            })
            .collect();
        warnings.extend(run.steps.iter().flat_map(|step| {
            step.warnings.iter().map(|message| ReportedWarning {
                step: Some(step.step_id),
                message: message.clone(),
            })
        }));

        let steps = run
            .steps
            .iter()
            .map(|step| StepReport {
                step: step.step_id,
                status: step.status,
                result: step.result.clone(),
                postings: step.postings.clone(),
                journal_entries: step.journal_entries.clone(),
                warnings: step.warnings.clone(),
                error: step.error.clone(),
                duration_ms: step
                    .started_at
                    .zip(step.finished_at)
                    .map(|(start, end)| (end - start).num_milliseconds()),
            })
            .collect();

        let fatal = run.fatal_error();
        let errors = run
            .errors
            .iter()
            .map(|error| ReportedError {
                step: error.step,
                kind: error.kind,
                code: error.code.clone(),
                message: error.message.clone(),
                fatal: fatal.is_some_and(|fatal| std::ptr::eq(fatal, error)),
            })
            .collect();

        Self {
            success: run.status == RunStatus::Success,
            data: ClosureReportData {
                run_id: run.id,
                period: run.period,
                mode: run.mode,
                status: run.status,
                steps,
                warnings,
                year_end_result: match run.period.kind() {
                    PeriodKind::Annual => Some(run.year_end_result.unwrap_or_default()),
                    PeriodKind::Monthly => None,
                },
            },
            errors,
        }
    }
}
