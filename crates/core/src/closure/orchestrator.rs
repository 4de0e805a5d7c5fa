//! Closure orchestrator: drives the step plan of a period.

use std::sync::Arc;

use chrono::Utc;
use closure_shared::types::ClosureRunId;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, error, info, warn};

use super::error::ClosureError;
use super::lock::PeriodLockManager;
use super::options::ClosureRequest;
use super::plan::{ANNUAL_STEPS, StepAction, StepDescriptor, steps_for};
use super::settings::ClosureSettings;
use super::sources::{ClosureRunStore, ClosureSources};
use super::steps::{ClosureContext, StepExecutor, StepInput, StepOutput, distribute};
use super::types::{ClosureRun, RunError, RunStatus, StepId, StepStatus};
use crate::fiscal::{PeriodKey, PeriodKind, PeriodLockStore};
use crate::ledger::{LedgerPostingGateway, PostingReference, validate_posting};

/// Commit runs currently executing in this process.
#[derive(Clone, Default)]
pub struct InFlightRuns {
    runs: Arc<DashMap<PeriodKey, ClosureRunId>>,
}

impl InFlightRuns {
    /// Registers a run for `key`, `None` if another run holds it.
    #[must_use]
    pub fn try_acquire(&self, key: PeriodKey, run_id: ClosureRunId) -> Option<InFlightGuard> {
        match self.runs.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(run_id);
                Some(InFlightGuard {
                    runs: Arc::clone(&self.runs),
                    key,
                })
            }
        }
    }
}

/// Releases the in-flight slot on drop.
pub struct InFlightGuard {
    runs: Arc<DashMap<PeriodKey, ClosureRunId>>,
    key: PeriodKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.runs.remove(&self.key);
    }
}

struct Preflight {
    guard: Option<InFlightGuard>,
    warnings: Vec<String>,
}

/// `fresh` counts postings this run added to the ledger.
struct StepFailure {
    error: ClosureError,
    postings: Vec<PostingReference>,
    fresh: usize,
}

impl From<ClosureError> for StepFailure {
    fn from(error: ClosureError) -> Self {
        Self {
            error,
            postings: Vec::new(),
            fresh: 0,
        }
    }
}

struct StepCompletion {
    output: StepOutput,
    postings: Vec<PostingReference>,
    fresh: usize,
}

/// Runs monthly and annual closures.
pub struct ClosureOrchestrator {
    sources: ClosureSources,
    gateway: Arc<dyn LedgerPostingGateway>,
    locks: PeriodLockManager,
    runs: Arc<dyn ClosureRunStore>,
    settings: ClosureSettings,
    in_flight: InFlightRuns,
}

impl ClosureOrchestrator {
    /// Wires the orchestrator to its collaborators.
    #[must_use]
    pub fn new(
        sources: ClosureSources,
        gateway: Arc<dyn LedgerPostingGateway>,
        lock_store: Arc<dyn PeriodLockStore>,
        runs: Arc<dyn ClosureRunStore>,
        settings: ClosureSettings,
    ) -> Self {
        Self {
            sources,
            gateway,
            locks: PeriodLockManager::new(lock_store),
            runs,
            settings,
            in_flight: InFlightRuns::default(),
        }
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &ClosureSettings {
        &self.settings
    }

    /// Run history.
    #[must_use]
    pub fn run_store(&self) -> Arc<dyn ClosureRunStore> {
        Arc::clone(&self.runs)
    }

    /// Executes a closure and returns the finished run.
    ///
    /// Rejections (invalid input, locked period, concurrent commit) come back
    /// as a `failed` run with no executed step and one error.
    pub async fn run(&self, request: ClosureRequest) -> ClosureRun {
        let run_id = ClosureRunId::new();
        let plan = steps_for(request.period.kind());
        let mut run = ClosureRun::start(run_id, &request, plan.iter().map(|step| step.id), Utc::now());
        info!(
            run_id = %run_id,
            company_id = %request.period.company_id,
            period = %request.period,
            mode = ?request.mode,
            "Closure run started"
        );

        match self.preflight(&request, run_id).await {
            Ok(preflight) => {
                let _guard = preflight.guard;
                run.warnings.extend(preflight.warnings);
                self.execute_plan(&request, plan, &mut run).await;
            }
            Err(err) => {
                warn!(run_id = %run_id, period = %request.period, error = %err, "Closure run rejected");
                run.errors.push(RunError::from_error(None, &err));
                run.status = RunStatus::Failed;
            }
        }
        run.finished_at = Some(Utc::now());

        if let Err(err) = self.runs.save(&run).await {
            error!(run_id = %run_id, error = %err, "Failed to persist closure run");
        }
        info!(
            run_id = %run_id,
            period = %request.period,
            status = ?run.status,
            executed_steps = run.executed_steps(),
            "Closure run finished"
        );
        run
    }

    /// Checks that must pass before any step runs.
    async fn preflight(
        &self,
        request: &ClosureRequest,
        run_id: ClosureRunId,
    ) -> Result<Preflight, ClosureError> {
        request.validate()?;

        let guard = if request.mode.is_commit() {
            self.in_flight.try_acquire(request.period, run_id)
        } else {
            None
        };

        let mut warnings = Vec::new();
        if let Some(locked) = self.locked_scope(&request.period).await? {
            if request.mode.is_commit() {
                return Err(ClosureError::AlreadyLocked(locked.to_string()));
            }
            warnings.push(if locked == request.period {
                format!(
                    "period {} is already locked; this dry run is a preview only",
                    request.period
                )
            } else {
                format!(
                    "period {} falls in locked period {locked}; this dry run is a preview only",
                    request.period
                )
            });
        }
        if request.mode.is_commit() && guard.is_none() {
            return Err(ClosureError::RunInProgress(request.period.to_string()));
        }

        if request.period.kind() == PeriodKind::Annual {
            let open = self
                .locks
                .open_months(request.period.company_id, request.period.year)
                .await?;
            if !open.is_empty() {
                let months: Vec<String> = open.iter().map(u32::to_string).collect();
                warnings.push(format!(
                    "months not yet closed in {}: {}",
                    request.period.year,
                    months.join(", ")
                ));
            }
            self.check_distribution(request, run_id).await?;
        }

        Ok(Preflight { guard, warnings })
    }

    /// The locked period that closes `key`: the period itself or, for a
    /// month, its fiscal year.
    async fn locked_scope(&self, key: &PeriodKey) -> Result<Option<PeriodKey>, ClosureError> {
        if self.locks.period(key).await?.is_locked() {
            return Ok(Some(*key));
        }
        if key.kind() == PeriodKind::Monthly {
            let year = key.year_key();
            if self.locks.period(&year).await?.is_locked() {
                return Ok(Some(year));
            }
        }
        Ok(None)
    }

    /// Previews P&L and tax so that an over-allocation is rejected before
    /// anything is posted. Step failures here are left to the real run.
    async fn check_distribution(
        &self,
        request: &ClosureRequest,
        run_id: ClosureRunId,
    ) -> Result<(), ClosureError> {
        let mut context = ClosureContext::default();
        for descriptor in ANNUAL_STEPS
            .iter()
            .take_while(|step| step.id != StepId::ProfitDistribution)
        {
            let StepAction::Execute(executor) = descriptor.action else {
                continue;
            };
            let input = self.step_input(request, run_id, &context);
            match executor.execute(&input).await {
                Ok(output) => context.record(&output.figures),
                Err(err) => {
                    debug!(step = %descriptor.id, error = %err, "Distribution pre-check inconclusive");
                    return Ok(());
                }
            }
        }
        distribute(
            context.net_profit(),
            &request.options.annual().profit_distribution,
        )
        .map(|_| ())
    }

    fn step_input<'a>(
        &'a self,
        request: &'a ClosureRequest,
        run_id: ClosureRunId,
        context: &'a ClosureContext,
    ) -> StepInput<'a> {
        StepInput {
            request,
            run_id,
            settings: &self.settings,
            sources: &self.sources,
            context,
        }
    }

    async fn execute_plan(
        &self,
        request: &ClosureRequest,
        plan: &[StepDescriptor],
        run: &mut ClosureRun,
    ) {
        let mut context = ClosureContext::default();
        let mut committed = false;

        for (index, descriptor) in plan.iter().enumerate() {
            if (descriptor.skip)(&request.options) {
                debug!(run_id = %run.id, step = %descriptor.id, "Step skipped");
                run.steps[index].status = StepStatus::Skipped;
                continue;
            }

            debug!(run_id = %run.id, step = %descriptor.id, "Step running");
            run.steps[index].status = StepStatus::Running;
            run.steps[index].started_at = Some(Utc::now());

            let result = match descriptor.action {
                StepAction::Execute(executor) => {
                    self.execute_step(executor, request, run.id, &context).await
                }
                StepAction::LockPeriod => self
                    .locks
                    .run_step(request, run.id)
                    .await
                    .map(|output| StepCompletion {
                        output,
                        postings: Vec::new(),
                        fresh: 0,
                    })
                    .map_err(StepFailure::from),
            };

            let step = &mut run.steps[index];
            step.finished_at = Some(Utc::now());
            match result {
                Ok(StepCompletion {
                    output,
                    postings,
                    fresh,
                }) => {
                    committed |= fresh > 0;
                    for warning in &output.warnings {
                        warn!(run_id = %run.id, step = %descriptor.id, warning = %warning, "Step warning");
                    }
                    context.record(&output.figures);
                    step.status = StepStatus::Success;
                    step.result = Some(output.figures);
                    step.journal_entries = output.postings;
                    step.postings = postings;
                    step.warnings = output.warnings;
                    debug!(run_id = %run.id, step = %descriptor.id, "Step succeeded");
                }
                Err(StepFailure {
                    error,
                    postings,
                    fresh,
                }) => {
                    committed |= fresh > 0;
                    let detail = RunError::from_error(Some(descriptor.id), &error);
                    step.status = StepStatus::Error;
                    step.postings = postings;
                    step.error = Some(detail.clone());
                    run.errors.push(detail);
                    run.status = if committed {
                        RunStatus::PartialFailure
                    } else {
                        RunStatus::Failed
                    };
                    run.year_end_result = context.year_end_result();
                    warn!(
                        run_id = %run.id,
                        step = %descriptor.id,
                        error = %error,
                        status = ?run.status,
                        "Closure run halted"
                    );
                    return;
                }
            }
        }

        run.status = RunStatus::Success;
        run.year_end_result = context.year_end_result();
    }

    /// Runs an executor, validates its postings and submits them in a commit.
    ///
    /// A posting whose source is already recorded for the period, left by an
    /// earlier run that halted, is not submitted again; the recorded entry is
    /// reported instead.
    async fn execute_step(
        &self,
        executor: &dyn StepExecutor,
        request: &ClosureRequest,
        run_id: ClosureRunId,
        context: &ClosureContext,
    ) -> Result<StepCompletion, StepFailure> {
        let input = self.step_input(request, run_id, context);
        let mut output = executor.execute(&input).await?;

        for posting in &output.postings {
            validate_posting(posting).map_err(ClosureError::InvalidPosting)?;
        }

        let commit = request.mode.is_commit();
        let mut postings = Vec::with_capacity(output.postings.len());
        let mut fresh = 0;
        let mut notes = Vec::new();
        for posting in &output.postings {
            let recorded = self
                .sources
                .ledger
                .postings_for(&posting.period, &posting.source)
                .await
                .map_err(|err| ClosureError::unavailable("account ledger", err))?;
            if !recorded.is_empty() {
                notes.push(if commit {
                    format!(
                        "{} entry for {} is already in the ledger; not posted again",
                        posting.source, posting.period
                    )
                } else {
                    format!(
                        "{} entry for {} is already in the ledger; a commit would not post it again",
                        posting.source, posting.period
                    )
                });
                if commit {
                    postings.extend(recorded);
                }
                continue;
            }
            if !commit {
                continue;
            }

            match self.gateway.post(posting).await {
                Ok(reference) => {
                    debug!(
                        run_id = %run_id,
                        posting_id = %reference.posting_id,
                        source = %reference.source,
                        amount = %reference.amount,
                        "Posting accepted"
                    );
                    postings.push(reference);
                    fresh += 1;
                }
                Err(err) => {
                    return Err(StepFailure {
                        error: ClosureError::Posting(err),
                        postings,
                        fresh,
                    });
                }
            }
        }
        output.warnings.extend(notes);
        Ok(StepCompletion {
            output,
            postings,
            fresh,
        })
    }
}
