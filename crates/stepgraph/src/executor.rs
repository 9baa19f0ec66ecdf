//! Execution engine - drives steps through check/plan/apply in dependency order
//!
//! Ready steps (all dependencies finished) are dispatched to a rayon pool of
//! `jobs` workers. The calling thread collects completions, releases the
//! dependents whose in-degree drops to zero, and marks dependents of failed
//! or skipped steps as skipped without running them.

use crate::context::{NoProgress, ProgressCallback, RunContext};
use crate::error::{ErrorCode, ExecuteError, StepError};
use crate::graph::StepGraph;
use crate::step::Step;
use crate::step_id::StepId;
use crate::types::{Diff, ExecuteOptions, ExecuteSummary, RunMode, StepStatus};
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Final result of one step in a run
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub id: StepId,
    pub description: String,
    pub status: StepStatus,
    /// What `plan` reported, when it was called
    pub diff: Option<Diff>,
    #[serde(skip)]
    pub error: Option<StepError>,
    /// Why the step was skipped
    pub reason: Option<String>,
    /// `apply` ran and changed the system (never true on dry runs)
    pub applied: bool,
    pub rolled_back: bool,
    pub duration: Duration,
}

impl StepOutcome {
    fn new(step: &dyn Step) -> Self {
        Self {
            id: step.id().clone(),
            description: step.description(),
            status: StepStatus::Unknown,
            diff: None,
            error: None,
            reason: None,
            applied: false,
            rolled_back: false,
            duration: Duration::ZERO,
        }
    }

    fn skipped(step: &dyn Step, reason: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Skipped,
            reason: Some(reason.into()),
            ..Self::new(step)
        }
    }

    fn failed(mut self, code: ErrorCode, message: &str, cause: anyhow::Error) -> Self {
        let error = StepError::new(code, message)
            .with_provider(self.id.provider())
            .with_step(&self.id)
            .with_anyhow(cause);
        log::warn!("{error}");
        self.status = StepStatus::Failed;
        self.error = Some(error);
        self
    }

    /// Attach a diagnostic when check reported a broken state without erroring
    fn failed_state(self, step: &dyn Step) -> Self {
        if self.status != StepStatus::Failed {
            return self;
        }
        self.failed(
            ErrorCode::CheckFailed,
            "check reported a failed state",
            anyhow::anyhow!("{}", step.description()),
        )
    }

    /// Whether dependents of this step may run
    fn unblocks_dependents(&self) -> bool {
        !matches!(self.status, StepStatus::Failed | StepStatus::Skipped)
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Per-step results, in completion order
    pub outcomes: Vec<StepOutcome>,
    /// Rollbacks that failed after a failed run
    pub rollback_errors: Vec<StepError>,
    pub summary: ExecuteSummary,
}

impl RunReport {
    pub fn outcome(&self, id: &StepId) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome> {
        self.outcomes
            .iter()
            .filter(|o| o.status == StepStatus::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.summary.is_success() && self.rollback_errors.is_empty()
    }

    fn summarize(&mut self) {
        let mut summary = ExecuteSummary::default();
        for outcome in &self.outcomes {
            match outcome.status {
                StepStatus::Satisfied if outcome.applied => summary.applied += 1,
                StepStatus::Satisfied => summary.satisfied += 1,
                StepStatus::NeedsApply | StepStatus::Unknown => summary.pending += 1,
                StepStatus::Failed => summary.failed += 1,
                StepStatus::Skipped => summary.skipped += 1,
            }
            if outcome.rolled_back {
                summary.rolled_back += 1;
            }
        }
        self.summary = summary;
    }
}

/// Execute a graph with the given options and progress callback
///
/// The graph is validated and sorted first: a structurally invalid graph
/// never reaches `apply`.
pub fn execute<P: ProgressCallback>(
    graph: &StepGraph,
    ctx: &RunContext,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<RunReport, ExecuteError> {
    graph.validate()?;
    graph.sorted_indices()?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()?;

    progress.on_run_start(graph.len());
    let mut scheduler = Scheduler::new(graph, ctx, opts);
    pool.in_place_scope(|scope| scheduler.run(scope, progress));

    let mut report = RunReport {
        outcomes: scheduler.completed,
        ..RunReport::default()
    };

    if opts.rollback_on_failure
        && opts.mode == RunMode::Apply
        && !ctx.dry_run()
        && report.failures().next().is_some()
    {
        rollback_applied(graph, ctx, &mut report, progress);
    }

    report.summarize();
    progress.on_run_complete();
    Ok(report)
}

/// Execute without progress reporting
pub fn execute_simple(
    graph: &StepGraph,
    ctx: &RunContext,
    opts: &ExecuteOptions,
) -> Result<RunReport, ExecuteError> {
    execute(graph, ctx, opts, &mut NoProgress)
}

/// Live Kahn frontier for one run
struct Scheduler<'a> {
    graph: &'a StepGraph,
    ctx: &'a RunContext,
    opts: &'a ExecuteOptions,
    in_degree: Vec<usize>,
    /// Some dependency failed or was skipped
    blocked: Vec<bool>,
    ready: VecDeque<usize>,
    completed: Vec<StepOutcome>,
    in_flight: usize,
    halted: bool,
}

impl<'a> Scheduler<'a> {
    fn new(graph: &'a StepGraph, ctx: &'a RunContext, opts: &'a ExecuteOptions) -> Self {
        let in_degree = graph.in_degrees();
        let ready = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(i, _)| i)
            .collect();

        Self {
            graph,
            ctx,
            opts,
            blocked: vec![false; in_degree.len()],
            in_degree,
            ready,
            completed: Vec::with_capacity(graph.len()),
            in_flight: 0,
            halted: false,
        }
    }

    fn run<P: ProgressCallback>(&mut self, scope: &rayon::Scope<'a>, progress: &mut P) {
        let (tx, rx) = mpsc::channel::<(usize, StepOutcome)>();

        loop {
            while let Some(i) = self.ready.pop_front() {
                let graph = self.graph;
                let step = graph.step_at(i);

                if let Some(reason) = self.skip_reason(i) {
                    log::debug!("Skipping {}: {reason}", step.id());
                    self.finish(i, StepOutcome::skipped(step, reason), progress);
                    continue;
                }

                log::debug!("Dispatching {}", step.id());
                progress.on_step_start(step.id(), &step.description());
                self.in_flight += 1;

                let tx = tx.clone();
                let ctx = self.ctx.clone();
                let mode = self.opts.mode;
                scope.spawn(move |_| {
                    let outcome = run_guarded(step, &ctx, mode);
                    // The receiver outlives every spawned task
                    let _ = tx.send((i, outcome));
                });
            }

            if self.in_flight == 0 {
                break;
            }

            let Ok((i, outcome)) = rx.recv() else {
                break;
            };
            self.in_flight -= 1;

            if outcome.status == StepStatus::Failed && self.opts.fail_fast {
                self.halted = true;
            }
            self.finish(i, outcome, progress);
        }
    }

    fn skip_reason(&self, i: usize) -> Option<&'static str> {
        if self.blocked[i] {
            Some("a dependency failed or was skipped")
        } else if self.ctx.is_cancelled() {
            Some("run cancelled")
        } else if self.halted {
            Some("run halted after a failure")
        } else {
            None
        }
    }

    /// Record an outcome and release dependents
    fn finish<P: ProgressCallback>(&mut self, i: usize, outcome: StepOutcome, progress: &mut P) {
        let unblocks = outcome.unblocks_dependents();
        let graph = self.graph;

        for dependent in graph.dependents(graph.step_at(i).id()) {
            let Some(j) = graph.index_of(dependent) else {
                continue;
            };
            if !unblocks {
                self.blocked[j] = true;
            }
            self.in_degree[j] -= 1;
            if self.in_degree[j] == 0 {
                self.ready.push_back(j);
            }
        }

        progress.on_step_complete(&outcome);
        self.completed.push(outcome);
    }
}

/// Run one step, turning a panic into a failed outcome
fn run_guarded(step: &dyn Step, ctx: &RunContext, mode: RunMode) -> StepOutcome {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_step(step, ctx, mode)));
    let mut outcome = match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            StepOutcome::new(step).failed(
                ErrorCode::ApplyFailed,
                "step panicked",
                anyhow::anyhow!(message),
            )
        }
    };
    outcome.duration = started.elapsed();
    outcome
}

/// check → plan → apply for a single step
fn run_step(step: &dyn Step, ctx: &RunContext, mode: RunMode) -> StepOutcome {
    let mut outcome = StepOutcome::new(step);

    let status = match step.check(ctx) {
        Ok(status) => status,
        Err(e) => return outcome.failed(ErrorCode::CheckFailed, "check failed", e),
    };
    outcome.status = status;

    if !status.needs_action() {
        return outcome;
    }

    if mode == RunMode::Check {
        return outcome.failed_state(step);
    }

    match step.plan(ctx) {
        Ok(diff) => outcome.diff = Some(diff),
        Err(e) => return outcome.failed(ErrorCode::PlanFailed, "plan failed", e),
    }

    if mode == RunMode::Plan {
        return outcome.failed_state(step);
    }

    if ctx.is_cancelled() {
        outcome.status = StepStatus::Skipped;
        outcome.reason = Some("run cancelled".to_string());
        return outcome;
    }

    if let Err(e) = step.apply(ctx) {
        return outcome.failed(ErrorCode::ApplyFailed, "apply failed", e);
    }

    if ctx.dry_run() {
        // Nothing changed; keep reporting the pending check status
        if outcome.status == StepStatus::Failed {
            outcome.status = StepStatus::NeedsApply;
        }
    } else {
        outcome.status = StepStatus::Satisfied;
        outcome.applied = true;
    }
    outcome
}

/// Undo applied steps, newest first
fn rollback_applied<P: ProgressCallback>(
    graph: &StepGraph,
    ctx: &RunContext,
    report: &mut RunReport,
    progress: &mut P,
) {
    for outcome in report.outcomes.iter_mut().rev() {
        if !outcome.applied {
            continue;
        }
        let Some(step) = graph.get(&outcome.id) else {
            continue;
        };
        if let Some(rollbackable) = step.as_rollbackable()
            && rollbackable.can_rollback()
        {
            log::info!("Rolling back {}", outcome.id);
            let result = rollbackable.rollback(ctx);
            progress.on_rollback(&outcome.id, &result);
            match result {
                Ok(()) => outcome.rolled_back = true,
                Err(e) => report.rollback_errors.push(
                    StepError::new(ErrorCode::ApplyFailed, "rollback failed")
                        .with_provider(outcome.id.provider())
                        .with_step(&outcome.id)
                        .with_anyhow(e)
                        .with_suggestion("Inspect the resource manually; it may be half-reverted"),
                ),
            }
        }
    }
}
