//! Engine commands
//!
//! - `check` - report every step's current status
//! - `plan` - preview what apply would change
//! - `apply` - make the system match the manifest
//! - `explain` - describe what a step does
//! - `graph` - print the compiled step graph

use anyhow::{Result, bail};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use stepgraph::{
    ExecuteOptions, ExecuteSummary, ExplainContext, Explanation, NoProgress, ProgressCallback,
    RunContext, RunMode, RunReport, Step, StepError, StepGraph, StepId, StepOutcome, StepStatus,
    executor,
};

use crate::Context;
use crate::cli::{ApplyArgs, ExplainArgs, GraphArgs};
use crate::config::{self, LoadedManifest};
use crate::providers;
use crate::ui;

// ============================================================================
// Loading
// ============================================================================

/// Load the manifest and compile it with every built-in provider
fn load_graph(ctx: &Context) -> Result<(LoadedManifest, StepGraph)> {
    let loaded = config::load(ctx.config.as_deref(), &ctx.overlays)?;
    let compiler = providers::compiler();

    match compiler.compile_with_context(&loaded.compile_context()) {
        Ok(graph) => {
            log::info!(
                "Compiled {} from {}",
                ui::plural(graph.len(), "step"),
                loaded.provenance()
            );
            Ok((loaded, graph))
        }
        Err(e) => {
            eprintln!("{}", StepError::from_compile(e).format());
            bail!("Could not compile {}", loaded.provenance())
        }
    }
}

fn run(
    graph: &StepGraph,
    run_ctx: &RunContext,
    opts: &ExecuteOptions,
    progress: &mut impl ProgressCallback,
) -> Result<RunReport> {
    executor::execute(graph, run_ctx, opts, progress).map_err(|e| {
        if let stepgraph::ExecuteError::InvalidGraph(graph_err) = &e {
            eprintln!("{}", StepError::from_graph(graph_err).format());
        }
        anyhow::Error::new(e)
    })
}

// ============================================================================
// check
// ============================================================================

pub fn check(ctx: &Context) -> Result<()> {
    let (loaded, graph) = load_graph(ctx)?;
    let opts = ExecuteOptions {
        mode: RunMode::Check,
        ..ExecuteOptions::default()
    };
    let run_ctx = RunContext::new().with_verbose(ctx.verbose > 0);
    let report = run(&graph, &run_ctx, &opts, &mut NoProgress)?;

    if !ctx.quiet {
        ui::header(&format!("Check: {}", loaded.provenance()));
        for outcome in in_graph_order(&graph, &report) {
            print_status_line(ctx, outcome);
        }
        print_summary(&report.summary, RunMode::Check, false);
    }

    report_failures(&report)
}

// ============================================================================
// plan
// ============================================================================

pub fn plan(ctx: &Context) -> Result<()> {
    let (loaded, graph) = load_graph(ctx)?;
    let report = plan_report(ctx, &graph)?;

    if !ctx.quiet {
        ui::header(&format!("Plan: {}", loaded.provenance()));
        print_plan(ctx, &graph, &report);
        print_summary(&report.summary, RunMode::Plan, false);
    }

    report_failures(&report)
}

fn plan_report(ctx: &Context, graph: &StepGraph) -> Result<RunReport> {
    let opts = ExecuteOptions {
        mode: RunMode::Plan,
        ..ExecuteOptions::default()
    };
    let run_ctx = RunContext::new().with_verbose(ctx.verbose > 0);
    run(graph, &run_ctx, &opts, &mut NoProgress)
}

fn print_plan(ctx: &Context, graph: &StepGraph, report: &RunReport) {
    let mut changes = 0;
    for outcome in in_graph_order(graph, report) {
        match (&outcome.diff, outcome.status) {
            (Some(diff), _) if diff.has_change() => {
                changes += 1;
                println!("  {}", ui::diff_line(diff));
                if ctx.verbose > 0 {
                    ui::dim(&format!("{} ({})", outcome.id, outcome.description));
                }
            }
            (_, StepStatus::Failed | StepStatus::Skipped) => print_status_line(ctx, outcome),
            _ if ctx.verbose > 0 => print_status_line(ctx, outcome),
            _ => {}
        }
    }
    if changes == 0 {
        ui::success("No changes - everything is up to date");
    }
}

// ============================================================================
// apply
// ============================================================================

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let (loaded, graph) = load_graph(ctx)?;

    // Preview first
    let preview = plan_report(ctx, &graph)?;
    if !ctx.quiet {
        ui::header(&format!("Apply: {}", loaded.provenance()));
        print_plan(ctx, &graph, &preview);
    }
    if preview.summary.pending == 0 {
        return report_failures(&preview);
    }

    if args.dry_run {
        if !ctx.quiet {
            ui::warn("Dry run - nothing will be changed");
        }
    } else if !args.yes && !confirm_proceed()? {
        ui::info("Aborted");
        return Ok(());
    }

    let opts = ExecuteOptions {
        mode: RunMode::Apply,
        jobs: args.jobs,
        fail_fast: args.fail_fast,
        rollback_on_failure: args.rollback,
    };
    let run_ctx = RunContext::new()
        .with_dry_run(args.dry_run)
        .with_verbose(ctx.verbose > 0);

    let mut progress = ApplyProgress::new(ctx.quiet)?;
    let report = run(&graph, &run_ctx, &opts, &mut progress)?;

    if !ctx.quiet {
        print_summary(&report.summary, RunMode::Apply, args.dry_run);
    }
    report_failures(&report)
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Progress bar driven by the executor's callbacks
struct ApplyProgress {
    bar: ProgressBar,
}

impl ApplyProgress {
    fn new(quiet: bool) -> Result<Self> {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("=>-"),
            );
            bar
        };
        Ok(Self { bar })
    }
}

impl ProgressCallback for ApplyProgress {
    fn on_run_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_step_start(&mut self, id: &StepId, _description: &str) {
        self.bar.set_message(id.to_string());
    }

    fn on_step_complete(&mut self, outcome: &StepOutcome) {
        self.bar.inc(1);
        match outcome.status {
            StepStatus::Satisfied if outcome.applied => {
                self.bar
                    .println(format!("{} {}", "✓".green(), outcome.description));
            }
            StepStatus::Failed => {
                self.bar
                    .println(format!("{} {}", "✗".red(), outcome.description));
            }
            _ => {}
        }
    }

    fn on_rollback(&mut self, id: &StepId, result: &Result<()>) {
        match result {
            Ok(()) => self.bar.println(format!("{} rolled back {id}", "↺".yellow())),
            Err(e) => self
                .bar
                .println(format!("{} rollback of {id} failed: {e:#}", "✗".red())),
        }
    }

    fn on_run_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}

// ============================================================================
// explain
// ============================================================================

pub fn explain(ctx: &Context, args: &ExplainArgs) -> Result<()> {
    let (loaded, graph) = load_graph(ctx)?;
    let explain_ctx = ExplainContext::new()
        .with_verbose(ctx.verbose > 0)
        .with_provenance(loaded.provenance());

    let steps: Vec<&dyn Step> = match &args.step {
        Some(raw) => {
            let id = StepId::new(raw)?;
            match graph.get(&id) {
                Some(step) => vec![step],
                None => bail!("No step {id} in {}", loaded.provenance()),
            }
        }
        None => graph.topological_sort()?,
    };

    for step in steps {
        let explanation = explained(step, &explain_ctx);
        print_explanation(step, &graph, &explanation);
    }
    Ok(())
}

/// A step's explanation, stamped with the manifest it came from
fn explained(step: &dyn Step, ctx: &ExplainContext) -> Explanation {
    let explanation = step.explain(ctx);
    if explanation.provenance().is_empty() {
        explanation.with_provenance(ctx.provenance())
    } else {
        explanation
    }
}

fn print_explanation(step: &dyn Step, graph: &StepGraph, explanation: &Explanation) {
    ui::section(step.id().as_str());
    println!("  {}", explanation.summary());
    if !explanation.detail().is_empty() {
        println!();
        println!("  {}", explanation.detail());
    }
    if !explanation.tradeoffs().is_empty() {
        println!();
        for tradeoff in explanation.tradeoffs() {
            println!("  {} {}", "•".yellow(), tradeoff);
        }
    }
    if !step.depends_on().is_empty() {
        let deps: Vec<_> = step.depends_on().iter().map(StepId::as_str).collect();
        ui::kv("Depends on", &deps.join(", "));
    }
    let dependents = graph.dependents(step.id());
    if !dependents.is_empty() {
        let names: Vec<_> = dependents.iter().map(StepId::as_str).collect();
        ui::kv("Needed by", &names.join(", "));
    }
    for link in explanation.doc_links() {
        ui::kv("Docs", link);
    }
    if !explanation.provenance().is_empty() {
        ui::kv("From", explanation.provenance());
    }
}

// ============================================================================
// graph
// ============================================================================

pub fn graph(ctx: &Context, args: &GraphArgs) -> Result<()> {
    let (_, graph) = load_graph(ctx)?;

    if args.dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    for step in graph.topological_sort()? {
        println!("{}", step.id().as_str().bold());
        for dep in step.depends_on() {
            println!("  {} {}", "←".dimmed(), dep);
        }
    }
    Ok(())
}

// ============================================================================
// Output helpers
// ============================================================================

/// Outcomes in step insertion order instead of completion order
fn in_graph_order<'a>(graph: &StepGraph, report: &'a RunReport) -> Vec<&'a StepOutcome> {
    graph
        .ids()
        .filter_map(|id| report.outcome(id))
        .collect()
}

fn print_status_line(ctx: &Context, outcome: &StepOutcome) {
    let mut line = format!("  {} {}", ui::status_label(outcome.status), outcome.id);
    if ctx.verbose > 0 {
        line.push_str(&format!(" {}", outcome.description.dimmed()));
    }
    if let Some(reason) = &outcome.reason {
        line.push_str(&format!(" {}", format!("({reason})").dimmed()));
    }
    println!("{line}");
}

/// Human-readable counts for a run
fn summary_parts(summary: &ExecuteSummary, mode: RunMode, dry_run: bool) -> Vec<String> {
    let pending_label = match mode {
        RunMode::Check => "need attention",
        RunMode::Plan => "to change",
        RunMode::Apply if dry_run => "would change",
        RunMode::Apply => "pending",
    };
    [
        (summary.satisfied, "up to date"),
        (summary.applied, "applied"),
        (summary.pending, pending_label),
        (summary.failed, "failed"),
        (summary.skipped, "skipped"),
        (summary.rolled_back, "rolled back"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{count} {label}"))
    .collect()
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, mode: RunMode, dry_run: bool) {
    println!();
    let parts = summary_parts(summary, mode, dry_run);
    let line = if parts.is_empty() {
        "nothing to do".to_string()
    } else {
        parts.join(", ")
    };
    let total = ui::plural(summary.total(), "step");
    if summary.is_success() {
        println!("  {} {}: {}", "✓".green().bold(), total, line);
    } else {
        println!("  {} {}: {}", "⚠".yellow().bold(), total, line);
    }
}

/// Print step diagnostics and turn failures into a non-zero exit
fn report_failures(report: &RunReport) -> Result<()> {
    for outcome in report.failures() {
        if let Some(error) = &outcome.error {
            eprintln!();
            eprintln!("{}", error.format());
        }
    }
    for error in &report.rollback_errors {
        eprintln!();
        eprintln!("{}", error.format());
    }

    if report.is_success() {
        Ok(())
    } else {
        let failed = report.summary.failed + report.rollback_errors.len();
        bail!("{} failed", ui::plural(failed, "step"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn context_for(manifest: &std::path::Path) -> Context {
        Context {
            verbose: 0,
            quiet: true,
            config: Some(manifest.to_path_buf()),
            overlays: Vec::new(),
        }
    }

    fn write_manifest(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("hearth.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_summary_parts() {
        let summary = ExecuteSummary {
            satisfied: 2,
            applied: 1,
            pending: 3,
            ..ExecuteSummary::default()
        };
        assert_eq!(
            summary_parts(&summary, RunMode::Apply, true),
            ["2 up to date", "1 applied", "3 would change"]
        );
        assert_eq!(summary_parts(&summary, RunMode::Plan, false)[2], "3 to change");
        assert!(summary_parts(&ExecuteSummary::default(), RunMode::Check, false).is_empty());
    }

    #[test]
    fn test_load_graph_reports_compile_errors() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "[[exec]]\nname = \"a\"\nrun = \"true\"\ndepends_on = [\"exec:run:missing\"]\n",
        );
        let err = load_graph(&context_for(&path)).unwrap_err();
        assert!(err.to_string().starts_with("Could not compile"));
    }

    #[test]
    fn test_in_graph_order_follows_insertion() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "[[exec]]\nname = \"b\"\nrun = \"true\"\nunless = \"true\"\n\n\
             [[exec]]\nname = \"a\"\nrun = \"true\"\nunless = \"true\"\n",
        );
        let ctx = context_for(&path);
        let (_, graph) = load_graph(&ctx).unwrap();
        let report = plan_report(&ctx, &graph).unwrap();
        let order: Vec<_> = in_graph_order(&graph, &report)
            .iter()
            .map(|o| o.id.to_string())
            .collect();
        assert_eq!(order, ["exec:run:b", "exec:run:a"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_runs_pending_steps() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let path = write_manifest(
            &dir,
            &format!(
                "[[exec]]\nname = \"mark\"\nrun = \"touch '{m}'\"\nunless = \"test -e '{m}'\"\n",
                m = marker.display()
            ),
        );
        let ctx = context_for(&path);
        let args = ApplyArgs {
            dry_run: true,
            yes: true,
            jobs: 2,
            fail_fast: false,
            rollback: false,
        };
        apply(&ctx, &args).unwrap();
        assert!(!marker.exists());

        apply(&ctx, &ApplyArgs { dry_run: false, ..args }).unwrap();
        assert!(marker.exists());

        check(&ctx).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_apply_failure_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(
            &dir,
            "[[exec]]\nname = \"boom\"\nrun = \"exit 1\"\nunless = \"false\"\n",
        );
        let args = ApplyArgs {
            dry_run: false,
            yes: true,
            jobs: 1,
            fail_fast: true,
            rollback: true,
        };
        let err = apply(&context_for(&path), &args).unwrap_err();
        assert_eq!(err.to_string(), "1 step failed");
    }

    #[test]
    fn test_explained_stamps_provenance() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(&dir, "[[exec]]\nname = \"x\"\nrun = \"true\"\n");
        let (loaded, graph) = load_graph(&context_for(&path)).unwrap();
        let step = graph.get(&StepId::must("exec:run:x")).unwrap();
        let explanation = explained(step, &ExplainContext::new().with_provenance(loaded.provenance()));
        assert_eq!(explanation.provenance(), path.display().to_string());
    }
}
