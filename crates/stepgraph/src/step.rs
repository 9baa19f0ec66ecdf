//! Step trait for idempotent units of provisioning work
//!
//! A step represents one change to the machine ("install ripgrep", "link
//! ~/.gitconfig"). Providers emit steps; the graph orders them; the
//! executor drives each through check → plan → apply.

use crate::context::{ExplainContext, RunContext};
use crate::step_id::StepId;
use crate::types::{Diff, Explanation, StepStatus};
use anyhow::Result;
use std::fmt;

/// Core trait for every step a provider emits
///
/// # Contract
/// - `check` and `plan` are read-only probes.
/// - `apply` is idempotent: running it again with no external change in
///   between leaves the same end state and returns `Ok`.
/// - `apply` honours [`RunContext::dry_run`] by validating inputs without
///   mutating anything.
///
/// # Example
///
/// ```ignore
/// use stepgraph::{Diff, Explanation, ExplainContext, RunContext, Step, StepId, StepStatus};
///
/// #[derive(Debug)]
/// struct Touch { id: StepId, path: std::path::PathBuf }
///
/// impl Step for Touch {
///     fn id(&self) -> &StepId { &self.id }
///
///     fn check(&self, _ctx: &RunContext) -> anyhow::Result<StepStatus> {
///         Ok(if self.path.exists() { StepStatus::Satisfied } else { StepStatus::NeedsApply })
///     }
///
///     fn plan(&self, _ctx: &RunContext) -> anyhow::Result<Diff> {
///         Ok(Diff::add("file", self.path.display().to_string(), "empty"))
///     }
///
///     fn apply(&self, ctx: &RunContext) -> anyhow::Result<()> {
///         if !ctx.dry_run() && !self.path.exists() {
///             std::fs::write(&self.path, "")?;
///         }
///         Ok(())
///     }
///
///     fn explain(&self, _ctx: &ExplainContext) -> Explanation {
///         Explanation::new(format!("Create {}", self.path.display()))
///     }
/// }
/// ```
pub trait Step: Send + Sync + fmt::Debug {
    /// Identifier, unique within one compilation
    fn id(&self) -> &StepId;

    /// Steps that must finish successfully before this one applies
    fn depends_on(&self) -> &[StepId] {
        &[]
    }

    /// Human-readable one-liner for progress output
    fn description(&self) -> String {
        self.id().to_string()
    }

    /// Probe current state without changing anything
    ///
    /// Probe failures (missing tool, unreadable file) are returned as
    /// errors, never panics.
    fn check(&self, ctx: &RunContext) -> Result<StepStatus>;

    /// Describe what `apply` would do, without side effects
    fn plan(&self, ctx: &RunContext) -> Result<Diff>;

    /// Converge the system to the desired state
    fn apply(&self, ctx: &RunContext) -> Result<()>;

    /// Rationale for this step; pure and infallible
    fn explain(&self, ctx: &ExplainContext) -> Explanation;

    /// Query for the optional rollback capability
    fn as_rollbackable(&self) -> Option<&dyn RollbackableStep> {
        None
    }
}

/// Steps that can undo what they applied
///
/// Implementors also override [`Step::as_rollbackable`] to return `Some(self)`.
pub trait RollbackableStep: Step {
    /// Whether there is anything to undo (false before `apply` ran)
    fn can_rollback(&self) -> bool;

    /// Undo the applied change; a no-op when nothing was applied
    fn rollback(&self, ctx: &RunContext) -> Result<()>;
}

/// A boxed step for type-erased storage
pub type BoxedStep = Box<dyn Step>;
