//! Core value types for step checking, planning and execution

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state reported by a step's `check`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    /// The system already matches the desired state
    Satisfied,
    /// `apply` would change something
    NeedsApply,
    /// State could not be determined
    Unknown,
    /// The step failed
    Failed,
    /// The step was not run
    Skipped,
}

impl StepStatus {
    /// Whether the step still requires work
    pub fn needs_action(&self) -> bool {
        matches!(self, Self::NeedsApply | Self::Unknown | Self::Failed)
    }

    /// Whether the state is final for one run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Failed | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Satisfied => "satisfied",
            Self::NeedsApply => "needs-apply",
            Self::Unknown => "unknown",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of change a diff describes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    Add,
    Remove,
    Modify,
    #[default]
    #[serde(alias = "")]
    None,
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Modify => "modify",
            Self::None => "none",
        };
        f.write_str(s)
    }
}

/// Description of the change a step's `apply` would make
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub diff_type: DiffType,
    /// Resource kind, e.g. "formula" or "symlink"
    pub resource: String,
    /// Resource name, e.g. "ripgrep"
    pub name: String,
    pub old_value: String,
    pub new_value: String,
}

impl Diff {
    pub fn add(
        resource: impl Into<String>,
        name: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            diff_type: DiffType::Add,
            resource: resource.into(),
            name: name.into(),
            old_value: String::new(),
            new_value: new_value.into(),
        }
    }

    pub fn remove(
        resource: impl Into<String>,
        name: impl Into<String>,
        old_value: impl Into<String>,
    ) -> Self {
        Self {
            diff_type: DiffType::Remove,
            resource: resource.into(),
            name: name.into(),
            old_value: old_value.into(),
            new_value: String::new(),
        }
    }

    pub fn modify(
        resource: impl Into<String>,
        name: impl Into<String>,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
    ) -> Self {
        Self {
            diff_type: DiffType::Modify,
            resource: resource.into(),
            name: name.into(),
            old_value: old_value.into(),
            new_value: new_value.into(),
        }
    }

    /// A no-op diff for a resource that is already up to date
    pub fn unchanged(resource: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            diff_type: DiffType::None,
            resource: resource.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// True only for a diff that names nothing and changes nothing
    pub fn is_empty(&self) -> bool {
        self.diff_type == DiffType::None && self.resource.is_empty() && self.name.is_empty()
    }

    /// Whether applying would change anything
    pub fn has_change(&self) -> bool {
        self.diff_type != DiffType::None
    }

    /// One-line, `+`/`-`/`~` prefixed rendering
    pub fn summary(&self) -> String {
        match self.diff_type {
            DiffType::Add => format!("+ {} {} ({})", self.resource, self.name, self.new_value),
            DiffType::Remove => format!("- {} {} ({})", self.resource, self.name, self.old_value),
            DiffType::Modify => format!("~ {} {}", self.resource, self.name),
            DiffType::None => format!("  {} {}", self.resource, self.name),
        }
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Human-readable rationale for a step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    summary: String,
    detail: String,
    doc_links: Vec<String>,
    tradeoffs: Vec<String>,
    provenance: String,
}

impl Explanation {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Self::default()
        }
    }

    pub fn with_detail(&self, detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..self.clone()
        }
    }

    pub fn with_doc_links<I, S>(&self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            doc_links: links.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    pub fn with_tradeoffs<I, S>(&self, tradeoffs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tradeoffs: tradeoffs.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    pub fn with_provenance(&self, provenance: impl Into<String>) -> Self {
        Self {
            provenance: provenance.into(),
            ..self.clone()
        }
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn doc_links(&self) -> &[String] {
        &self.doc_links
    }

    pub fn tradeoffs(&self) -> &[String] {
        &self.tradeoffs
    }

    pub fn provenance(&self) -> &str {
        &self.provenance
    }
}

/// How far an execution run goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Probe state only
    Check,
    /// Probe and describe changes
    Plan,
    /// Probe, describe and converge
    #[default]
    Apply,
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub mode: RunMode,
    /// Number of steps that may run at the same time
    pub jobs: usize,
    /// Stop dispatching new steps after the first failure
    pub fail_fast: bool,
    /// Roll back applied steps when any step fails
    pub rollback_on_failure: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Apply,
            jobs: 4,
            fail_fast: false,
            rollback_on_failure: false,
        }
    }
}

/// Counts of step outcomes for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    /// Already in the desired state
    pub satisfied: usize,
    /// Changed by this run
    pub applied: usize,
    /// Would change, but the run did not apply (check/plan mode or dry run)
    pub pending: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rolled_back: usize,
}

impl ExecuteSummary {
    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of steps accounted for
    pub fn total(&self) -> usize {
        self.satisfied + self.applied + self.pending + self.failed + self.skipped
    }
}
