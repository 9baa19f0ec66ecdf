//! Error types for step compilation and execution
//!
//! Structural errors (`StepIdError`, `GraphError`, `CompileError`) are plain
//! enums callers can match on. `StepError` is the user-facing diagnostic
//! layered on top of them: a taxonomy code, optional provider/step context,
//! an actionable suggestion and the wrapped cause.

use crate::step_id::StepId;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from constructing a [`StepId`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepIdError {
    /// Input was empty or only whitespace
    #[error("step ID cannot be empty")]
    Empty,

    /// Input does not match `provider:action:resource[:...]`
    #[error("invalid step ID {0:?}: expected provider:action:resource")]
    Invalid(String),
}

/// Structural errors raised by [`crate::StepGraph`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A step with the same ID was already added
    #[error("duplicate step: {id}")]
    DuplicateStep { id: StepId },

    /// A step depends on an ID that was never added
    #[error("missing dependency: step {step} depends on {dependency}")]
    MissingDependency { step: StepId, dependency: StepId },

    /// The dependency edges form at least one cycle
    #[error("cyclic dependency among steps: {}", join_ids(.steps))]
    CyclicDependency { steps: Vec<StepId> },
}

impl GraphError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateStep { .. })
    }

    pub fn is_missing_dependency(&self) -> bool {
        matches!(self, Self::MissingDependency { .. })
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::CyclicDependency { .. })
    }
}

fn join_ids(ids: &[StepId]) -> String {
    ids.iter().map(StepId::as_str).collect::<Vec<_>>().join(", ")
}

/// Errors that abort a [`crate::Compiler`] run
#[derive(Error, Debug)]
pub enum CompileError {
    /// A provider's `compile` returned an error
    #[error("provider {provider:?}: {source:#}")]
    Provider {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    /// A provider emitted a step whose ID another provider (or itself) already used
    #[error("provider {provider:?}: step {id:?}: {source}")]
    DuplicateStep {
        provider: String,
        id: StepId,
        #[source]
        source: GraphError,
    },

    /// The assembled graph failed validation or sorting
    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl CompileError {
    /// Name of the provider that caused the failure, if one did
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Provider { provider, .. } | Self::DuplicateStep { provider, .. } => {
                Some(provider)
            }
            Self::Graph(_) => None,
        }
    }

    /// The underlying graph error, for structural failures
    pub fn graph_error(&self) -> Option<&GraphError> {
        match self {
            Self::DuplicateStep { source, .. } | Self::Graph(source) => Some(source),
            Self::Provider { .. } => None,
        }
    }
}

/// Errors that prevent an execution run from starting
#[derive(Error, Debug)]
pub enum ExecuteError {
    /// The graph is structurally invalid; nothing was run
    #[error("refusing to execute an invalid plan: {0}")]
    InvalidGraph(#[from] GraphError),

    /// The worker pool could not be created
    #[error("failed to create worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Taxonomy of user-facing diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ProviderFailed,
    StepDuplicate,
    StepNotFound,
    DependencyMissing,
    CyclicDependency,
    CompileFailed,
    PlanFailed,
    ApplyFailed,
    CheckFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProviderFailed => "PROVIDER_FAILED",
            Self::StepDuplicate => "STEP_DUPLICATE",
            Self::StepNotFound => "STEP_NOT_FOUND",
            Self::DependencyMissing => "DEPENDENCY_MISSING",
            Self::CyclicDependency => "CYCLIC_DEPENDENCY",
            Self::CompileFailed => "COMPILE_FAILED",
            Self::PlanFailed => "PLAN_FAILED",
            Self::ApplyFailed => "APPLY_FAILED",
            Self::CheckFailed => "CHECK_FAILED",
        }
    }

    /// Actionable advice attached to errors of this code by default
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::ProviderFailed => "Check the provider's configuration section for typos or invalid values",
            Self::StepDuplicate => "Remove the duplicate entry or give one of them a distinct name",
            Self::StepNotFound => "Run 'hearth plan' to list the step IDs in this configuration",
            Self::DependencyMissing => "Declare the missing step or remove it from depends_on",
            Self::CyclicDependency => "Break the cycle by removing one of the depends_on edges",
            Self::CompileFailed => "Fix the configuration errors above and run the command again",
            Self::PlanFailed => "Run with -vv to see why the change could not be described",
            Self::ApplyFailed => "Fix the underlying problem and re-run apply; completed steps are skipped",
            Self::CheckFailed => "Make sure the tool this step probes is installed and on PATH",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Structured, user-facing error value
///
/// Every `with_*` method returns a new value, so a base error can be kept
/// around as a template and specialised per provider or step.
#[derive(Debug, Clone)]
pub struct StepError {
    code: ErrorCode,
    message: String,
    provider: Option<String>,
    step_id: Option<StepId>,
    suggestion: Option<String>,
    underlying: Option<Cause>,
}

impl StepError {
    /// Create an error with the code's default suggestion
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            step_id: None,
            suggestion: Some(code.suggestion().to_string()),
            underlying: None,
        }
    }

    pub fn with_provider(&self, provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            ..self.clone()
        }
    }

    pub fn with_step(&self, step_id: &StepId) -> Self {
        Self {
            step_id: Some(step_id.clone()),
            ..self.clone()
        }
    }

    pub fn with_suggestion(&self, suggestion: impl Into<String>) -> Self {
        Self {
            suggestion: Some(suggestion.into()),
            ..self.clone()
        }
    }

    pub fn with_message(&self, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..self.clone()
        }
    }

    /// Attach a cause from any standard error
    pub fn with_cause<E>(&self, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            underlying: Some(Arc::new(cause)),
            ..self.clone()
        }
    }

    /// Attach an `anyhow` error as the cause, keeping its full chain
    pub fn with_anyhow(&self, cause: anyhow::Error) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = cause.into();
        Self {
            underlying: Some(Arc::from(boxed)),
            ..self.clone()
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn step_id(&self) -> Option<&StepId> {
        self.step_id.as_ref()
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    pub fn underlying(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.underlying.as_deref()
    }

    /// Multi-line diagnostic for terminal output
    pub fn format(&self) -> String {
        let mut out = format!("Error [{}]: {}", self.code, self.message);
        if let Some(provider) = &self.provider {
            out.push_str(&format!("\n  Provider:   {provider}"));
        }
        if let Some(step_id) = &self.step_id {
            out.push_str(&format!("\n  Step:       {step_id}"));
        }
        if let Some(cause) = &self.underlying {
            out.push_str(&format!("\n  Cause:      {cause}"));
            let mut source = cause.source();
            while let Some(inner) = source {
                out.push_str(&format!("\n              {inner}"));
                source = inner.source();
            }
        }
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("\n  Suggestion: {suggestion}"));
        }
        out
    }

    /// Diagnostic for a structural graph failure
    pub fn from_graph(err: &GraphError) -> Self {
        let base = match err {
            GraphError::DuplicateStep { id } => {
                Self::new(ErrorCode::StepDuplicate, err.to_string()).with_step(id)
            }
            GraphError::MissingDependency { step, .. } => {
                Self::new(ErrorCode::DependencyMissing, err.to_string()).with_step(step)
            }
            GraphError::CyclicDependency { .. } => {
                Self::new(ErrorCode::CyclicDependency, err.to_string())
            }
        };
        base.with_cause(err.clone())
    }

    /// Diagnostic for a failed compilation
    pub fn from_compile(err: CompileError) -> Self {
        match err {
            CompileError::Provider { provider, source } => {
                Self::new(ErrorCode::ProviderFailed, "provider failed to compile its section")
                    .with_provider(provider)
                    .with_anyhow(source)
            }
            CompileError::DuplicateStep {
                provider, source, ..
            } => Self::from_graph(&source).with_provider(provider),
            CompileError::Graph(source) => Self::from_graph(&source),
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.provider, &self.step_id) {
            (Some(provider), Some(step_id)) => write!(
                f,
                "provider {provider:?}, step {:?}: {}",
                step_id.as_str(),
                self.message
            ),
            (Some(provider), None) => write!(f, "provider {provider:?}: {}", self.message),
            (None, Some(step_id)) => write!(f, "step {:?}: {}", step_id.as_str(), self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl StdError for StepError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.underlying
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}
