//! # Stepgraph
//!
//! The compilation and execution engine behind hearth's declarative
//! provisioning.
//!
//! Providers translate sections of a configuration manifest into
//! [`Step`]s. The [`Compiler`] runs every registered provider, assembles
//! their steps into a [`StepGraph`], and rejects the result if any step ID
//! is duplicated, any dependency is missing, or the dependencies form a
//! cycle. The [`executor`] then drives each step through
//! check → plan → apply in dependency order, running independent steps in
//! parallel.
//!
//! ## Core Concepts
//!
//! - **StepId**: validated `provider:action:resource` identifier
//! - **Step**: one idempotent unit of work; optionally a [`RollbackableStep`]
//! - **StepGraph**: dependency DAG over all steps of one compilation
//! - **Provider**: translator from a manifest section to steps
//! - **Compiler**: runs providers and validates the assembled graph
//!
//! ## Example
//!
//! ```ignore
//! use stepgraph::{Compiler, ExecuteOptions, RunContext, executor};
//!
//! let mut compiler = Compiler::new();
//! compiler.register_provider(MyProvider);
//!
//! let graph = compiler.compile(manifest)?;
//! let ctx = RunContext::new().with_dry_run(true);
//! let report = executor::execute_simple(&graph, &ctx, &ExecuteOptions::default())?;
//! println!("{} steps would change", report.summary.pending);
//! ```

pub mod compiler;
pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod resolve;
pub mod step;
pub mod step_id;
pub mod types;

// Re-export main types at crate root
pub use compiler::{Compiler, Provider};
pub use context::{
    Cancellation, CompileContext, ExplainContext, Manifest, NoProgress, ProgressCallback,
    RunContext,
};
pub use error::{CompileError, ErrorCode, ExecuteError, GraphError, StepError, StepIdError};
pub use executor::{RunReport, StepOutcome, execute, execute_simple};
pub use graph::StepGraph;
pub use resolve::{Resolution, ResolutionSource, ResolveError, Resolver};
pub use step::{BoxedStep, RollbackableStep, Step};
pub use step_id::StepId;
pub use types::{
    Diff, DiffType, ExecuteOptions, ExecuteSummary, Explanation, RunMode, StepStatus,
};
