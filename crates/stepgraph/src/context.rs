//! Contexts threaded through provider and step calls, plus callback traits
//!
//! Every context is an immutable value: `with_*` returns a new context and
//! leaves the receiver untouched.

use crate::executor::StepOutcome;
use crate::resolve::{Resolution, Resolver};
use crate::step_id::StepId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Merged configuration manifest, keyed by section
pub type Manifest = serde_json::Map<String, serde_json::Value>;

/// Shared cancellation flag
///
/// Clones observe the same flag. Long-running `apply` implementations should
/// poll [`Cancellation::is_cancelled`] between units of work.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to `check`, `plan`, `apply` and `rollback`
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    dry_run: bool,
    verbose: bool,
    cancellation: Cancellation,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dry_run(&self, dry_run: bool) -> Self {
        Self {
            dry_run,
            ..self.clone()
        }
    }

    pub fn with_verbose(&self, verbose: bool) -> Self {
        Self {
            verbose,
            ..self.clone()
        }
    }

    pub fn with_cancellation(&self, cancellation: Cancellation) -> Self {
        Self {
            cancellation,
            ..self.clone()
        }
    }

    /// When true, `apply` validates inputs but must not mutate anything
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Bail out of long-running work once the run is cancelled
    pub fn check_cancelled(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            anyhow::bail!("run cancelled");
        }
        Ok(())
    }
}

/// Context passed to `explain`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplainContext {
    verbose: bool,
    provenance: String,
}

impl ExplainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(&self, verbose: bool) -> Self {
        Self {
            verbose,
            ..self.clone()
        }
    }

    pub fn with_provenance(&self, provenance: impl Into<String>) -> Self {
        Self {
            provenance: provenance.into(),
            ..self.clone()
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn provenance(&self) -> &str {
        &self.provenance
    }
}

/// Context handed to every provider's `compile`
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    config: Arc<Manifest>,
    provenance: String,
    config_root: PathBuf,
    target: String,
    resolver: Option<Arc<dyn Resolver>>,
}

impl CompileContext {
    pub fn new(config: Manifest) -> Self {
        Self {
            config: Arc::new(config),
            ..Self::default()
        }
    }

    /// The full merged manifest
    pub fn config(&self) -> &Manifest {
        &self.config
    }

    /// A top-level table, or `None` if absent or not a table
    pub fn get_section(&self, key: &str) -> Option<&Manifest> {
        self.config.get(key).and_then(serde_json::Value::as_object)
    }

    /// Which configuration layer produced this context
    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    pub fn with_provenance(&self, provenance: impl Into<String>) -> Self {
        Self {
            provenance: provenance.into(),
            ..self.clone()
        }
    }

    /// Directory relative paths in the manifest are resolved against
    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    pub fn with_config_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: root.into(),
            ..self.clone()
        }
    }

    /// Name of the machine or profile being provisioned
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn with_target(&self, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..self.clone()
        }
    }

    pub fn resolver(&self) -> Option<&Arc<dyn Resolver>> {
        self.resolver.as_ref()
    }

    pub fn with_resolver(&self, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver: Some(resolver),
            ..self.clone()
        }
    }

    /// Resolve a package version, falling back to `latest_version` when no
    /// resolver is configured
    pub fn resolve_version(&self, provider: &str, name: &str, latest_version: &str) -> Resolution {
        match &self.resolver {
            Some(resolver) => resolver.resolve(provider, name, latest_version),
            None => Resolution::latest(provider, name, latest_version),
        }
    }
}

/// Progress callback for execution runs
///
/// Called from the coordinating thread only, so implementations need not
/// be thread-safe.
pub trait ProgressCallback {
    /// Called once before any step is dispatched
    fn on_run_start(&mut self, total: usize);

    /// Called when a step is handed to a worker
    fn on_step_start(&mut self, id: &StepId, description: &str);

    /// Called when a step reaches its final status
    fn on_step_complete(&mut self, outcome: &StepOutcome);

    /// Called when a step is rolled back after a failed run
    fn on_rollback(&mut self, _id: &StepId, _result: &anyhow::Result<()>) {}

    /// Called after the last step completes
    fn on_run_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _total: usize) {}
    fn on_step_start(&mut self, _id: &StepId, _description: &str) {}
    fn on_step_complete(&mut self, _outcome: &StepOutcome) {}
    fn on_run_complete(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ResolutionSource;
    use serde_json::json;

    #[derive(Debug)]
    struct PinnedResolver;

    impl Resolver for PinnedResolver {
        fn resolve(&self, provider: &str, name: &str, _latest: &str) -> Resolution {
            Resolution {
                provider: provider.to_string(),
                name: name.to_string(),
                version: "1.0.0".to_string(),
                source: ResolutionSource::Lockfile,
                locked: true,
                locked_version: "1.0.0".to_string(),
                ..Resolution::default()
            }
        }
    }

    fn manifest() -> Manifest {
        match json!({
            "brew": { "formulae": ["jq"] },
            "name": "laptop",
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_run_context_builders() {
        let base = RunContext::new();
        let dry = base.with_dry_run(true);
        assert!(!base.dry_run());
        assert!(dry.dry_run());
        assert!(!dry.verbose());
    }

    #[test]
    fn test_cancellation_is_shared() {
        let cancel = Cancellation::new();
        let ctx = RunContext::new().with_cancellation(cancel.clone());
        let derived = ctx.with_dry_run(true);
        assert!(!derived.is_cancelled());

        cancel.cancel();
        assert!(ctx.is_cancelled());
        assert!(derived.is_cancelled());
        assert!(derived.check_cancelled().is_err());
    }

    #[test]
    fn test_explain_context_builders() {
        let base = ExplainContext::new();
        let ctx = base.with_verbose(true).with_provenance("overlay.toml");
        assert!(!base.verbose());
        assert!(ctx.verbose());
        assert_eq!(ctx.provenance(), "overlay.toml");
    }

    #[test]
    fn test_get_section() {
        let ctx = CompileContext::new(manifest());
        assert!(ctx.get_section("brew").is_some());
        assert!(ctx.get_section("name").is_none());
        assert!(ctx.get_section("ssh").is_none());
        assert_eq!(ctx.config().len(), 2);
    }

    #[test]
    fn test_compile_context_builders_copy() {
        let base = CompileContext::new(manifest());
        let derived = base
            .with_provenance("base.toml")
            .with_config_root("/etc/hearth")
            .with_target("laptop");

        assert_eq!(base.provenance(), "");
        assert_eq!(derived.provenance(), "base.toml");
        assert_eq!(derived.config_root(), Path::new("/etc/hearth"));
        assert_eq!(derived.target(), "laptop");
        assert!(derived.get_section("brew").is_some());
    }

    #[test]
    fn test_resolve_version_without_resolver() {
        let ctx = CompileContext::new(Manifest::new());
        let res = ctx.resolve_version("brew", "jq", "latest");
        assert_eq!(res.version, "latest");
        assert_eq!(res.source, ResolutionSource::Latest);
    }

    #[test]
    fn test_resolve_version_with_resolver() {
        let ctx = CompileContext::new(Manifest::new()).with_resolver(Arc::new(PinnedResolver));
        let res = ctx.resolve_version("brew", "jq", "latest");
        assert_eq!(res.version, "1.0.0");
        assert!(res.locked);
        assert!(ctx.resolver().is_some());
    }
}
