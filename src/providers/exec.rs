//! Exec provider - arbitrary shell commands guarded by a probe
//!
//! ```toml
//! [[exec]]
//! name = "rustup"
//! run = "curl -sSf https://sh.rustup.rs | sh -s -- -y"
//! unless = "command -v rustup"
//! depends_on = ["brew:formula:curl"]
//! ```

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use stepgraph::{
    CompileContext, Diff, ExplainContext, Explanation, Provider, RunContext, Step, StepId,
    StepStatus,
};

use crate::config::type_name;
use crate::runner;

pub const PROVIDER: &str = "exec";
const SECTION: &str = "exec";

/// Provider for the `[[exec]]` section
#[derive(Debug, Default)]
pub struct ExecProvider;

impl Provider for ExecProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn compile(&self, ctx: &CompileContext) -> Result<Vec<Box<dyn Step>>> {
        let entries = match ctx.config().get(SECTION) {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(other) => bail!(
                "{SECTION}: expected an array of tables, found {}",
                type_name(other)
            ),
        };

        let mut steps: Vec<Box<dyn Step>> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let entry: ExecEntry = serde_json::from_value(entry.clone())
                .with_context(|| format!("{SECTION}[{i}]: invalid command entry"))?;
            steps.push(Box::new(ExecStep::from_entry(entry)?));
        }
        Ok(steps)
    }
}

/// One `[[exec]]` table as written in the manifest
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecEntry {
    name: String,
    run: String,
    #[serde(default)]
    unless: Option<String>,
    #[serde(default)]
    depends_on: Vec<String>,
}

/// One guarded shell command
#[derive(Debug, Clone)]
pub struct ExecStep {
    id: StepId,
    deps: Vec<StepId>,
    name: String,
    run: String,
    /// Probe whose success means the command need not run
    unless: Option<String>,
}

impl ExecStep {
    fn from_entry(entry: ExecEntry) -> Result<Self> {
        let name = entry.name;
        if entry.run.trim().is_empty() {
            bail!("{SECTION}.{name}: field \"run\" is empty");
        }

        let id = StepId::from_parts(&[PROVIDER, "run", name.as_str()])
            .with_context(|| format!("{SECTION}.{name}: unusable command name"))?;
        let deps = entry
            .depends_on
            .iter()
            .map(|raw| {
                StepId::new(raw).with_context(|| format!("{SECTION}.{name}: bad dependency {raw:?}"))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id,
            deps,
            run: entry.run,
            unless: entry.unless.filter(|probe| !probe.trim().is_empty()),
            name,
        })
    }
}

impl Step for ExecStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &self.deps
    }

    fn description(&self) -> String {
        format!("Run {}", self.name)
    }

    fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
        match &self.unless {
            Some(probe) if runner::shell_succeeds(probe) => Ok(StepStatus::Satisfied),
            Some(_) => Ok(StepStatus::NeedsApply),
            // Without a probe there is no way to tell
            None => Ok(StepStatus::Unknown),
        }
    }

    fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
        Ok(Diff::add(PROVIDER, &self.name, &self.run))
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        if ctx.dry_run() {
            log::info!("[dry-run] sh -c {:?}", self.run);
            return Ok(());
        }
        ctx.check_cancelled()?;
        let output = runner::run_shell(&self.run).with_context(|| format!("{} failed", self.id))?;
        if !output.is_empty() {
            log::debug!("{}: {}", self.id, output);
        }
        Ok(())
    }

    fn explain(&self, ctx: &ExplainContext) -> Explanation {
        let detail = match &self.unless {
            Some(probe) => format!(
                "Runs `{}` through sh unless `{}` succeeds.",
                self.run, probe
            ),
            None => format!("Runs `{}` through sh on every apply.", self.run),
        };
        let mut tradeoffs = vec!["Commands are opaque; plan cannot show what they will change"];
        if self.unless.is_none() {
            tradeoffs.push("Without an `unless` probe the command is never considered satisfied");
        }
        let mut explanation = Explanation::new(format!("Run the {} command", self.name))
            .with_detail(detail)
            .with_tradeoffs(tradeoffs);
        if ctx.verbose() && !self.deps.is_empty() {
            let deps: Vec<_> = self.deps.iter().map(StepId::as_str).collect();
            explanation = explanation.with_detail(format!(
                "{} Waits for {}.",
                explanation.detail(),
                deps.join(", ")
            ));
        }
        explanation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepgraph::{CompileError, Manifest};

    fn context(section: Value) -> CompileContext {
        let mut manifest = Manifest::new();
        manifest.insert(SECTION.to_string(), section);
        CompileContext::new(manifest)
    }

    #[test]
    fn test_compiles_entries_in_order() {
        let steps = ExecProvider
            .compile(&context(json!([
                { "name": "first", "run": "true" },
                { "name": "second", "run": "true", "unless": "true", "depends_on": ["exec:run:first"] },
            ])))
            .unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id().as_str(), "exec:run:first");
        assert_eq!(steps[1].depends_on(), [StepId::must("exec:run:first")]);
    }

    #[test]
    fn test_rejects_malformed_entries() {
        let err = ExecProvider.compile(&context(json!({ "name": "x" }))).unwrap_err();
        assert!(err.to_string().contains("expected an array"));

        let err = ExecProvider
            .compile(&context(json!([{ "run": "true" }])))
            .unwrap_err();
        assert_eq!(err.to_string(), "exec[0]: invalid command entry");
        assert!(format!("{err:#}").contains("missing field `name`"));

        let err = ExecProvider
            .compile(&context(json!([{ "name": "x", "run": "true", "onlyif": "true" }])))
            .unwrap_err();
        assert!(format!("{err:#}").contains("unknown field `onlyif`"));

        let err = ExecProvider
            .compile(&context(json!([{ "name": "x", "run": " " }])))
            .unwrap_err();
        assert!(err.to_string().contains("is empty"));

        let err = ExecProvider
            .compile(&context(json!([{ "name": "x", "run": "true", "depends_on": ["has space"] }])))
            .unwrap_err();
        assert!(err.to_string().contains("bad dependency"));
    }

    #[test]
    fn test_missing_dependency_surfaces_from_compiler() {
        let mut manifest = Manifest::new();
        manifest.insert(
            SECTION.to_string(),
            json!([{ "name": "x", "run": "true", "depends_on": ["brew:formula:absent"] }]),
        );
        let err = crate::providers::compiler().compile(manifest).unwrap_err();
        assert!(matches!(err, CompileError::Graph(ref e) if e.is_missing_dependency()));
    }

    #[test]
    fn test_cycle_surfaces_from_compiler() {
        let mut manifest = Manifest::new();
        manifest.insert(
            SECTION.to_string(),
            json!([
                { "name": "a", "run": "true", "depends_on": ["exec:run:b"] },
                { "name": "b", "run": "true", "depends_on": ["exec:run:a"] },
            ]),
        );
        let err = crate::providers::compiler().compile(manifest).unwrap_err();
        assert!(err.graph_error().is_some_and(|e| e.is_cycle()));
    }

    #[cfg(unix)]
    #[test]
    fn test_unless_probe_and_apply() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("done");
        let marker = marker.display();
        let steps = ExecProvider
            .compile(&context(json!([{
                "name": "touch",
                "run": format!("touch '{marker}'"),
                "unless": format!("test -e '{marker}'"),
            }])))
            .unwrap();
        let step = &steps[0];
        let ctx = RunContext::new();

        assert_eq!(step.check(&ctx).unwrap(), StepStatus::NeedsApply);
        step.apply(&ctx.with_dry_run(true)).unwrap();
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::NeedsApply);
        step.apply(&ctx).unwrap();
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::Satisfied);
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_command_errors() {
        let steps = ExecProvider
            .compile(&context(json!([{ "name": "boom", "run": "exit 7" }])))
            .unwrap();
        assert_eq!(steps[0].check(&RunContext::new()).unwrap(), StepStatus::Unknown);
        let err = steps[0].apply(&RunContext::new()).unwrap_err();
        assert!(err.to_string().contains("exec:run:boom failed"));
    }

    #[test]
    fn test_explain_mentions_probe() {
        let steps = ExecProvider
            .compile(&context(json!([{ "name": "x", "run": "make", "unless": "test -f out" }])))
            .unwrap();
        let explanation = steps[0].explain(&ExplainContext::new());
        assert!(explanation.detail().contains("unless `test -f out` succeeds"));
        assert_eq!(explanation.tradeoffs().len(), 1);
    }
}
