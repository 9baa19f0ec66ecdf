//! Homebrew provider
//!
//! ```toml
//! [brew]
//! taps = ["homebrew/cask-fonts"]
//! formulae = ["jq", "ripgrep", "python@3.12"]
//! casks = ["firefox"]
//! ```
//!
//! Homebrew holds a global lock, so every brew step depends on the one
//! before it. Formulae and casks additionally depend on every tap.

use anyhow::{Context, Result, bail};
use stepgraph::{
    CompileContext, Diff, ExplainContext, Explanation, Provider, Resolution, RunContext, Step,
    StepId, StepStatus,
};

use super::string_list;
use crate::runner;

pub const PROVIDER: &str = "brew";
const SECTION: &str = "brew";
const LATEST: &str = "latest";

/// Type of brew package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrewPackageType {
    Formula,
    Cask,
    Tap,
}

impl BrewPackageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Formula => "formula",
            Self::Cask => "cask",
            Self::Tap => "tap",
        }
    }
}

/// Provider for the `[brew]` section
#[derive(Debug, Default)]
pub struct BrewProvider;

impl Provider for BrewProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn compile(&self, ctx: &CompileContext) -> Result<Vec<Box<dyn Step>>> {
        let Some(section) = ctx.get_section(SECTION) else {
            return Ok(Vec::new());
        };

        let taps = string_list(SECTION, section, "taps")?;
        let formulae = string_list(SECTION, section, "formulae")?;
        let casks = string_list(SECTION, section, "casks")?;

        let mut steps: Vec<Box<dyn Step>> = Vec::new();
        let mut tap_ids = Vec::with_capacity(taps.len());
        let mut previous: Option<StepId> = None;

        for tap in &taps {
            let package = BrewPackage::new(BrewPackageType::Tap, tap, None, &previous, &[])?;
            tap_ids.push(package.id.clone());
            previous = Some(package.id.clone());
            steps.push(Box::new(package));
        }

        let packages = formulae
            .iter()
            .map(|name| (BrewPackageType::Formula, name))
            .chain(casks.iter().map(|name| (BrewPackageType::Cask, name)));

        for (kind, name) in packages {
            let resolution = ctx
                .resolve_version(PROVIDER, name, LATEST)
                .into_result()
                .with_context(|| format!("{SECTION}: cannot pin {} {name}", kind.as_str()))?;
            let package = BrewPackage::new(kind, name, Some(resolution), &previous, &tap_ids)?;
            previous = Some(package.id.clone());
            steps.push(Box::new(package));
        }

        log::debug!(
            "brew: {} taps, {} formulae, {} casks",
            taps.len(),
            formulae.len(),
            casks.len()
        );
        Ok(steps)
    }
}

/// A Homebrew tap, formula or cask
#[derive(Debug, Clone)]
pub struct BrewPackage {
    id: StepId,
    deps: Vec<StepId>,
    pub name: String,
    pub package_type: BrewPackageType,
    /// Version chosen at compile time; `None` for taps
    pub resolution: Option<Resolution>,
}

impl BrewPackage {
    fn new(
        package_type: BrewPackageType,
        name: &str,
        resolution: Option<Resolution>,
        previous: &Option<StepId>,
        taps: &[StepId],
    ) -> Result<Self> {
        let id = StepId::from_parts(&[PROVIDER, package_type.as_str(), name]).with_context(|| {
            format!("{SECTION}: invalid {} name {name:?}", package_type.as_str())
        })?;

        let mut deps: Vec<StepId> = taps.to_vec();
        if let Some(prev) = previous
            && !deps.contains(prev)
        {
            deps.push(prev.clone());
        }

        Ok(Self {
            id,
            deps,
            name: name.to_string(),
            package_type,
            resolution,
        })
    }

    /// Resolved version, or "latest" when nothing pins one
    pub fn version(&self) -> &str {
        self.resolution
            .as_ref()
            .map(|r| r.version.as_str())
            .filter(|v| !v.is_empty())
            .unwrap_or(LATEST)
    }

    /// Name passed to `brew install`
    fn install_name(&self) -> String {
        let version = self.version();
        if version == LATEST || self.name.contains('@') {
            self.name.clone()
        } else {
            format!("{}@{}", self.name, version)
        }
    }

    fn install_args(&self) -> Vec<String> {
        match self.package_type {
            BrewPackageType::Tap => vec!["tap".into(), self.name.clone()],
            BrewPackageType::Formula => {
                vec!["install".into(), "--formula".into(), self.install_name()]
            }
            BrewPackageType::Cask => vec!["install".into(), "--cask".into(), self.install_name()],
        }
    }

    /// Check if package is installed
    fn is_installed(&self) -> Result<bool> {
        if !runner::command_exists("brew") {
            bail!("Homebrew is not installed (brew not found in PATH)");
        }

        match self.package_type {
            BrewPackageType::Tap => {
                let taps = runner::run_capture("brew", &["tap"]).context("Failed to run brew tap")?;
                Ok(tap_listed(&taps, &self.name))
            }
            BrewPackageType::Formula | BrewPackageType::Cask => {
                let type_flag = match self.package_type {
                    BrewPackageType::Cask => "--cask",
                    _ => "--formula",
                };
                let name = self.install_name();
                match runner::run_capture("brew", &["info", "--json=v2", type_flag, &name]) {
                    Ok(json) => parse_installed(self.package_type, &json),
                    // brew info fails for unknown packages
                    Err(e) => {
                        log::debug!("brew info {name}: {e}");
                        Ok(false)
                    }
                }
            }
        }
    }
}

/// Whether `brew tap` output lists a tap
fn tap_listed(output: &str, tap: &str) -> bool {
    output.lines().any(|t| t.trim().eq_ignore_ascii_case(tap))
}

/// Parse `brew info --json=v2` output
fn parse_installed(kind: BrewPackageType, json: &str) -> Result<bool> {
    let json: serde_json::Value =
        serde_json::from_str(json).context("Unexpected brew info output")?;

    Ok(match kind {
        BrewPackageType::Cask => json["casks"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|c| c["installed"].as_str())
            .is_some(),
        _ => json["formulae"]
            .as_array()
            .and_then(|arr| arr.first())
            .and_then(|f| f["installed"].as_array())
            .is_some_and(|arr| !arr.is_empty()),
    })
}

impl Step for BrewPackage {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn depends_on(&self) -> &[StepId] {
        &self.deps
    }

    fn description(&self) -> String {
        format!("Install {} {} via brew", self.package_type.as_str(), self.name)
    }

    fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
        if self.is_installed()? {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::NeedsApply)
        }
    }

    fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
        Ok(Diff::add(
            self.package_type.as_str(),
            &self.name,
            self.version(),
        ))
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        let args = self.install_args();
        if ctx.dry_run() {
            log::info!("[dry-run] brew {}", args.join(" "));
            return Ok(());
        }

        ctx.check_cancelled()?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        runner::run_capture("brew", &args)
            .with_context(|| format!("brew {} failed", args.join(" ")))?;
        Ok(())
    }

    fn explain(&self, ctx: &ExplainContext) -> Explanation {
        let (summary, link) = match self.package_type {
            BrewPackageType::Tap => (
                format!("Add the {} tap to Homebrew", self.name),
                "https://docs.brew.sh/Taps",
            ),
            BrewPackageType::Formula => (
                format!("Install the {} formula ({})", self.name, self.version()),
                "https://docs.brew.sh/Formula-Cookbook",
            ),
            BrewPackageType::Cask => (
                format!("Install the {} cask ({})", self.name, self.version()),
                "https://docs.brew.sh/Cask-Cookbook",
            ),
        };

        let mut explanation = Explanation::new(summary)
            .with_detail(format!("Runs `brew {}`.", self.install_args().join(" ")))
            .with_doc_links([link])
            .with_tradeoffs(["Homebrew steps run one at a time; brew holds a global lock"]);

        if ctx.verbose()
            && let Some(resolution) = &self.resolution
        {
            explanation = explanation.with_detail(format!(
                "Runs `brew {}`. Version {} comes from {:?} resolution.",
                self.install_args().join(" "),
                self.version(),
                resolution.source
            ));
        }
        explanation
    }
}
