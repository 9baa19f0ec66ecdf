//! Symlink provider - links dotfiles from the config tree into place
//!
//! ```toml
//! [symlinks.zshrc]
//! source = "zsh/zshrc"   # relative to the manifest directory
//! target = "~/.zshrc"
//! ```

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stepgraph::{
    CompileContext, Diff, ExplainContext, Explanation, Provider, RollbackableStep, RunContext,
    Step, StepId, StepStatus,
};

use super::{section_entry, string_field};
use crate::paths;

pub const PROVIDER: &str = "symlink";
const SECTION: &str = "symlinks";

/// Provider for the `[symlinks]` section
#[derive(Debug, Default)]
pub struct SymlinkProvider;

impl Provider for SymlinkProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn compile(&self, ctx: &CompileContext) -> Result<Vec<Box<dyn Step>>> {
        let Some(section) = ctx.get_section(SECTION) else {
            return Ok(Vec::new());
        };

        let mut steps: Vec<Box<dyn Step>> = Vec::with_capacity(section.len());
        for (name, entry) in section {
            let entry = section_entry(SECTION, name, entry)?;
            let source = string_field(SECTION, name, entry, "source")?;
            let target = string_field(SECTION, name, entry, "target")?;
            let link = SymlinkStep::new(
                name,
                paths::resolve(ctx.config_root(), source),
                paths::expand(target),
            )?;
            log::debug!("{}: {} -> {}", link.id, target, source);
            steps.push(Box::new(link));
        }
        Ok(steps)
    }
}

/// What occupied the target before this run touched it
#[derive(Debug, Clone, PartialEq, Eq)]
enum Previous {
    Absent,
    Link(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Missing,
    Correct,
    WrongTarget(PathBuf),
    FileExists,
}

/// One managed symlink
#[derive(Debug)]
pub struct SymlinkStep {
    id: StepId,
    name: String,
    /// What the symlink points to
    source: PathBuf,
    /// Where the symlink is created
    target: PathBuf,
    replaced: Mutex<Option<Previous>>,
}

impl SymlinkStep {
    pub fn new(name: &str, source: PathBuf, target: PathBuf) -> Result<Self> {
        let id = StepId::from_parts(&[PROVIDER, "link", name])
            .with_context(|| format!("{SECTION}.{name}: unusable link name"))?;
        Ok(Self {
            id,
            name: name.to_string(),
            source,
            target,
            replaced: Mutex::new(None),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn inspect(&self) -> Result<LinkState> {
        if !self.target.exists() && !self.target.is_symlink() {
            return Ok(LinkState::Missing);
        }

        if !self.target.is_symlink() {
            return Ok(LinkState::FileExists);
        }

        let link_target = fs::read_link(&self.target)
            .with_context(|| format!("Failed to read symlink {}", self.target.display()))?;

        // Canonicalize for comparison
        let expected = self
            .source
            .canonicalize()
            .unwrap_or_else(|_| self.source.clone());
        let absolute = if link_target.is_absolute() {
            link_target.clone()
        } else {
            self.target
                .parent()
                .map(|p| p.join(&link_target))
                .unwrap_or_else(|| link_target.clone())
        };
        let actual = absolute.canonicalize().unwrap_or(absolute);

        if expected == actual {
            Ok(LinkState::Correct)
        } else {
            Ok(LinkState::WrongTarget(link_target))
        }
    }

    fn link(&self) -> Result<()> {
        if let Some(parent) = self.target.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }

        create_symlink(&self.source, &self.target)
    }

    fn replaced(&self) -> Option<Previous> {
        self.replaced
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn record(&self, previous: Previous) {
        match self.replaced.lock() {
            Ok(mut guard) => *guard = Some(previous),
            Err(poisoned) => *poisoned.into_inner() = Some(previous),
        }
    }
}

impl Step for SymlinkStep {
    fn id(&self) -> &StepId {
        &self.id
    }

    fn description(&self) -> String {
        format!(
            "Symlink {} -> {}",
            self.target().display(),
            self.source().display()
        )
    }

    fn check(&self, _ctx: &RunContext) -> Result<StepStatus> {
        Ok(match self.inspect()? {
            LinkState::Correct => StepStatus::Satisfied,
            LinkState::Missing | LinkState::WrongTarget(_) => StepStatus::NeedsApply,
            LinkState::FileExists => StepStatus::Failed,
        })
    }

    fn plan(&self, _ctx: &RunContext) -> Result<Diff> {
        let wanted = self.source.display().to_string();
        Ok(match self.inspect()? {
            LinkState::Missing => Diff::add(PROVIDER, &self.name, wanted),
            LinkState::Correct => Diff::unchanged(PROVIDER, &self.name),
            LinkState::WrongTarget(actual) => {
                Diff::modify(PROVIDER, &self.name, actual.display().to_string(), wanted)
            }
            LinkState::FileExists => Diff::modify(PROVIDER, &self.name, "regular file", wanted),
        })
    }

    fn apply(&self, ctx: &RunContext) -> Result<()> {
        let previous = match self.inspect()? {
            LinkState::Correct => return Ok(()),
            // Don't overwrite existing files automatically
            LinkState::FileExists => bail!(
                "Refusing to replace regular file {} with a symlink",
                self.target.display()
            ),
            LinkState::Missing => Previous::Absent,
            LinkState::WrongTarget(old) => Previous::Link(old),
        };

        if !self.source.exists() {
            bail!("Source does not exist: {}", self.source.display());
        }

        if ctx.dry_run() {
            log::info!("[dry-run] would link {}", self.target.display());
            return Ok(());
        }

        if let Previous::Link(_) = previous {
            fs::remove_file(&self.target).with_context(|| {
                format!(
                    "Failed to remove existing symlink: {}",
                    self.target.display()
                )
            })?;
        }

        self.link()?;
        self.record(previous);
        Ok(())
    }

    fn explain(&self, ctx: &ExplainContext) -> Explanation {
        let explanation = Explanation::new(format!(
            "Link {} to {}",
            self.target.display(),
            self.source.display()
        ))
        .with_detail(
            "The target becomes a symbolic link into the config tree, so edits to either \
             path change the same file. An existing link pointing elsewhere is replaced; \
             a regular file is never overwritten.",
        )
        .with_tradeoffs([
            "Moving or deleting the config tree leaves a dangling link",
            "Tools that rewrite files atomically replace the link with a regular file",
        ]);
        if ctx.verbose() {
            explanation.with_doc_links(["https://www.gnu.org/software/stow/manual/stow.html"])
        } else {
            explanation
        }
    }

    fn as_rollbackable(&self) -> Option<&dyn RollbackableStep> {
        Some(self)
    }
}

impl RollbackableStep for SymlinkStep {
    fn can_rollback(&self) -> bool {
        self.replaced().is_some()
    }

    fn rollback(&self, _ctx: &RunContext) -> Result<()> {
        let Some(previous) = self.replaced() else {
            return Ok(());
        };

        // Only ever remove a link this run created
        if self.target.is_symlink() {
            fs::remove_file(&self.target)
                .with_context(|| format!("Failed to remove symlink {}", self.target.display()))?;
        }
        if let Previous::Link(old) = previous {
            create_symlink(&old, &self.target)?;
        }
        match self.replaced.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        Ok(())
    }
}

fn create_symlink(source: &Path, target: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(source, target).with_context(|| {
        format!(
            "Failed to create symlink: {} -> {}",
            target.display(),
            source.display()
        )
    })?;

    #[cfg(windows)]
    {
        use std::os::windows::fs::{symlink_dir, symlink_file};

        if source.is_dir() {
            // Junctions don't require admin privileges
            if let Err(e) = junction::create(source, target) {
                log::debug!("Junction creation failed ({}), trying symlink_dir", e);
                symlink_dir(source, target).with_context(|| {
                    format!(
                        "Failed to create directory symlink: {} -> {}",
                        target.display(),
                        source.display()
                    )
                })?;
            }
        } else {
            symlink_file(source, target).with_context(|| {
                format!(
                    "Failed to create file symlink: {} -> {}",
                    target.display(),
                    source.display()
                )
            })?;
        }
    }

    #[cfg(not(any(unix, windows)))]
    bail!("Symlinks not supported on this platform");

    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use stepgraph::{DiffType, Manifest};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, SymlinkStep) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("dotfiles").join("zshrc");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "export EDITOR=hx\n").unwrap();
        let target = dir.path().join("home").join(".zshrc");
        let step = SymlinkStep::new("zshrc", source, target).unwrap();
        (dir, step)
    }

    #[test]
    fn test_missing_link_is_created() {
        let (_dir, step) = fixture();
        let ctx = RunContext::new();
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::NeedsApply);
        assert_eq!(step.plan(&ctx).unwrap().diff_type, DiffType::Add);

        step.apply(&ctx).unwrap();
        assert!(step.target().is_symlink());
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::Satisfied);
        assert!(step.can_rollback());
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let (_dir, step) = fixture();
        let ctx = RunContext::new().with_dry_run(true);
        step.apply(&ctx).unwrap();
        assert!(!step.target().exists());
        assert!(!step.can_rollback());
    }

    #[test]
    fn test_regular_file_is_never_overwritten() {
        let (_dir, step) = fixture();
        fs::create_dir_all(step.target().parent().unwrap()).unwrap();
        fs::write(step.target(), "mine").unwrap();

        let ctx = RunContext::new();
        assert_eq!(step.check(&ctx).unwrap(), StepStatus::Failed);
        let err = step.apply(&ctx).unwrap_err();
        assert!(err.to_string().contains("Refusing to replace"));
        assert_eq!(fs::read_to_string(step.target()).unwrap(), "mine");
    }

    #[test]
    fn test_rollback_restores_previous_link() {
        let (dir, step) = fixture();
        let old = dir.path().join("old-zshrc");
        fs::write(&old, "old").unwrap();
        fs::create_dir_all(step.target().parent().unwrap()).unwrap();
        std::os::unix::fs::symlink(&old, step.target()).unwrap();

        let ctx = RunContext::new();
        assert_eq!(step.plan(&ctx).unwrap().diff_type, DiffType::Modify);
        step.apply(&ctx).unwrap();
        assert_eq!(fs::read_link(step.target()).unwrap(), step.source());

        step.rollback(&ctx).unwrap();
        assert_eq!(fs::read_link(step.target()).unwrap(), old);
        assert!(!step.can_rollback());
    }

    #[test]
    fn test_rollback_removes_created_link() {
        let (_dir, step) = fixture();
        let ctx = RunContext::new();
        step.apply(&ctx).unwrap();
        step.rollback(&ctx).unwrap();
        assert!(!step.target().exists() && !step.target().is_symlink());
    }

    #[test]
    fn test_missing_source_fails_apply() {
        let dir = TempDir::new().unwrap();
        let step = SymlinkStep::new(
            "ghost",
            dir.path().join("nope"),
            dir.path().join("link"),
        )
        .unwrap();
        let err = step.apply(&RunContext::new()).unwrap_err();
        assert!(err.to_string().contains("Source does not exist"));
        assert!(!step.can_rollback());
    }

    #[test]
    fn test_dry_run_still_requires_source() {
        let dir = TempDir::new().unwrap();
        let step = SymlinkStep::new(
            "ghost",
            dir.path().join("nope"),
            dir.path().join("link"),
        )
        .unwrap();
        let err = step.apply(&RunContext::new().with_dry_run(true)).unwrap_err();
        assert!(err.to_string().contains("Source does not exist"));
        assert!(!dir.path().join("link").exists());
    }

    #[test]
    fn test_provider_compiles_section() {
        let dir = TempDir::new().unwrap();
        let mut manifest = Manifest::new();
        manifest.insert(
            SECTION.to_string(),
            json!({
                "zshrc": { "source": "zsh/zshrc", "target": "/tmp/hearth-test/.zshrc" },
                "gitconfig": { "source": "/abs/gitconfig", "target": "/tmp/hearth-test/.gitconfig" },
            }),
        );
        let ctx = CompileContext::new(manifest).with_config_root(dir.path());
        let steps = SymlinkProvider.compile(&ctx).unwrap();
        let ids: Vec<_> = steps.iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, ["symlink:link:gitconfig", "symlink:link:zshrc"]);
        assert!(steps.iter().all(|s| s.depends_on().is_empty()));
        assert!(steps.iter().all(|s| s.as_rollbackable().is_some()));
    }

    #[test]
    fn test_provider_rejects_bad_entries() {
        let mut manifest = Manifest::new();
        manifest.insert(SECTION.to_string(), json!({ "zshrc": { "source": "a" } }));
        let err = SymlinkProvider
            .compile(&CompileContext::new(manifest))
            .unwrap_err();
        assert!(err.to_string().contains("symlinks.zshrc"));
        assert!(err.to_string().contains("target"));

        let mut manifest = Manifest::new();
        manifest.insert(
            SECTION.to_string(),
            json!({ "bad name": { "source": "a", "target": "b" } }),
        );
        assert!(SymlinkProvider.compile(&CompileContext::new(manifest)).is_err());
    }

    #[test]
    fn test_absent_section_yields_no_steps() {
        let steps = SymlinkProvider.compile(&CompileContext::default()).unwrap();
        assert!(steps.is_empty());
    }
}
