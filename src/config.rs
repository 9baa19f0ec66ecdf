//! Manifest loading
//!
//! A manifest is a single TOML or JSON document whose top-level tables are
//! provider sections (`[brew]`, `[symlinks]`, `[[exec]]`). Overlay files are
//! deep-merged on top of the base: tables merge key by key, everything else
//! is replaced by the overlay's value.

use crate::paths;
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use stepgraph::{CompileContext, Manifest};

/// Supported manifest formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Some(Self::Toml),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    /// Parse a document into a manifest
    pub fn parse(self, content: &str) -> Result<Manifest> {
        match self {
            Self::Toml => toml::from_str(content).context("Invalid TOML manifest"),
            Self::Json => {
                let value: Value = serde_json::from_str(content).context("Invalid JSON manifest")?;
                match value {
                    Value::Object(map) => Ok(map),
                    other => bail!("Manifest must be a JSON object, found {}", type_name(&other)),
                }
            }
        }
    }
}

/// A merged manifest together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedManifest {
    pub manifest: Manifest,
    /// Every file that contributed, base first
    pub layers: Vec<PathBuf>,
    /// Directory relative manifest paths are resolved against
    pub root: PathBuf,
}

impl LoadedManifest {
    /// Path of the last layer applied
    pub fn provenance(&self) -> String {
        self.layers
            .last()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    /// Build the context handed to providers
    pub fn compile_context(&self) -> CompileContext {
        CompileContext::new(self.manifest.clone())
            .with_provenance(self.provenance())
            .with_config_root(&self.root)
            .with_target(std::env::consts::OS)
    }
}

/// Locate the base manifest in a directory
///
/// `hearth.toml` wins over `hearth.json` when both exist.
pub fn find_manifest(dir: &Path) -> Result<PathBuf> {
    for format in [ConfigFormat::Toml, ConfigFormat::Json] {
        let candidate = dir
            .join(paths::MANIFEST_NAME)
            .with_extension(format.extension());
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    bail!(
        "No manifest found in {} (expected {name}.toml or {name}.json)",
        dir.display(),
        name = paths::MANIFEST_NAME
    )
}

/// Read and parse a single manifest file
pub fn load_file(path: &Path) -> Result<Manifest> {
    let format = ConfigFormat::from_path(path).with_context(|| {
        format!(
            "Unsupported manifest format: {} (use .toml or .json)",
            path.display()
        )
    })?;
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;
    format
        .parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load the base manifest plus overlays
///
/// With no explicit path the base is looked up in [`paths::config_dir`].
pub fn load(explicit: Option<&Path>, overlays: &[PathBuf]) -> Result<LoadedManifest> {
    let base = match explicit {
        Some(path) => paths::expand(&path.to_string_lossy()),
        None => find_manifest(&paths::config_dir()?)?,
    };
    log::debug!("Loading manifest {}", base.display());

    let mut manifest = load_file(&base)?;
    let mut layers = vec![base.clone()];

    for overlay in overlays {
        let path = paths::expand(&overlay.to_string_lossy());
        log::debug!("Merging overlay {}", path.display());
        let layer = load_file(&path)?;
        merge(&mut manifest, layer);
        layers.push(path);
    }

    let root = base
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    Ok(LoadedManifest {
        manifest,
        layers,
        root,
    })
}

/// Deep-merge `overlay` into `base`
pub fn merge(base: &mut Manifest, overlay: Manifest) {
    for (key, value) in overlay {
        if let Value::Object(incoming) = &value
            && let Some(Value::Object(existing)) = base.get_mut(&key)
        {
            merge(existing, incoming.clone());
            continue;
        }
        base.insert(key, value);
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn obj(value: Value) -> Manifest {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a/hearth.toml")), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_path(Path::new("hearth.json")), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_path(Path::new("hearth.yaml")), None);
        assert_eq!(ConfigFormat::from_path(Path::new("hearth")), None);
    }

    #[test]
    fn test_parse_toml_sections() {
        let manifest = ConfigFormat::Toml
            .parse(
                r#"
                [brew]
                formulae = ["jq", "ripgrep"]

                [symlinks.zshrc]
                source = "zsh/zshrc"
                target = "~/.zshrc"
                "#,
            )
            .unwrap();
        assert_eq!(manifest["brew"]["formulae"], json!(["jq", "ripgrep"]));
        assert_eq!(manifest["symlinks"]["zshrc"]["target"], json!("~/.zshrc"));
    }

    #[test]
    fn test_parse_json_rejects_non_object() {
        let err = ConfigFormat::Json.parse("[1, 2]").unwrap_err();
        assert!(err.to_string().contains("array"));
    }

    #[test]
    fn test_merge_is_deep_for_tables_only() {
        let mut base = obj(json!({
            "brew": { "formulae": ["jq"], "taps": ["a/b"] },
            "symlinks": { "zshrc": { "source": "s", "target": "t" } },
        }));
        merge(
            &mut base,
            obj(json!({
                "brew": { "formulae": ["fd"] },
                "symlinks": { "gitconfig": { "source": "g", "target": "u" } },
                "exec": [],
            })),
        );
        assert_eq!(base["brew"]["formulae"], json!(["fd"]));
        assert_eq!(base["brew"]["taps"], json!(["a/b"]));
        assert!(base["symlinks"].get("zshrc").is_some());
        assert!(base["symlinks"].get("gitconfig").is_some());
        assert_eq!(base["exec"], json!([]));
    }

    #[test]
    fn test_find_manifest_prefers_toml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("hearth.json"), "{}").unwrap();
        assert_eq!(find_manifest(dir.path()).unwrap(), dir.path().join("hearth.json"));
        fs::write(dir.path().join("hearth.toml"), "").unwrap();
        assert_eq!(find_manifest(dir.path()).unwrap(), dir.path().join("hearth.toml"));
    }

    #[test]
    fn test_find_manifest_missing() {
        let dir = TempDir::new().unwrap();
        let err = find_manifest(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No manifest found"));
    }

    #[test]
    fn test_load_with_overlay_sets_provenance() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("hearth.toml");
        let overlay = dir.path().join("work.json");
        fs::write(&base, "[brew]\nformulae = [\"jq\"]\n").unwrap();
        fs::write(&overlay, r#"{"brew": {"casks": ["firefox"]}}"#).unwrap();

        let loaded = load(Some(base.as_path()), std::slice::from_ref(&overlay)).unwrap();
        assert_eq!(loaded.layers, vec![base.clone(), overlay.clone()]);
        assert_eq!(loaded.root, dir.path());
        assert_eq!(loaded.provenance(), overlay.display().to_string());
        assert_eq!(loaded.manifest["brew"]["formulae"], json!(["jq"]));
        assert_eq!(loaded.manifest["brew"]["casks"], json!(["firefox"]));

        let ctx = loaded.compile_context();
        assert_eq!(ctx.provenance(), overlay.display().to_string());
        assert_eq!(ctx.config_root(), dir.path());
        assert!(ctx.get_section("brew").is_some());
    }

    #[test]
    fn test_load_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hearth.yaml");
        fs::write(&path, "brew: {}").unwrap();
        let err = load(Some(path.as_path()), &[]).unwrap_err();
        assert!(err.to_string().contains("Unsupported manifest format"));
    }
}
