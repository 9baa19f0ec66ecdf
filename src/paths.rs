//! Path resolution for hearth
//!
//! # Environment Variables
//!
//! - `HEARTH_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/hearth`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `HEARTH_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/hearth` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\hearth`
//!    - macOS/Linux: `~/.config/hearth`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "HEARTH_CONFIG_DIR";

/// Base name of the manifest file inside the config directory
pub const MANIFEST_NAME: &str = "hearth";

/// Get the hearth config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("hearth");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            let path = app_data.join("hearth");
            log::debug!("Using Windows config dir: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("hearth");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand `~` and environment variables in a path
///
/// Unknown variables are left untouched rather than failing.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand a manifest path and anchor relative results at `root`
pub fn resolve(root: &Path, path: &str) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_relative() && !root.as_os_str().is_empty() {
        root.join(expanded)
    } else {
        expanded
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Helper to run a test with temporary env var
    ///
    /// # Safety
    /// This function uses unsafe env::set_var/remove_var which can cause issues
    /// if other threads read environment variables concurrently.
    /// Only use in single-threaded test contexts.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: Tests run in isolation and don't read env vars concurrently
        unsafe { env::set_var(key, value) };
        let result = f();
        match original {
            // SAFETY: Tests run in isolation
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, "/custom/hearth", || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/hearth"));
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/dotfiles/zshrc"), home.join("dotfiles").join("zshrc"));
    }

    #[test]
    fn test_expand_with_env_var() {
        with_env_var("HEARTH_TEST_VAR", "value", || {
            assert_eq!(expand("/p/$HEARTH_TEST_VAR/f"), PathBuf::from("/p/value/f"));
        });
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$HEARTH_NONEXISTENT_12345/file");
        assert_eq!(result, PathBuf::from("/path/$HEARTH_NONEXISTENT_12345/file"));
    }

    #[test]
    fn test_resolve_relative_against_root() {
        let root = Path::new("/etc/hearth");
        assert_eq!(resolve(root, "files/zshrc"), PathBuf::from("/etc/hearth/files/zshrc"));
        assert_eq!(resolve(root, "/abs/zshrc"), PathBuf::from("/abs/zshrc"));
        assert_eq!(resolve(Path::new(""), "rel"), PathBuf::from("rel"));
    }
}
