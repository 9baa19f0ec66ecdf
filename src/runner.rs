use anyhow::{Context, Result};
use std::process::{Command, Stdio};

/// Run a command and capture output
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Command failed: {}", stderr.trim())
    }
}

/// Run a command silently, returning success/failure
pub fn run_quiet(cmd: &str, args: &[&str]) -> bool {
    Command::new(cmd)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a shell snippet through `sh -c`, capturing output
pub fn run_shell(script: &str) -> Result<String> {
    run_capture("sh", &["-c", script])
}

/// Run a shell snippet silently, returning success/failure
pub fn shell_succeeds(script: &str) -> bool {
    run_quiet("sh", &["-c", script])
}

/// Check if a command exists
pub fn command_exists(cmd: &str) -> bool {
    run_quiet("which", &[cmd])
}
