use colored::Colorize;
use stepgraph::{Diff, DiffType, StepStatus};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Coloured, fixed-width status label
pub fn status_label(status: StepStatus) -> String {
    let label = format!("{:<11}", status.as_str());
    match status {
        StepStatus::Satisfied => label.green().to_string(),
        StepStatus::NeedsApply => label.yellow().to_string(),
        StepStatus::Unknown => label.magenta().to_string(),
        StepStatus::Failed => label.red().bold().to_string(),
        StepStatus::Skipped => label.dimmed().to_string(),
    }
}

/// Diff summary coloured by change type
pub fn diff_line(diff: &Diff) -> String {
    let line = diff.summary();
    match diff.diff_type {
        DiffType::Add => line.green().to_string(),
        DiffType::Remove => line.red().to_string(),
        DiffType::Modify => line.yellow().to_string(),
        DiffType::None => line.dimmed().to_string(),
    }
}

/// "1 step" / "3 steps"
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(0, "step"), "0 steps");
        assert_eq!(plural(1, "step"), "1 step");
        assert_eq!(plural(2, "change"), "2 changes");
    }

    #[test]
    fn test_labels_contain_status() {
        colored::control::set_override(false);
        assert_eq!(status_label(StepStatus::NeedsApply).trim_end(), "needs-apply");
        assert_eq!(diff_line(&Diff::add("formula", "jq", "latest")), "+ formula jq (latest)");
        colored::control::unset_override();
    }
}
