use colored::{ColoredString, Colorize};
use rollout::DeploymentStatus;

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

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
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

/// Print a step indicator
pub fn step(num: usize, total: usize, msg: &str) {
    println!("{} {}", format!("[{}/{}]", num, total).blue().bold(), msg);
}

// ============================================================================
// Deployment status
// ============================================================================

/// Symbol for a host status
pub fn status_symbol(status: DeploymentStatus) -> ColoredString {
    match status {
        DeploymentStatus::Pending => "·".dimmed(),
        DeploymentStatus::Deploying => "…".blue(),
        DeploymentStatus::Success => "✓".green(),
        DeploymentStatus::Failed => "✗".red(),
    }
}

/// Print one host line: symbol, padded name, detail
pub fn host_line(status: DeploymentStatus, host: &str, width: usize, detail: &str) {
    println!(
        "  {} {:<width$}  {}",
        status_symbol(status),
        host,
        detail.dimmed(),
        width = width
    );
}

/// Width of the widest name, for aligned columns
pub fn name_width<'a>(names: impl IntoIterator<Item = &'a str>) -> usize {
    names
        .into_iter()
        .map(|n| n.chars().count())
        .max()
        .unwrap_or(0)
}

/// Truncate a string for display, keeping the start
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let kept: String = text.chars().take(max_len - 3).collect();
        format!("{kept}...")
    }
}

// ============================================================================
// Tests
// ============================================================================
