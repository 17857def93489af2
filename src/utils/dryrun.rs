//! Dry-run mode utilities

use colored::Colorize;

/// Log a dry-run action
pub fn log_action(action: &str) {
    crate::log_info!("[DRY RUN] {}", action);
    println!("  {} {}", "[DRY RUN]".cyan().bold(), action);
}

/// Execute `f` only when not in dry-run mode.
/// In dry-run mode the action is logged and `default` is returned instead.
pub fn exec_unless_dry_run<F, T, E>(dry_run: bool, action_desc: &str, default: T, f: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
{
    if dry_run {
        log_action(action_desc);
        Ok(default)
    } else {
        f()
    }
}
