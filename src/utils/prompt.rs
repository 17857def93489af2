//! User prompt utilities for interactive confirmation and selection

use anyhow::Result;
use dialoguer::{Confirm, Select};

/// Ask user for yes/no confirmation
pub fn confirm(prompt: &str) -> Result<bool> {
    let result = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(result)
}

/// Let the user pick one of `items`; `None` when they back out with Esc/q
pub fn select<T: ToString>(prompt: &str, items: &[T]) -> Result<Option<usize>> {
    if items.is_empty() {
        return Ok(None);
    }

    let labels: Vec<String> = items.iter().map(ToString::to_string).collect();
    let choice = Select::new()
        .with_prompt(prompt)
        .items(&labels)
        .default(0)
        .interact_opt()?;

    Ok(choice)
}
