//! Error types with actionable suggestions

use colored::Colorize;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single external command invocation
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {}", exit_code_label(.code), .stderr.trim())]
    NonZeroExit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` did not finish within {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

impl CommandError {
    /// The rendered command line that failed
    pub fn command(&self) -> &str {
        match self {
            CommandError::SpawnFailed { command, .. }
            | CommandError::NonZeroExit { command, .. }
            | CommandError::TimedOut { command, .. } => command,
        }
    }
}

/// Errors surfaced by the inventory reader and the action orchestrator
#[derive(Error, Debug)]
pub enum ImageError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to parse {what}: {source}")]
    ParseFailed {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to load image {image} into kind: {source}")]
    LoadFailed {
        image: String,
        #[source]
        source: CommandError,
    },

    #[error("failed to delete image {image_id} from kind: {source}")]
    DeleteFailed {
        image_id: String,
        #[source]
        source: CommandError,
    },

    #[error("unhandled action: {0}")]
    UnhandledAction(String),

    #[error("invalid action payload: {0}")]
    PayloadError(String),

    #[error("already loading an image, please wait")]
    AlreadyLoading,
}

impl ImageError {
    /// The command failure underneath this error, if there is one
    pub fn command_error(&self) -> Option<&CommandError> {
        match self {
            ImageError::Command(source)
            | ImageError::LoadFailed { source, .. }
            | ImageError::DeleteFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Hints shown to the user below the error message
    pub fn suggestions(&self) -> Vec<String> {
        let mut suggestions = Vec::new();

        match self.command_error() {
            Some(CommandError::SpawnFailed { command, .. }) => {
                let tool = command.split_whitespace().next().unwrap_or("the tool");
                suggestions.push(format!("Ensure '{}' is installed and in your PATH", tool));
                suggestions.push("Run 'kind-images check' to verify prerequisites".to_string());
            }
            Some(CommandError::NonZeroExit { .. }) => {
                suggestions.push("Verify the kind cluster is running: kind get clusters".to_string());
                suggestions.push("Run with -vv to see the commands being executed".to_string());
            }
            Some(CommandError::TimedOut { .. }) => {
                suggestions.push(
                    "Increase behavior.command_timeout_secs in the config file".to_string(),
                );
                suggestions.push("Check that the docker daemon is responsive".to_string());
            }
            None => {}
        }

        match self {
            ImageError::ParseFailed { .. } => {
                suggestions.push("Check that crictl inside the node supports --output=json".to_string());
            }
            ImageError::PayloadError(_) => {
                suggestions.push("Pass a payload such as: --payload '{\"imageID\": \"nginx:latest\"}'".to_string());
            }
            ImageError::UnhandledAction(_) => {
                suggestions.push(format!(
                    "Known actions: {}, {}",
                    crate::k8s::actions::LOAD_ACTION,
                    crate::k8s::actions::DELETE_ACTION
                ));
            }
            ImageError::AlreadyLoading => {
                suggestions.push("Wait for the current load to finish and try again".to_string());
            }
            _ => {}
        }

        suggestions
    }

    /// Display the error with suggestions
    pub fn display(&self) {
        crate::log_error!("{}", self);
        eprintln!("{} {}", "error:".red().bold(), self);

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            eprintln!();
            eprintln!("{}", "Suggestions:".yellow().bold());
            for suggestion in &suggestions {
                eprintln!("  {} {}", "→".blue(), suggestion);
            }
        }
    }
}

/// Helper to display an error and exit
pub fn display_error_and_exit(error: &anyhow::Error) -> ! {
    match error.downcast_ref::<ImageError>() {
        Some(image_error) => image_error.display(),
        None => {
            crate::log_error!("{:#}", error);
            eprintln!("{} {:#}", "error:".red().bold(), error);
        }
    }
    std::process::exit(1);
}
