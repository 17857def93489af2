//! Utility modules for kind-images

pub mod command;
pub mod container;
pub mod dryrun;
pub mod errors;
pub mod logger;
pub mod prereqs;
pub mod progress;
pub mod prompt;

// Re-export commonly used items
pub use command::{CommandOutput, CommandRunner, Invocation, SystemRunner};
pub use container::ContainerRuntime;
pub use errors::{CommandError, ImageError};
pub use logger::{log_debug, log_error, log_info, log_warn};
pub use prereqs::{CommonPrereqs, Prerequisite};
pub use prompt::{confirm, select};
