//! Container runtime detection and invocations (Docker/Podman)

use anyhow::{Result, anyhow};
use std::str::FromStr;

use crate::utils::command::Invocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Detect which container runtime is available
    pub fn detect() -> Result<Self> {
        // Check for docker first
        if which::which("docker").is_ok() {
            crate::log_info!("Using container runtime: docker");
            return Ok(ContainerRuntime::Docker);
        }

        // Fall back to podman
        if which::which("podman").is_ok() {
            crate::log_info!("Using container runtime: podman");
            return Ok(ContainerRuntime::Podman);
        }

        Err(anyhow!(
            "Neither docker nor podman found. Please install one of them:\n  \
             - Docker: https://docs.docker.com/get-docker/\n  \
             - Podman: https://podman.io/getting-started/installation"
        ))
    }

    /// Resolve a configured runtime name, detecting when it is "auto"
    pub fn resolve(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case("auto") {
            return Self::detect();
        }
        name.parse()
    }

    /// Get the command name for this runtime
    pub fn command(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Podman => "podman",
        }
    }

    /// List local images, one JSON object per line
    pub fn list_images(&self) -> Invocation {
        Invocation::new(self.command()).args(["image", "ls", "--format={{json .}}"])
    }

    /// Run a command inside a running container
    pub fn exec<I, S>(&self, container: &str, command: I) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Invocation::new(self.command())
            .args(["exec", container])
            .args(command)
    }

    /// Environment kind needs to drive this runtime, if any
    pub fn kind_provider_env(&self) -> Option<(&'static str, &'static str)> {
        match self {
            ContainerRuntime::Docker => None,
            ContainerRuntime::Podman => Some(("KIND_EXPERIMENTAL_PROVIDER", "podman")),
        }
    }
}

impl FromStr for ContainerRuntime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(ContainerRuntime::Docker),
            "podman" => Ok(ContainerRuntime::Podman),
            _ => Err(anyhow!(
                "Invalid container runtime: {}. Must be 'auto', 'docker' or 'podman'",
                s
            )),
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}
