//! Prerequisite checking system for required tools

use thiserror::Error;

use crate::utils::ContainerRuntime;

#[derive(Error, Debug)]
pub enum PrereqError {
    #[error("Tool '{name}' not found")]
    NotFound { name: String, hint: String },
}

/// Trait for checking prerequisites
pub trait Prerequisite {
    /// Name of the prerequisite tool
    fn name(&self) -> &str;

    /// Check if the tool is available
    fn check(&self) -> Result<(), PrereqError>;

    /// Installation hint for the user
    fn install_hint(&self) -> &str;
}

/// Basic prerequisite that checks if a command exists
pub struct CommandPrereq {
    pub name: String,
    pub hint: String,
}

impl CommandPrereq {
    pub fn new(name: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hint: hint.into(),
        }
    }
}

impl Prerequisite for CommandPrereq {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self) -> Result<(), PrereqError> {
        which::which(&self.name).map_err(|_| PrereqError::NotFound {
            name: self.name.clone(),
            hint: self.hint.clone(),
        })?;
        Ok(())
    }

    fn install_hint(&self) -> &str {
        &self.hint
    }
}

/// Common prerequisites for kind-images
pub struct CommonPrereqs;

impl CommonPrereqs {
    /// Get kind prerequisite
    pub fn kind() -> CommandPrereq {
        CommandPrereq::new(
            "kind",
            "Install from: https://kind.sigs.k8s.io/docs/user/quick-start/#installation",
        )
    }

    /// Get the prerequisite for a container runtime CLI
    pub fn runtime(runtime: ContainerRuntime) -> CommandPrereq {
        let hint = match runtime {
            ContainerRuntime::Docker => "Install from: https://docs.docker.com/get-docker/",
            ContainerRuntime::Podman => {
                "Install from: https://podman.io/getting-started/installation"
            }
        };
        CommandPrereq::new(runtime.command(), hint)
    }

    /// Check all prerequisites
    /// Returns (found_tools, missing_tools with install hints)
    pub fn check_all(prereqs: &[&dyn Prerequisite]) -> (Vec<String>, Vec<(String, String)>) {
        let mut found = Vec::new();
        let mut missing = Vec::new();

        for prereq in prereqs {
            match prereq.check() {
                Ok(()) => found.push(prereq.name().to_string()),
                Err(PrereqError::NotFound { name, hint }) => missing.push((name, hint)),
            }
        }

        (found, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prereq_trait() {
        let prereq = CommandPrereq::new("sh", "Should always exist");
        assert_eq!(prereq.name(), "sh");
        assert!(prereq.check().is_ok());
    }

    #[test]
    fn test_missing_prereq() {
        let prereq = CommandPrereq::new("nonexistent-tool-xyz", "Test hint");
        assert!(prereq.check().is_err());
        assert_eq!(prereq.install_hint(), "Test hint");
    }

    #[test]
    fn test_check_all_splits_found_and_missing() {
        let present = CommandPrereq::new("sh", "n/a");
        let absent = CommandPrereq::new("nonexistent-tool-xyz", "get it");
        let (found, missing) = CommonPrereqs::check_all(&[&present, &absent]);
        assert_eq!(found, vec!["sh".to_string()]);
        assert_eq!(missing, vec![("nonexistent-tool-xyz".to_string(), "get it".to_string())]);
    }

    #[test]
    fn test_runtime_prereq_name() {
        assert_eq!(CommonPrereqs::runtime(ContainerRuntime::Podman).name(), "podman");
        assert_eq!(CommonPrereqs::kind().name(), "kind");
    }
}
