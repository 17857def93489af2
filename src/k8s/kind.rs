//! Kind cluster addressing: the control-plane node and the commands run against it

use anyhow::{Context, Result};

use crate::utils::{CommandRunner, ContainerRuntime, Invocation};

/// CLI used inside the node to manage the containerd image store
const NODE_RUNTIME_CLI: &str = "crictl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindCluster {
    pub name: String,
    pub runtime: ContainerRuntime,
}

impl KindCluster {
    pub fn new(name: impl Into<String>, runtime: ContainerRuntime) -> Self {
        Self {
            name: name.into(),
            runtime,
        }
    }

    /// Container name kind gives the control-plane node
    pub fn control_plane_node(&self) -> String {
        format!("{}-control-plane", self.name)
    }

    /// `crictl images` inside the node, as a single JSON document
    pub fn list_images(&self) -> Invocation {
        self.runtime.exec(
            &self.control_plane_node(),
            [NODE_RUNTIME_CLI, "images", "--output=json"],
        )
    }

    /// `crictl rmi` inside the node, addressed by image ID
    pub fn remove_image(&self, image_id: &str) -> Invocation {
        self.runtime
            .exec(&self.control_plane_node(), [NODE_RUNTIME_CLI, "rmi", image_id])
    }

    /// `kind load docker-image` for a `repository:tag` reference
    pub fn load_image(&self, image: &str) -> Invocation {
        let inv = Invocation::new("kind").args(["load", "docker-image", image, "--name", self.name.as_str()]);

        match self.runtime.kind_provider_env() {
            Some((key, value)) => inv.env(key, value),
            None => inv,
        }
    }

    /// Check if this cluster exists
    pub fn exists(&self, runner: &dyn CommandRunner) -> Result<bool> {
        Ok(Self::list_all(runner, self.runtime)?
            .iter()
            .any(|name| name == &self.name))
    }

    /// List all kind clusters
    pub fn list_all(runner: &dyn CommandRunner, runtime: ContainerRuntime) -> Result<Vec<String>> {
        let mut inv = Invocation::new("kind").args(["get", "clusters"]);
        if let Some((key, value)) = runtime.kind_provider_env() {
            inv = inv.env(key, value);
        }

        let output = runner
            .run_checked(&inv)
            .context("Failed to list kind clusters")?;

        let clusters = output
            .stdout
            .lines()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(clusters)
    }
}
