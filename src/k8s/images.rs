//! Image inventory: the local docker image store and the kind node's image store

use serde::{Deserialize, Deserializer, Serialize};

use crate::k8s::kind::KindCluster;
use crate::utils::{CommandRunner, ContainerRuntime, ImageError};

/// One image from `docker image ls --format={{json .}}`.
///
/// Field names follow the docker CLI template keys. Every field is a string
/// exactly as docker prints it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DockerImageRecord {
    pub containers: String,
    pub created_at: String,
    pub created_since: String,
    pub digest: String,
    #[serde(rename = "ID")]
    pub id: String,
    pub repository: String,
    pub shared_size: String,
    pub size: String,
    pub tag: String,
    pub unique_size: String,
    pub virtual_size: String,
}

impl DockerImageRecord {
    /// `repository:tag`, the reference `kind load docker-image` expects
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Top-level document printed by `crictl images --output=json`
#[derive(Debug, Clone, Default, Deserialize)]
struct KindImageList {
    #[serde(default)]
    images: Vec<KindImageRecord>,
}

/// One image known to the kind node's container runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KindImageRecord {
    pub id: String,
    #[serde(deserialize_with = "deserialize_uid")]
    pub uid: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub repo_tags: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub repo_digests: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(deserialize_with = "null_as_default")]
    pub username: String,
}

impl KindImageRecord {
    /// One entry per repo tag; an untagged image yields nothing
    pub fn display_rows(&self) -> impl Iterator<Item = (&str, &KindImageRecord)> {
        self.repo_tags.iter().map(move |tag| (tag.as_str(), self))
    }
}

/// crictl prints `uid` as `null` or `{"value": "..."}`; older builds print a string
fn deserialize_uid<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawUid {
        Plain(String),
        Wrapped { value: String },
    }

    Ok(Option::<RawUid>::deserialize(deserializer)?.map(|uid| match uid {
        RawUid::Plain(value) | RawUid::Wrapped { value } => value,
    }))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse docker's JSON-lines output.
///
/// Lines that are not a JSON object (the trailing empty line included) are
/// skipped rather than failing the whole listing.
pub fn parse_docker_images(stdout: &str) -> Vec<DockerImageRecord> {
    stdout
        .split('\n')
        .filter_map(|line| match serde_json::from_str::<DockerImageRecord>(line) {
            Ok(image) => Some(image),
            Err(e) => {
                if !line.trim().is_empty() {
                    crate::log_debug!("Skipping unparsable docker image line {:?}: {}", line, e);
                }
                None
            }
        })
        .collect()
}

/// Parse crictl's single JSON document. Any malformation fails the whole read.
pub fn parse_kind_images(stdout: &str) -> Result<Vec<KindImageRecord>, ImageError> {
    let list: KindImageList =
        serde_json::from_str(stdout).map_err(|source| ImageError::ParseFailed {
            what: "crictl image list",
            source,
        })?;

    Ok(list.images)
}

/// List images in the local docker image store, in docker's order
pub fn list_docker_images(
    runner: &dyn CommandRunner,
    runtime: ContainerRuntime,
) -> Result<Vec<DockerImageRecord>, ImageError> {
    let output = runner.run_checked(&runtime.list_images())?;
    let images = parse_docker_images(&output.stdout);

    crate::log_debug!("Found {} local {} image(s)", images.len(), runtime);
    Ok(images)
}

/// List images loaded into the kind control-plane node
pub fn list_kind_images(
    runner: &dyn CommandRunner,
    cluster: &KindCluster,
) -> Result<Vec<KindImageRecord>, ImageError> {
    let output = runner.run_checked(&cluster.list_images())?;
    let images = parse_kind_images(&output.stdout)?;

    crate::log_debug!(
        "Found {} image(s) in {}",
        images.len(),
        cluster.control_plane_node()
    );
    Ok(images)
}
