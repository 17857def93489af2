//! Mutating actions against the kind node and the single-flight loading guard

use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::k8s::images::{self, DockerImageRecord, KindImageRecord};
use crate::k8s::kind::KindCluster;
use crate::utils::dryrun::exec_unless_dry_run;
use crate::utils::{CommandRunner, ImageError};

/// Action name for loading a docker image into the kind node
pub const LOAD_ACTION: &str = "kind-images/load-image";

/// Action name for deleting an image from the kind node
pub const DELETE_ACTION: &str = "kind-images/delete-image";

/// Payload key carrying the image reference or image ID
pub const IMAGE_ID_KEY: &str = "imageID";

/// Process-wide "a load is in flight" flag
#[derive(Debug, Default)]
pub struct LoadingState {
    loading: AtomicBool,
}

impl LoadingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
    }

    /// Claim the flag if nobody holds it. The claim ends when the guard drops.
    pub fn try_claim(&self) -> Option<LoadingGuard<'_>> {
        self.loading
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| LoadingGuard { state: self })
    }

    /// Set the flag unconditionally, clearing it when the guard drops
    pub fn hold(&self) -> LoadingGuard<'_> {
        self.set_loading(true);
        LoadingGuard { state: self }
    }
}

/// Clears the loading flag on every exit path, unwinding included
#[derive(Debug)]
pub struct LoadingGuard<'a> {
    state: &'a LoadingState,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.set_loading(false);
    }
}

/// An action dispatched by the host: a name plus a JSON object payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionRequest {
    pub action_name: String,
    pub payload: Map<String, Value>,
}

impl ActionRequest {
    pub fn new(action_name: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            action_name: action_name.into(),
            payload,
        }
    }

    /// Request carrying only an `imageID`
    pub fn for_image(action_name: &str, image_id: impl Into<String>) -> Self {
        let mut payload = Map::new();
        payload.insert(IMAGE_ID_KEY.to_string(), Value::String(image_id.into()));
        Self::new(action_name, payload)
    }

    /// Read a string field from the payload
    pub fn string(&self, key: &str) -> Result<&str, ImageError> {
        match self.payload.get(key) {
            Some(Value::String(value)) => Ok(value.as_str()),
            Some(other) => Err(ImageError::PayloadError(format!(
                "{} must be a string, got {}",
                key, other
            ))),
            None => Err(ImageError::PayloadError(format!("missing {}", key))),
        }
    }
}

/// Reads both inventories and runs load/delete against one kind cluster
pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    cluster: KindCluster,
    loading: LoadingState,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, cluster: KindCluster) -> Self {
        Self {
            runner,
            cluster,
            loading: LoadingState::new(),
            dry_run: false,
        }
    }

    /// Log mutating commands instead of running them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn cluster(&self) -> &KindCluster {
        &self.cluster
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading.set_loading(loading);
    }

    pub fn docker_images(&self) -> Result<Vec<DockerImageRecord>, ImageError> {
        images::list_docker_images(self.runner(), self.cluster.runtime)
    }

    pub fn kind_images(&self) -> Result<Vec<KindImageRecord>, ImageError> {
        images::list_kind_images(self.runner(), &self.cluster)
    }

    /// Load `image` (`repository:tag`) into the node.
    ///
    /// Does not check whether another load is running; the flag is set for the
    /// duration of the call and cleared afterwards whatever the outcome.
    pub fn load_image(&self, image: &str) -> Result<(), ImageError> {
        let _guard = self.loading.hold();
        self.run_load(image)
    }

    /// Load `image` unless another load is in flight
    pub fn try_load_image(&self, image: &str) -> Result<(), ImageError> {
        let _guard = self.loading.try_claim().ok_or(ImageError::AlreadyLoading)?;
        self.run_load(image)
    }

    /// Delete an image from the node by ID. Takes no guard.
    pub fn delete_image(&self, image_id: &str) -> Result<(), ImageError> {
        let inv = self.cluster.remove_image(image_id);
        crate::log_info!("Deleting image {} from {}", image_id, self.cluster.control_plane_node());

        exec_unless_dry_run(self.dry_run, &inv.to_string(), (), || {
            self.runner
                .run_checked(&inv)
                .map(|_| ())
                .map_err(|source| ImageError::DeleteFailed {
                    image_id: image_id.to_string(),
                    source,
                })
        })?;

        crate::log_info!("Deleted image {}", image_id);
        Ok(())
    }

    /// Dispatch an action request from the host
    pub fn handle_action(&self, request: &ActionRequest) -> Result<(), ImageError> {
        match request.action_name.as_str() {
            LOAD_ACTION => {
                let _guard = self.loading.try_claim().ok_or(ImageError::AlreadyLoading)?;
                let image = request.string(IMAGE_ID_KEY)?;
                self.run_load(image)
            }
            DELETE_ACTION => {
                let image_id = request.string(IMAGE_ID_KEY)?;
                self.delete_image(image_id)
            }
            other => Err(ImageError::UnhandledAction(other.to_string())),
        }
    }

    fn run_load(&self, image: &str) -> Result<(), ImageError> {
        let inv = self.cluster.load_image(image);
        crate::log_info!("Loading image {} into kind cluster '{}'", image, self.cluster.name);

        exec_unless_dry_run(self.dry_run, &inv.to_string(), (), || {
            self.runner
                .run_checked(&inv)
                .map(|_| ())
                .map_err(|source| ImageError::LoadFailed {
                    image: image.to_string(),
                    source,
                })
        })?;

        crate::log_info!("Loaded image {}", image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::command::fake::{FakeRunner, ok};
    use crate::utils::{CommandError, ContainerRuntime};
    use serde_json::json;
    use std::sync::Barrier;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn orchestrator(runner: Arc<FakeRunner>) -> Orchestrator {
        Orchestrator::new(runner, KindCluster::new("kind", ContainerRuntime::Docker))
    }

    fn payload(value: serde_json::Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_set_loading_round_trip() {
        let state = LoadingState::new();
        assert!(!state.is_loading());
        state.set_loading(true);
        assert!(state.is_loading());
        state.set_loading(false);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_try_claim_is_exclusive() {
        let state = LoadingState::new();
        let guard = state.try_claim().expect("first claim");
        assert!(state.is_loading());
        assert!(state.try_claim().is_none());
        drop(guard);
        assert!(!state.is_loading());
        assert!(state.try_claim().is_some());
    }

    #[test]
    fn test_try_claim_single_winner_under_contention() {
        let state = Arc::new(LoadingState::new());
        let barrier = Arc::new(Barrier::new(8));
        let (tx, rx) = mpsc::channel();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                let barrier = Arc::clone(&barrier);
                let tx = tx.clone();
                thread::spawn(move || {
                    barrier.wait();
                    let claimed = state.try_claim();
                    tx.send(claimed.is_some()).unwrap();
                    // Hold the claim until every thread has tried
                    barrier.wait();
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        drop(tx);

        let winners = rx.iter().filter(|won| *won).count();
        assert_eq!(winners, 1);
        assert!(!state.is_loading());
    }

    #[test]
    fn test_guard_releases_on_panic() {
        let state = Arc::new(LoadingState::new());
        let inner = Arc::clone(&state);
        let result = thread::spawn(move || {
            let _guard = inner.hold();
            panic!("load blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(!state.is_loading());
    }

    #[test]
    fn test_load_image_success_clears_flag() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));

        orch.load_image("nginx:latest").unwrap();

        assert!(!orch.is_loading());
        assert_eq!(
            runner.call_lines(),
            vec!["kind load docker-image nginx:latest --name kind"]
        );
    }

    #[test]
    fn test_load_image_failure_clears_flag() {
        let runner = Arc::new(FakeRunner::failing(1));
        let orch = orchestrator(runner);

        let err = orch.load_image("nginx:latest").unwrap_err();

        assert!(matches!(
            err,
            ImageError::LoadFailed {
                source: CommandError::NonZeroExit { .. },
                ..
            }
        ));
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_load_image_spawn_failure_clears_flag() {
        let runner = Arc::new(FakeRunner::new(|inv| {
            Err(CommandError::SpawnFailed {
                command: inv.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "kind"),
            })
        }));
        let orch = orchestrator(runner);

        let err = orch.load_image("nginx:latest").unwrap_err();
        assert!(matches!(
            err,
            ImageError::LoadFailed {
                source: CommandError::SpawnFailed { .. },
                ..
            }
        ));
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_flag_is_set_while_load_runs() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let orch_slot: Arc<std::sync::OnceLock<Arc<Orchestrator>>> = Arc::default();

        let slot = Arc::clone(&orch_slot);
        let runner = Arc::new(FakeRunner::new(move |_| {
            let loading = slot.get().map(|orch| orch.is_loading());
            seen_tx.send(loading).unwrap();
            Ok(ok(""))
        }));
        let orch = Arc::new(orchestrator(runner));
        orch_slot.set(Arc::clone(&orch)).ok();

        orch.load_image("nginx:latest").unwrap();
        assert_eq!(seen_rx.recv().unwrap(), Some(true));
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_load_action_rejected_while_loading() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));
        orch.set_loading(true);

        let err = orch
            .handle_action(&ActionRequest::for_image(LOAD_ACTION, "nginx:latest"))
            .unwrap_err();

        assert!(matches!(err, ImageError::AlreadyLoading));
        assert!(runner.calls().is_empty());
        // The rejected request must not clear someone else's claim
        assert!(orch.is_loading());
    }

    #[test]
    fn test_try_load_image_rejected_while_loading() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));
        let _guard = orch.loading.try_claim().unwrap();

        let err = orch.try_load_image("nginx:latest").unwrap_err();
        assert!(matches!(err, ImageError::AlreadyLoading));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_load_action_runs_kind_load() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));

        orch.handle_action(&ActionRequest::new(
            LOAD_ACTION,
            payload(json!({"action": LOAD_ACTION, "imageID": "redis:7"})),
        ))
        .unwrap();

        assert_eq!(
            runner.call_lines(),
            vec!["kind load docker-image redis:7 --name kind"]
        );
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_load_action_failure_clears_flag() {
        let runner = Arc::new(FakeRunner::failing(1));
        let orch = orchestrator(runner);

        let err = orch
            .handle_action(&ActionRequest::for_image(LOAD_ACTION, "redis:7"))
            .unwrap_err();
        assert!(matches!(err, ImageError::LoadFailed { .. }));
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_load_action_payload_errors() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));

        let missing = orch
            .handle_action(&ActionRequest::new(LOAD_ACTION, Map::new()))
            .unwrap_err();
        assert!(matches!(missing, ImageError::PayloadError(_)));

        let wrong_type = orch
            .handle_action(&ActionRequest::new(
                LOAD_ACTION,
                payload(json!({"imageID": 42})),
            ))
            .unwrap_err();
        assert!(matches!(wrong_type, ImageError::PayloadError(_)));

        assert!(runner.calls().is_empty());
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_delete_action_runs_crictl_rmi() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));

        orch.handle_action(&ActionRequest::for_image(DELETE_ACTION, "sha256:abc"))
            .unwrap();

        assert_eq!(
            runner.call_lines(),
            vec!["docker exec kind-control-plane crictl rmi sha256:abc"]
        );
    }

    #[test]
    fn test_delete_action_payload_error() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));

        let err = orch
            .handle_action(&ActionRequest::new(
                DELETE_ACTION,
                payload(json!({"imageID": null})),
            ))
            .unwrap_err();
        assert!(matches!(err, ImageError::PayloadError(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_delete_failure() {
        let runner = Arc::new(FakeRunner::failing(1));
        let orch = orchestrator(runner);

        let err = orch.delete_image("sha256:abc").unwrap_err();
        match err {
            ImageError::DeleteFailed { image_id, .. } => assert_eq!(image_id, "sha256:abc"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_delete_allowed_while_loading() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));
        orch.set_loading(true);

        orch.handle_action(&ActionRequest::for_image(DELETE_ACTION, "sha256:abc"))
            .unwrap();
        assert_eq!(runner.calls().len(), 1);
        assert!(orch.is_loading());
    }

    #[test]
    fn test_unknown_action() {
        let runner = Arc::new(FakeRunner::with_stdout(""));
        let orch = orchestrator(Arc::clone(&runner));

        let err = orch
            .handle_action(&ActionRequest::for_image("unknown-action", "x"))
            .unwrap_err();

        match err {
            ImageError::UnhandledAction(name) => assert_eq!(name, "unknown-action"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_concurrent_deletes_do_not_block_each_other() {
        // Each delete waits until both are inside the runner at the same time
        let barrier = Arc::new(Barrier::new(2));
        let inner = Arc::clone(&barrier);
        let runner = Arc::new(FakeRunner::new(move |_| {
            inner.wait();
            Ok(ok(""))
        }));
        let orch = Arc::new(orchestrator(Arc::clone(&runner)));

        let handles: Vec<_> = ["sha256:aaa", "sha256:bbb"]
            .into_iter()
            .map(|id| {
                let orch = Arc::clone(&orch);
                thread::spawn(move || orch.delete_image(id))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let mut calls = runner.call_lines();
        calls.sort();
        assert_eq!(
            calls,
            vec![
                "docker exec kind-control-plane crictl rmi sha256:aaa",
                "docker exec kind-control-plane crictl rmi sha256:bbb",
            ]
        );
    }

    #[test]
    fn test_concurrent_loads_single_flight() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = std::sync::Mutex::new(release_rx);
        let runner = Arc::new(FakeRunner::new(move |_| {
            entered_tx.send(()).unwrap();
            release_rx.lock().unwrap().recv_timeout(Duration::from_secs(5)).ok();
            Ok(ok(""))
        }));
        let orch = Arc::new(orchestrator(Arc::clone(&runner)));

        let first = {
            let orch = Arc::clone(&orch);
            thread::spawn(move || orch.handle_action(&ActionRequest::for_image(LOAD_ACTION, "a:1")))
        };
        entered_rx.recv().unwrap();

        let second = orch.handle_action(&ActionRequest::for_image(LOAD_ACTION, "b:2"));
        assert!(matches!(second, Err(ImageError::AlreadyLoading)));

        release_tx.send(()).unwrap();
        first.join().unwrap().unwrap();

        assert_eq!(runner.calls().len(), 1);
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_dry_run_skips_commands() {
        let runner = Arc::new(FakeRunner::failing(1));
        let orch = orchestrator(Arc::clone(&runner)).with_dry_run(true);

        orch.load_image("nginx:latest").unwrap();
        orch.delete_image("sha256:abc").unwrap();

        assert!(runner.calls().is_empty());
        assert!(!orch.is_loading());
    }

    #[test]
    fn test_inventory_reads_go_through_runner() {
        let runner = Arc::new(FakeRunner::new(|inv| {
            if inv.args.iter().any(|a| a == "crictl") {
                Ok(ok(r#"{"images":[{"id":"img1","repoTags":["a:1"],"size":"10MB"}]}"#))
            } else {
                Ok(ok("{\"Repository\":\"nginx\",\"Tag\":\"latest\"}\n"))
            }
        }));
        let orch = orchestrator(runner);

        assert_eq!(orch.docker_images().unwrap()[0].reference(), "nginx:latest");
        assert_eq!(orch.kind_images().unwrap()[0].id, "img1");
    }
}
