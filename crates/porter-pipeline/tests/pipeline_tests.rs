//! End-to-end pipeline tests
//!
//! Drive a whole run against a mocked control plane (wiremock) and an
//! in-memory object store, then assert on the typed event stream: phase
//! ordering, dedup silence, retry exhaustion, fatal paths.

use porter_common::Event;
use porter_pipeline::api::ApiClient;
use porter_pipeline::checksum;
use porter_pipeline::cli::Invocation;
use porter_pipeline::config::PipelineConfig;
use porter_pipeline::events::EventSink;
use porter_pipeline::pack::PrepackedSource;
use porter_pipeline::pipeline::Pipeline;
use porter_pipeline::storage::{ObjectStore, RemoteObject, StorageError};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROJECT_ID: &str = "123e4567-e89b-12d3-a456-426614174000";

/// In-memory object store.
#[derive(Default)]
struct MemoryStore {
    /// key -> checksum of objects already present
    objects: Mutex<HashMap<String, String>>,
    /// key -> transfer attempts
    attempts: Mutex<HashMap<String, u32>>,
    fail_transfers: bool,
}

impl MemoryStore {
    fn prime(&self, key: &str, checksum: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), checksum.to_string());
    }

    fn attempts_for(&self, key: &str) -> u32 {
        self.attempts.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    fn record_attempt(&self, key: &str) -> Result<(), StorageError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert(0) += 1;
        if self.fail_transfers {
            Err(StorageError::Request {
                key: key.to_string(),
                message: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, key: &str) -> Result<Option<RemoteObject>, StorageError> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|checksum| RemoteObject {
                checksum: Some(checksum.clone()),
                size_bytes: 0,
            }))
    }

    async fn put_object(&self, key: &str, _body: Vec<u8>) -> Result<(), StorageError> {
        self.record_attempt(key)?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), "stored".to_string());
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String, StorageError> {
        Ok(format!("upload-{key}"))
    }

    async fn upload_part(
        &self,
        key: &str,
        _upload_id: &str,
        part_number: i32,
        _body: Vec<u8>,
    ) -> Result<String, StorageError> {
        self.record_attempt(key)?;
        Ok(format!("part-{part_number}"))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        _upload_id: &str,
        _parts: Vec<(i32, String)>,
    ) -> Result<(), StorageError> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), "stored".to_string());
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, _upload_id: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

/// Control plane that accepts the prepare and finish calls.
async fn accepting_control_plane() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/projects/prepare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": { "id": PROJECT_ID }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/api/v1/projects/.+/finish$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true
        })))
        .mount(&server)
        .await;

    server
}

struct World {
    _scene_dir: TempDir,
    target_dir: TempDir,
    server: MockServer,
    invocation: Invocation,
}

/// A packed directory with the given files, plus a scene file outside it.
async fn world(files: &[(&str, &[u8])]) -> World {
    let server = accepting_control_plane().await;

    let scene_dir = TempDir::new().unwrap();
    let scene_path = scene_dir.path().join("shot.blend");
    fs::write(&scene_path, b"scene bytes").unwrap();

    let target_dir = TempDir::new().unwrap();
    for (name, content) in files {
        fs::write(target_dir.path().join(name), content).unwrap();
    }

    let invocation = Invocation {
        scene_path,
        target_path: target_dir.path().to_path_buf(),
        project_name: "demo".to_string(),
        api_url: server.uri(),
        session_token: "token".to_string(),
        storage_endpoint: "http://127.0.0.1:9000".to_string(),
        storage_access_key: "access".to_string(),
        storage_secret_key: "secret".to_string(),
        bucket: "projects".to_string(),
    };

    World {
        _scene_dir: scene_dir,
        target_dir,
        server,
        invocation,
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        chunk_size_bytes: 1024,
        upload_workers: 2,
        max_retries: 5,
    }
}

fn remote_key(name: &str) -> String {
    format!("projects/{}/{}", PROJECT_ID, name)
}

async fn run_pipeline(
    invocation: Invocation,
    config: PipelineConfig,
    store: Arc<MemoryStore>,
) -> (i32, Vec<Event>) {
    let (sink, mut rx) = EventSink::channel();
    let api = ApiClient::new(
        invocation.api_url.clone(),
        invocation.session_token.clone(),
    )
    .unwrap();

    let pipeline = Pipeline::new(
        invocation,
        config,
        api,
        store,
        Box::new(PrepackedSource),
        sink,
    );
    let exit_code = pipeline.run().await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    (exit_code, events)
}

fn tag_index(events: &[Event], tag: &str) -> Option<usize> {
    events.iter().position(|e| e.tag() == tag)
}

#[tokio::test]
async fn test_successful_run_event_ordering() {
    let world = world(&[("a.bin", b"alpha"), ("b.bin", b"bravo")]).await;
    let store = Arc::new(MemoryStore::default());

    let (exit_code, events) = run_pipeline(world.invocation, test_config(), store).await;

    assert_eq!(exit_code, 0);

    let pack_start = tag_index(&events, "PACK_START").unwrap();
    let pack_end = tag_index(&events, "PACK_END").unwrap();
    let upload_start = tag_index(&events, "UPLOAD_START").unwrap();
    let first_progress = tag_index(&events, "UPLOAD_PROGRESS").unwrap();
    let upload_end = tag_index(&events, "UPLOAD_END").unwrap();
    let end = tag_index(&events, "END").unwrap();

    assert!(pack_start < pack_end);
    assert!(pack_end < upload_start);
    assert!(upload_start < first_progress);
    assert!(first_progress < upload_end);
    assert!(upload_end < end);
    assert_eq!(end, events.len() - 1);

    assert!(matches!(events[upload_end], Event::UploadEnd { success: true, .. }));
    assert!(matches!(events[end], Event::End { exit_code: 0 }));

    // Both files reach 100 percent.
    let done: Vec<&String> = events
        .iter()
        .filter_map(|e| match e {
            Event::UploadProgress {
                relative_path,
                percent,
            } if *percent == 100.0 => Some(relative_path),
            _ => None,
        })
        .collect();
    assert_eq!(done.len(), 2);
}

#[tokio::test]
async fn test_rerun_with_matching_checksums_transfers_nothing() {
    let world = world(&[("a.bin", b"stable content"), ("b.bin", b"more stable content")]).await;
    let store = Arc::new(MemoryStore::default());

    for name in ["a.bin", "b.bin"] {
        let local = world.target_dir.path().join(name);
        let checksum = checksum::compute(&local, 1024).unwrap();
        store.prime(&remote_key(name), &checksum);
    }

    let (exit_code, events) = run_pipeline(world.invocation, test_config(), store.clone()).await;

    assert_eq!(exit_code, 0);
    assert_eq!(store.attempts_for(&remote_key("a.bin")), 0);
    assert_eq!(store.attempts_for(&remote_key("b.bin")), 0);
    assert!(events.iter().all(|e| !matches!(e, Event::UploadProgress { .. })));
    assert!(events.iter().all(|e| !matches!(e, Event::UploadError { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::UploadEnd { success: true, .. })));
}

#[tokio::test]
async fn test_partial_dedup_only_new_file_reports_progress() {
    let world = world(&[("a.bin", b"already uploaded"), ("b.bin", b"new bytes")]).await;
    let store = Arc::new(MemoryStore::default());

    let local = world.target_dir.path().join("a.bin");
    let checksum = checksum::compute(&local, 1024).unwrap();
    store.prime(&remote_key("a.bin"), &checksum);

    let (exit_code, events) = run_pipeline(world.invocation, test_config(), store.clone()).await;

    assert_eq!(exit_code, 0);
    for event in &events {
        if let Event::UploadProgress { relative_path, .. } = event {
            assert_eq!(relative_path, "b.bin");
        }
    }
    assert_eq!(store.attempts_for(&remote_key("a.bin")), 0);
    assert_eq!(store.attempts_for(&remote_key("b.bin")), 1);
}

#[tokio::test]
async fn test_retry_exhaustion_fails_run_and_stops_new_work() {
    let world = world(&[("c.bin", b"doomed"), ("d.bin", b"queued behind")]).await;
    let store = Arc::new(MemoryStore {
        fail_transfers: true,
        ..MemoryStore::default()
    });

    let config = PipelineConfig {
        upload_workers: 1,
        ..test_config()
    };
    let (exit_code, events) = run_pipeline(world.invocation, config, store.clone()).await;

    assert_eq!(exit_code, 1);

    // max_retries = 5 -> exactly 6 attempts, then one terminal error.
    assert_eq!(store.attempts_for(&remote_key("c.bin")), 6);
    assert_eq!(store.attempts_for(&remote_key("d.bin")), 0);

    let errors: Vec<&Event> = events
        .iter()
        .filter(|e| matches!(e, Event::UploadError { .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        Event::UploadError { relative_path, .. } if relative_path == "c.bin"
    ));

    assert!(events
        .iter()
        .any(|e| matches!(e, Event::UploadEnd { success: false, .. })));
    assert!(matches!(events.last().unwrap(), Event::End { exit_code: 1 }));

    // The control plane still hears about the attempt.
    let requests = world
        .server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/finish"))
        .count();
    assert_eq!(requests, 1);
}

#[tokio::test]
async fn test_missing_target_directory_is_fatal_before_upload_start() {
    let mut world = world(&[]).await;
    world.invocation.target_path = PathBuf::from("/nonexistent/porter-target");

    let store = Arc::new(MemoryStore::default());
    let (exit_code, events) = run_pipeline(world.invocation, test_config(), store).await;

    assert_eq!(exit_code, 1);
    assert!(tag_index(&events, "PROJECT_CREATION_ERROR").is_some());
    assert!(tag_index(&events, "UPLOAD_START").is_none());
    assert!(matches!(events.last().unwrap(), Event::End { exit_code: 1 }));

    // The control plane never hears about the project.
    let prepares = world
        .server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/prepare"))
        .count();
    assert_eq!(prepares, 0);
}

#[tokio::test]
async fn test_rejected_project_creation_reports_server_body() {
    let world = world(&[("a.bin", b"bytes")]).await;

    // Replace the accepting control plane with a rejecting one.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/prepare"))
        .respond_with(ResponseTemplate::new(403).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let mut invocation = world.invocation;
    invocation.api_url = server.uri();

    let store = Arc::new(MemoryStore::default());
    let (exit_code, events) = run_pipeline(invocation, test_config(), store).await;

    assert_eq!(exit_code, 1);
    let creation_error = events
        .iter()
        .find_map(|e| match e {
            Event::ProjectCreationError { message, .. } => Some(message.clone()),
            _ => None,
        })
        .unwrap();
    assert!(creation_error.contains("quota exceeded"));
    assert!(tag_index(&events, "UPLOAD_START").is_none());
}

#[tokio::test]
async fn test_empty_target_directory_still_finishes_successfully() {
    let world = world(&[]).await;
    let store = Arc::new(MemoryStore::default());

    let (exit_code, events) = run_pipeline(world.invocation, test_config(), store).await;

    assert_eq!(exit_code, 0);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::UploadEnd { success: true, .. })));

    let finishes = world
        .server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with("/finish"))
        .count();
    assert_eq!(finishes, 1);
}

#[tokio::test]
async fn test_missing_scene_file_is_a_pack_error() {
    let mut world = world(&[("a.bin", b"bytes")]).await;
    world.invocation.scene_path = PathBuf::from("/nonexistent/porter-shot.blend");

    let store = Arc::new(MemoryStore::default());
    let (exit_code, events) = run_pipeline(world.invocation, test_config(), store).await;

    assert_eq!(exit_code, 1);
    assert!(tag_index(&events, "PACK_ERROR").is_some());
    let pack_end = events
        .iter()
        .find_map(|e| match e {
            Event::PackEnd { success, .. } => Some(*success),
            _ => None,
        })
        .unwrap();
    assert!(!pack_end);
    assert!(tag_index(&events, "UPLOAD_START").is_none());
    assert!(tag_index(&events, "PROJECT_CREATION_ERROR").is_none());
}

#[tokio::test]
async fn test_missing_assets_are_reported_but_not_fatal() {
    use porter_pipeline::pack::{PackError, PackReport, Packer};

    /// Packer that resolved everything except one texture.
    struct LossyPacker;

    #[async_trait::async_trait]
    impl Packer for LossyPacker {
        async fn pack(
            &self,
            scene_path: &std::path::Path,
            target_path: &std::path::Path,
            sink: &EventSink,
        ) -> Result<PackReport, PackError> {
            sink.emit(Event::PackStart {
                scene_path: scene_path.display().to_string(),
                target_path: target_path.display().to_string(),
            });
            sink.emit(Event::PackProgress { percent: 100.0 });
            Ok(PackReport {
                missing_files: vec!["textures/lost.png".to_string()],
            })
        }
    }

    let world = world(&[("a.bin", b"bytes")]).await;
    let store = Arc::new(MemoryStore::default());

    let (sink, mut rx) = EventSink::channel();
    let api = ApiClient::new(
        world.invocation.api_url.clone(),
        world.invocation.session_token.clone(),
    )
    .unwrap();
    let pipeline = Pipeline::new(
        world.invocation.clone(),
        test_config(),
        api,
        store,
        Box::new(LossyPacker),
        sink,
    );
    let exit_code = pipeline.run().await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(exit_code, 0);
    let missing = tag_index(&events, "MISSING_FILE").unwrap();
    let pack_end = tag_index(&events, "PACK_END").unwrap();
    assert!(missing < pack_end);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::MissingFile { file, .. } if file == "textures/lost.png")));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::UploadEnd { success: true, .. })));
}

#[tokio::test]
async fn test_failed_finish_downgrades_success() {
    let world = world(&[("a.bin", b"bytes")]).await;

    // Accept prepare, fail finish.
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/projects/prepare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "data": { "id": PROJECT_ID }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/api/v1/projects/.+/finish$"))
        .respond_with(ResponseTemplate::new(500).set_body_string("finalize failed"))
        .mount(&server)
        .await;

    let mut invocation = world.invocation;
    invocation.api_url = server.uri();

    let store = Arc::new(MemoryStore::default());
    let (exit_code, events) = run_pipeline(invocation, test_config(), store).await;

    assert_eq!(exit_code, 1);
    assert!(tag_index(&events, "ERROR").is_some());
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::UploadEnd { success: false, .. })));
}
