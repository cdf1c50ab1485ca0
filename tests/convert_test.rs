use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use image_convert_backend::config::AppConfig;
use image_convert_backend::services::converter::Converter;
use image_convert_backend::services::publisher::Publisher;
use image_convert_backend::services::storage::ObjectStorage;
use image_convert_backend::services::workspace::Workspace;
use image_convert_backend::{AppState, create_app};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

/// Stands in for the external conversion tool: copies the input (first
/// argument) to the output (last argument), ignoring the flags in between.
const COPY_STUB: &str = "#!/bin/sh\nfor last; do :; done\ncp \"$1\" \"$last\"\n";

const FAIL_STUB: &str = "#!/bin/sh\necho \"simulated decode failure\" >&2\nexit 1\n";

fn write_stub_converter(dir: &Path, script: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("convert-stub.sh");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn multipart_file(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
            Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
            Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn post_convert(uri: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn test_state(convert_command: &Path, publisher: Publisher) -> (AppState, Arc<Workspace>) {
    let workspace = Arc::new(Workspace::create().unwrap());
    let state = AppState {
        workspace: workspace.clone(),
        converter: Arc::new(Converter::new(
            convert_command.to_string_lossy().to_string(),
        )),
        publisher: Arc::new(publisher),
        config: AppConfig::default(),
    };
    (state, workspace)
}

fn workspace_entries(workspace: &Workspace) -> usize {
    std::fs::read_dir(workspace.root()).unwrap().count()
}

#[derive(Default)]
struct RecordingStorage {
    objects: tokio::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

#[async_trait::async_trait]
impl ObjectStorage for RecordingStorage {
    async fn put_object(&self, key: &str, data: Vec<u8>) -> anyhow::Result<()> {
        self.objects.lock().await.push((key.to_string(), data));
        Ok(())
    }
}

struct FailingStorage;

#[async_trait::async_trait]
impl ObjectStorage for FailingStorage {
    async fn put_object(&self, _key: &str, _data: Vec<u8>) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

#[tokio::test]
async fn test_inline_conversion_defaults_to_avif() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let (state, workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let image = b"\xff\xd8\xff\xe0 fake jpeg payload".repeat(64);
    let response = app
        .oneshot(post_convert("/convert", multipart_file("image", "test.jpg", &image)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/avif"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"test.avif\""
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &image[..]);

    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_explicit_format_drives_content_type() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let (state, workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let response = app
        .oneshot(post_convert(
            "/convert?format=webp",
            multipart_file("image", "test.jpg", b"payload"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/webp"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"test.webp\""
    );
    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_wrong_method_is_rejected_without_staging() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let (state, workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/convert")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_missing_image_field_is_client_error() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let (state, workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let response = app
        .oneshot(post_convert(
            "/convert",
            multipart_file("attachment", "test.jpg", b"payload"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("image"));

    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_unsupported_format_is_rejected_before_conversion() {
    let stub_dir = tempfile::tempdir().unwrap();
    // An unrunnable command proves the tool is never spawned for bad tags.
    let stub = stub_dir.path().join("does-not-exist");
    let (state, workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let response = app
        .oneshot(post_convert(
            "/convert?format=bmp",
            multipart_file("image", "test.jpg", b"payload"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("unsupported output format: bmp")
    );

    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_tool_failure_reports_diagnostics_and_cleans_up() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), FAIL_STUB);
    let (state, workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let response = app
        .oneshot(post_convert(
            "/convert",
            multipart_file("image", "test.jpg", b"payload"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(
        json["error"]
            .as_str()
            .unwrap()
            .contains("simulated decode failure")
    );

    // The staged input is removed even though conversion never produced output.
    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_oversized_upload_is_client_error() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let (mut state, workspace) = test_state(&stub, Publisher::inline());
    state.config.max_upload_size = 1024;
    let app = create_app(state);

    let response = app
        .oneshot(post_convert(
            "/convert",
            multipart_file("image", "big.jpg", &vec![0u8; 4096]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_storage_mode_returns_public_url() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let storage = Arc::new(RecordingStorage::default());
    let publisher = Publisher::storage(
        storage.clone(),
        "test-bucket".to_string(),
        "us-east-1".to_string(),
    );
    let (state, workspace) = test_state(&stub, publisher);
    let app = create_app(state);

    let image = b"fake jpeg payload".to_vec();
    let response = app
        .oneshot(post_convert(
            "/convert",
            multipart_file("image", "photo.jpg", &image),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let url = String::from_utf8(body.to_vec()).unwrap();

    let prefix = "https://test-bucket.s3.us-east-1.amazonaws.com/";
    assert!(url.starts_with(prefix), "unexpected URL: {url}");

    // Key is a fresh UUID carrying the original upload's extension.
    let key = url.strip_prefix(prefix).unwrap();
    let (stem, ext) = key.rsplit_once('.').unwrap();
    assert_eq!(ext, "jpg");
    assert!(Uuid::parse_str(stem).is_ok());

    let objects = storage.objects.lock().await;
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].0, key);
    assert_eq!(objects[0].1, image);
    drop(objects);

    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_storage_failure_is_distinct_server_error() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let publisher = Publisher::storage(
        Arc::new(FailingStorage),
        "test-bucket".to_string(),
        "us-east-1".to_string(),
    );
    let (state, workspace) = test_state(&stub, publisher);
    let app = create_app(state);

    let response = app
        .oneshot(post_convert(
            "/convert",
            multipart_file("image", "photo.jpg", b"payload"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("storage upload failed"));
    assert!(!message.contains("Error processing image"));

    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_upload_with_target_extension_stays_distinct() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let (state, workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let response = app
        .oneshot(post_convert(
            "/convert",
            multipart_file("image", "already.avif", b"payload"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"converted-already.avif\""
    );
    assert_eq!(workspace_entries(&workspace), 0);
}

#[tokio::test]
async fn test_health_reports_delivery_mode() {
    let stub_dir = tempfile::tempdir().unwrap();
    let stub = write_stub_converter(stub_dir.path(), COPY_STUB);
    let (state, _workspace) = test_state(&stub, Publisher::inline());
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["mode"], "inline");
}
