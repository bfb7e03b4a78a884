// HTTP control API tests, driven through the router without a socket

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use gorec::config::UploadConfig;
use gorec::http::ErrorResponse;
use gorec::media::{SourceKind, SyntheticConfig, SyntheticDevices};
use gorec::{
    create_router, AppState, FrameMuxerFactory, MemoryStore, Recorder, RecorderSettings, Uploader,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const STORAGE_URL: &str = "https://storage.example.com";

fn app(devices: &Arc<SyntheticDevices>, downloads: &Path) -> Router {
    app_with_store(devices, downloads, Arc::new(MemoryStore::new(STORAGE_URL)))
}

fn app_with_store(
    devices: &Arc<SyntheticDevices>,
    downloads: &Path,
    store: Arc<MemoryStore>,
) -> Router {
    let recorder = Recorder::new(
        devices.clone(),
        Arc::new(FrameMuxerFactory::new()),
        RecorderSettings::default(),
    );
    let config = UploadConfig {
        share_base_url: "https://gorec.example".to_string(),
        ..UploadConfig::default()
    };
    let uploader = Arc::new(Uploader::new(store, &config));
    create_router(AppState::new(recorder, downloads.to_path_buf(), uploader))
}

fn devices() -> Arc<SyntheticDevices> {
    Arc::new(SyntheticDevices::new(SyntheticConfig {
        screen_size: (320, 180),
        ..SyntheticConfig::default()
    }))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let request = match body {
        Some(body) => Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&devices(), dir.path());

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn test_status_starts_idle() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&devices(), dir.path());

    let (status, body) = send_json(&app, Method::GET, "/recording/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["formatted_time"], "00:00");
    assert_eq!(body["settings"]["webcam_enabled"], false);
    assert!(body["artifact"].is_null());
}

#[tokio::test(start_paused = true)]
async fn test_record_stop_and_download() {
    let dir = tempfile::tempdir().unwrap();
    let devices = devices();
    let app = app(&devices, dir.path());

    let (status, body) = send_json(&app, Method::POST, "/recording/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");

    let (status, _) = send_json(&app, Method::POST, "/recording/start", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let (status, body) = send_json(&app, Method::POST, "/recording/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "stopped");
    assert_eq!(body["formatted_time"], "00:01");
    assert_eq!(body["artifact"]["mime_type"], "video/webm;codecs=vp9");
    let size = body["artifact"]["size"].as_u64().unwrap();
    assert!(size > 0);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/recording/artifact")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "video/webm;codecs=vp9"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.len() as u64, size);

    let (status, body) = send_json(&app, Method::POST, "/recording/download", None).await;
    assert_eq!(status, StatusCode::OK);
    let filename = body["filename"].as_str().unwrap();
    assert!(filename.starts_with("recording-") && filename.ends_with(".webm"));
    assert!(dir.path().join(filename).exists());

    assert!(devices.live_tracks().is_empty());
}

#[tokio::test]
async fn test_artifact_missing_before_recording() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&devices(), dir.path());

    let (status, bytes) = send(&app, Method::GET, "/recording/artifact", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "noRecording");
}

#[tokio::test]
async fn test_denied_screen_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let devices = devices();
    devices.deny(SourceKind::Screen);
    let app = app(&devices, dir.path());

    let (status, bytes) = send(&app, Method::POST, "/recording/start", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "screenDenied");

    let (_, body) = send_json(&app, Method::GET, "/recording/status", None).await;
    assert_eq!(body["state"], "idle");
}

#[tokio::test(start_paused = true)]
async fn test_settings_toggles_locked_while_recording() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&devices(), dir.path());

    let (status, body) =
        send_json(&app, Method::POST, "/settings/system-audio/toggle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], true);

    send_json(&app, Method::POST, "/recording/start", None).await;

    let (status, bytes) = send(&app, Method::POST, "/settings/microphone/toggle", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "settingsLocked");

    // Layout stays adjustable mid-recording
    let (status, body) = send_json(
        &app,
        Method::PUT,
        "/settings/webcam/layout",
        Some(json!({ "position": "top-left" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["position"], "top-left");
    assert_eq!(body["size"], "medium");

    send_json(&app, Method::POST, "/recording/stop", None).await;
    send_json(&app, Method::POST, "/recording/reset", None).await;
}

#[tokio::test]
async fn test_denied_webcam_toggle_carries_notice() {
    let dir = tempfile::tempdir().unwrap();
    let devices = devices();
    devices.deny(SourceKind::Webcam);
    let app = app(&devices, dir.path());

    let (status, body) = send_json(&app, Method::POST, "/settings/webcam/toggle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["enabled"], false);
    assert_eq!(body["notice"]["key"], "webcamDenied");
}

#[tokio::test]
async fn test_device_refresh_and_selection() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&devices(), dir.path());

    let (status, body) =
        send_json(&app, Method::POST, "/devices/audio-inputs/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    let devices = body.as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["label"], "Built-in Microphone");

    let (status, body) = send_json(
        &app,
        Method::PUT,
        "/settings/microphone/device",
        Some(json!({ "device_id": "usb-0d8c-0014" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["microphone_device_id"], "usb-0d8c-0014");

    let (status, _) = send_json(
        &app,
        Method::PUT,
        "/settings/microphone/device",
        Some(json!({ "device_id": "gone" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send_json(&app, Method::GET, "/devices/audio-inputs", None).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_upload_without_recording_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(&devices(), dir.path());

    let (status, bytes) = send(&app, Method::POST, "/recording/upload", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "noRecording");
}

#[tokio::test(start_paused = true)]
async fn test_upload_requires_sign_in_then_returns_share_link() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new(STORAGE_URL));
    let app = app_with_store(&devices(), dir.path(), store.clone());

    send_json(&app, Method::POST, "/recording/start", None).await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    send_json(&app, Method::POST, "/recording/stop", None).await;

    let (status, bytes) = send(&app, Method::POST, "/recording/upload", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "loginRequired");
    assert!(store.rows().is_empty());

    store.sign_in("user-7");
    let (status, body) = send_json(&app, Method::POST, "/recording/upload", None).await;
    assert_eq!(status, StatusCode::OK);

    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].record.duration_seconds, Some(2));
    assert_eq!(rows[0].record.user_id, "user-7");
    assert_eq!(body["share_token"], rows[0].share_token.as_str());
    assert_eq!(
        body["share_url"],
        format!("https://gorec.example/watch/{}", rows[0].share_token)
    );
    assert!(body["public_url"]
        .as_str()
        .unwrap()
        .starts_with("https://storage.example.com/"));
}

#[tokio::test(start_paused = true)]
async fn test_upload_storage_failure_is_bad_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new(STORAGE_URL));
    store.sign_in("user-7");
    store.fail_writes(true);
    let app = app_with_store(&devices(), dir.path(), store.clone());

    send_json(&app, Method::POST, "/recording/start", None).await;
    tokio::time::sleep(Duration::from_millis(1200)).await;
    send_json(&app, Method::POST, "/recording/stop", None).await;

    let (status, bytes) = send(&app, Method::POST, "/recording/upload", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(error.error, "uploadFailed");
    assert!(store.rows().is_empty());
}
