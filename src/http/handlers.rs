use super::state::AppState;
use crate::compositor::{OverlayLayout, OverlayPosition, OverlaySize};
use crate::error::{Notice, RecorderError};
use crate::media::AudioInputDevice;
use crate::orchestrator::{ArtifactInfo, RecorderEvent, RecorderStatus};
use crate::recorder::RecordingState;
use crate::upload::UploadError;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub state: RecordingState,
    pub formatted_time: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub state: RecordingState,
    pub formatted_time: String,
    pub artifact: Option<ArtifactInfo>,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub path: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub enabled: bool,
    /// Set when enabling degraded (permission denied, device missing)
    pub notice: Option<Notice>,
}

#[derive(Debug, Deserialize)]
pub struct SelectDeviceRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    pub position: Option<OverlayPosition>,
    pub size: Option<OverlaySize>,
}

/// Error body: a stable message key plus generic user-facing text
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(err: &RecorderError) -> Response {
    let status = match err {
        RecorderError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        RecorderError::DeviceUnavailable(_) | RecorderError::NoArtifact => StatusCode::NOT_FOUND,
        RecorderError::InvalidState { .. } | RecorderError::SettingsLocked => StatusCode::CONFLICT,
        RecorderError::NoVideoSource => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }

    let notice = err.notice();
    (
        status,
        Json(ErrorResponse {
            error: notice.key,
            message: notice.message,
        }),
    )
        .into_response()
}

fn upload_error_response(err: &UploadError) -> Response {
    let status = match err {
        UploadError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        UploadError::NoRecording => StatusCode::NOT_FOUND,
        UploadError::InvalidType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        UploadError::Empty => StatusCode::UNPROCESSABLE_ENTITY,
        UploadError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        UploadError::Storage(_) => StatusCode::BAD_GATEWAY,
    };
    if status.is_server_error() {
        error!("Upload failed: {}", err);
    } else {
        warn!("Upload rejected: {}", err);
    }

    let notice = err.notice();
    (
        status,
        Json(ErrorResponse {
            error: notice.key,
            message: notice.message,
        }),
    )
        .into_response()
}

/// Last notice published since `events` was subscribed
fn latest_notice(events: &mut broadcast::Receiver<RecorderEvent>) -> Option<Notice> {
    let mut notice = None;
    while let Ok(event) = events.try_recv() {
        if let RecorderEvent::Notice(n) = event {
            notice = Some(n);
        }
    }
    notice
}

async fn state_response(state: &AppState) -> Response {
    let status = state.recorder.status().await;
    (
        StatusCode::OK,
        Json(StateResponse {
            state: status.state,
            formatted_time: status.formatted_time,
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /recording/status
pub async fn get_status(State(state): State<AppState>) -> Json<RecorderStatus> {
    Json(state.recorder.status().await)
}

/// POST /recording/start
pub async fn start_recording(State(state): State<AppState>) -> Response {
    info!("Start requested");
    match state.recorder.start().await {
        Ok(()) => state_response(&state).await,
        Err(e) => error_response(&e),
    }
}

/// POST /recording/pause
pub async fn pause_recording(State(state): State<AppState>) -> Response {
    match state.recorder.pause().await {
        Ok(()) => state_response(&state).await,
        Err(e) => error_response(&e),
    }
}

/// POST /recording/resume
pub async fn resume_recording(State(state): State<AppState>) -> Response {
    match state.recorder.resume().await {
        Ok(()) => state_response(&state).await,
        Err(e) => error_response(&e),
    }
}

/// POST /recording/stop
pub async fn stop_recording(State(state): State<AppState>) -> Response {
    info!("Stop requested");
    match state.recorder.stop().await {
        Ok(artifact) => {
            let status = state.recorder.status().await;
            (
                StatusCode::OK,
                Json(StopRecordingResponse {
                    state: status.state,
                    formatted_time: status.formatted_time,
                    artifact: artifact.as_ref().map(ArtifactInfo::from),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// POST /recording/reset
pub async fn reset_recording(State(state): State<AppState>) -> Response {
    state.recorder.reset().await;
    state_response(&state).await
}

/// GET /recording/artifact
/// Raw recording bytes with the negotiated content type
pub async fn get_artifact(State(state): State<AppState>) -> Response {
    match state.recorder.artifact().await {
        Ok(artifact) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, artifact.mime_type().to_string())],
            artifact.bytes().to_vec(),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /recording/download
/// Save the recording under a timestamped name in the downloads directory
pub async fn download_recording(State(state): State<AppState>) -> Response {
    match state.recorder.save_artifact(&state.downloads_dir).await {
        Ok(path) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (
                StatusCode::OK,
                Json(DownloadResponse {
                    path: path.display().to_string(),
                    filename,
                }),
            )
                .into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// POST /recording/upload
/// Upload the finalized recording with its duration
pub async fn upload_recording(State(state): State<AppState>) -> Response {
    match state.recorder.upload(&state.uploader).await {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => upload_error_response(&e),
    }
}

/// GET /devices/audio-inputs
pub async fn list_audio_inputs(State(state): State<AppState>) -> Json<Vec<AudioInputDevice>> {
    Json(state.recorder.audio_devices().await)
}

/// POST /devices/audio-inputs/refresh
pub async fn refresh_audio_inputs(State(state): State<AppState>) -> Response {
    match state.recorder.refresh_devices().await {
        Ok(devices) => (StatusCode::OK, Json(devices)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT /settings/microphone/device
pub async fn select_microphone_device(
    State(state): State<AppState>,
    Json(req): Json<SelectDeviceRequest>,
) -> Response {
    match state.recorder.select_audio_device(&req.device_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(state.recorder.composition_config().await),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// POST /settings/microphone/toggle
pub async fn toggle_microphone(State(state): State<AppState>) -> Response {
    let mut events = state.recorder.subscribe();
    let result = state.recorder.toggle_microphone().await;
    toggle_response(result, &mut events)
}

/// POST /settings/system-audio/toggle
pub async fn toggle_system_audio(State(state): State<AppState>) -> Response {
    let mut events = state.recorder.subscribe();
    let result = state.recorder.toggle_system_audio().await;
    toggle_response(result, &mut events)
}

/// POST /settings/webcam/toggle
pub async fn toggle_webcam(State(state): State<AppState>) -> Response {
    let mut events = state.recorder.subscribe();
    let result = state.recorder.toggle_webcam().await;
    toggle_response(result, &mut events)
}

fn toggle_response(
    result: Result<bool, RecorderError>,
    events: &mut broadcast::Receiver<RecorderEvent>,
) -> Response {
    match result {
        Ok(enabled) => (
            StatusCode::OK,
            Json(ToggleResponse {
                enabled,
                notice: latest_notice(events),
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// PUT /settings/webcam/layout
/// Allowed while recording; applies to subsequent frames
pub async fn update_webcam_layout(
    State(state): State<AppState>,
    Json(req): Json<LayoutRequest>,
) -> Json<OverlayLayout> {
    if let Some(position) = req.position {
        state.recorder.set_position(position).await;
    }
    if let Some(size) = req.size {
        state.recorder.set_size(size).await;
    }
    Json(state.recorder.layout())
}
