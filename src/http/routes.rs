use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording lifecycle
        .route("/recording/status", get(handlers::get_status))
        .route("/recording/start", post(handlers::start_recording))
        .route("/recording/pause", post(handlers::pause_recording))
        .route("/recording/resume", post(handlers::resume_recording))
        .route("/recording/stop", post(handlers::stop_recording))
        .route("/recording/reset", post(handlers::reset_recording))
        // Finalized artifact
        .route("/recording/artifact", get(handlers::get_artifact))
        .route("/recording/download", post(handlers::download_recording))
        .route("/recording/upload", post(handlers::upload_recording))
        // Devices
        .route("/devices/audio-inputs", get(handlers::list_audio_inputs))
        .route(
            "/devices/audio-inputs/refresh",
            post(handlers::refresh_audio_inputs),
        )
        // Composition settings
        .route(
            "/settings/microphone/device",
            put(handlers::select_microphone_device),
        )
        .route(
            "/settings/microphone/toggle",
            post(handlers::toggle_microphone),
        )
        .route(
            "/settings/system-audio/toggle",
            post(handlers::toggle_system_audio),
        )
        .route("/settings/webcam/toggle", post(handlers::toggle_webcam))
        .route("/settings/webcam/layout", put(handlers::update_webcam_layout))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
