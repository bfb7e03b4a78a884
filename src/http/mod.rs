//! HTTP control surface for the recorder UI
//!
//! - GET /health - Health check
//! - GET /recording/status - Lifecycle state, timer, settings, artifact summary
//! - POST /recording/{start,pause,resume,stop,reset} - Lifecycle control
//! - GET /recording/artifact - Finalized recording bytes
//! - POST /recording/download - Save the recording to the downloads directory
//! - POST /recording/upload - Upload the recording and return its share link
//! - GET /devices/audio-inputs, POST /devices/audio-inputs/refresh - Microphones
//! - PUT/POST /settings/... - Composition settings

mod handlers;
mod routes;
mod state;

pub use handlers::ErrorResponse;
pub use routes::create_router;
pub use state::AppState;
