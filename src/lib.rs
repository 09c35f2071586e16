pub mod catalog;
pub mod cli;
pub mod config;
pub mod control;
pub mod device;
pub mod error;
pub mod handlers;
pub mod normalizer;
pub mod producer;
pub mod registry;
pub mod scheduler;
pub mod state;
pub mod switch;
pub mod types;
pub mod websocket;

pub use catalog::DatasetCatalog;
pub use config::{ConfigError, ServerConfig};
pub use device::{CalmReading, Credentials, DeviceFeed, RelayDevice};
pub use error::{
    DatasetError, DeviceError, SchedulerError, SwitchError, SwitchResult, TransportError,
};
pub use registry::{Broadcaster, SessionHandle};
pub use scheduler::ReplayScheduler;
pub use state::AppState;
pub use switch::SourceSwitch;
pub use types::*;
pub use websocket::handle_websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Build the HTTP and WebSocket router.
///
/// When `public_dir` exists its files are served for any unmatched path.
pub fn build_router(state: Arc<AppState>, public_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/ws", get(handle_websocket))
        .route("/health", get(handlers::health_check))
        .route("/api/status", get(handlers::pipeline_status))
        .route("/api/datasets", get(handlers::list_datasets))
        .route("/api/select-dataset", post(handlers::select_dataset))
        .route("/api/select-live", post(handlers::select_live));

    if let Some(dir) = public_dir.filter(|dir| dir.is_dir()) {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
