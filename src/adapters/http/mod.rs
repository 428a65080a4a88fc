pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod ws;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::adapters::http::state::HttpState;
use crate::adapters::http::ws::ws_handler;

pub fn router(state: HttpState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .route("/api/session", get(routes::get_session))
        .route("/api/login", post(routes::login))
        .route("/api/logout", post(routes::logout))
        .route("/api/preferences", put(routes::set_preferences))
        .route("/api/home", get(routes::home))
        .route("/api/detection/config", get(routes::detection_config))
        .route("/api/detection/mode", put(routes::set_mode))
        .route(
            "/api/detection/image",
            get(routes::image_view).post(routes::upload_image).layer(upload_limit),
        )
        .route("/api/detection/image/detect", post(routes::detect_image))
        .route("/api/detection/stream", post(routes::start_stream).delete(routes::stop_stream))
        .route("/api/history", get(routes::history))
        .route("/ws/stream", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
