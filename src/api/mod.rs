pub mod error;
pub mod response;
pub mod v1;

use axum::{http::StatusCode, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{config::Config, controller::AppState};

pub fn router(state: AppState, cfg: &Config) -> Router {
    Router::new().nest("/api/v1", v1::router(state)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
            .layer(request_timeout(Duration::from_secs(
                cfg.server.request_timeout_secs,
            ))),
    )
}

/// Requests still running after `limit` get 408
fn request_timeout(limit: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, limit)
}
