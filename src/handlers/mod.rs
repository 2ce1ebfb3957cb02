mod health;
mod metrics;
mod proxy;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use proxy::proxy_handler;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::state::AppState;

// /health and /metrics are served locally, everything else goes through the gateway
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .with_state(state)
}
