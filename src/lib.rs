pub mod audit;
pub mod ban;
pub mod config;
pub mod error;
pub mod forward;
pub mod greeting;
pub mod handlers;
pub mod metrics;
pub mod notify;
pub mod rate_limit;
pub mod router;
pub mod state;
pub mod store;
pub mod worker;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::handlers::{health_handler, metrics_handler, proxy_handler};
use crate::state::AppState;

// creating the router with routes, everything else goes through the proxy
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .with_state(state)
}
