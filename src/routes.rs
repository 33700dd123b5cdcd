// routes.rs
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::handlers;
use crate::poll::PollStore;
use crate::ws;
use crate::AppState;

pub fn create_routes<S: PollStore>(state: AppState<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/polls", post(handlers::create_poll::<S>))
        .route("/api/polls/{id}", get(handlers::get_poll::<S>))
        .route("/api/polls/{id}/vote", post(handlers::vote::<S>))
        .route("/ws", get(ws::ws_handler::<S>))
        .layer(cors)
        .with_state(state)
}
