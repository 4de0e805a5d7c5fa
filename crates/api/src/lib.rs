//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - The fiscal closure endpoints and run history
//! - JWT authentication middleware
//! - The `{ success, data, errors }` error envelope

pub mod error;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use closure_core::closure::ClosureOrchestrator;
use closure_shared::JwtService;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Closure engine wired to its collaborators.
    pub orchestrator: Arc<ClosureOrchestrator>,
    /// JWT service for token validation.
    pub jwt_service: Arc<JwtService>,
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
