use axum::{routing::get, Router};

use super::handlers;
use super::server::AppState;

/// Create API router with all endpoints
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Query surface
        .route("/messages", get(handlers::list_messages))
        .route("/coordenadas/:id", get(handlers::get_coordinates))
        .route("/localizadores", get(handlers::list_locators))
        .route("/status", get(handlers::status))
        // Command surface
        .route(
            "/destino/:id",
            get(handlers::get_destination).post(handlers::set_destination),
        )
}
