use axum::Router;
use tower_http::trace::TraceLayer;

use crate::connections::handlers as connection_handlers;
use crate::state::AppState;

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Clients call these with a trailing slash; accept both spellings.
    let connection_routes = Router::new()
        .route(
            "/connections/new/",
            axum::routing::post(connection_handlers::new_connection),
        )
        .route(
            "/connections/new",
            axum::routing::post(connection_handlers::new_connection),
        )
        .route(
            "/connections/self/",
            axum::routing::get(connection_handlers::get_self),
        )
        .route(
            "/connections/self",
            axum::routing::get(connection_handlers::get_self),
        );

    // Health check
    let health = Router::new().route("/health", axum::routing::get(health_check));

    Router::new()
        .merge(connection_routes)
        .merge(health)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
