//! HTTP layer: health endpoint, WebSocket route, OpenAPI document.

pub mod handlers;

use axum::Router;
use axum::routing::get;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI document for the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "notify-gateway"),
    paths(handlers::system::health_handler),
    components(schemas(
        handlers::system::HealthResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody
    ))
)]
pub struct ApiDoc;

/// Builds the complete router: `/health`, `/ws` and, with the
/// `swagger-ui` feature, the interactive docs at `/swagger-ui`.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .merge(handlers::system::routes())
        .route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
