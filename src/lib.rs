pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::converter::Converter;
use crate::services::publisher::Publisher;
use crate::services::workspace::Workspace;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::convert::convert_image,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "convert", description = "Image conversion endpoints"),
        (name = "system", description = "Service health and metadata")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<Workspace>,
    pub converter: Arc<Converter>,
    pub publisher: Arc<Publisher>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/convert", post(api::handlers::convert::convert_image))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(DefaultBodyLimit::max(
            state.config.max_upload_size + 10 * 1024 * 1024, // buffer for multipart overhead
        ))
        .with_state(state)
}
