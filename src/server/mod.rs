mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::ingest_handler,
        api::search_handler,
        api::feedback_search_handler,
        api::feedback_handler,
        api::list_handler,
        api::get_image_handler,
        api::compute_handler,
        api::delete_image_handler,
        api::delete_images_handler,
        api::categories_handler,
    ),
    components(schemas(
        types::IngestForm,
        types::ImagesResponse,
        types::IngestResponse,
        types::IngestFailure,
        types::DeleteRequest,
        types::DeleteResponse,
        types::CategoriesResponse,
        types::SearchResponse,
        types::FeedbackResponse,
        types::ErrorResponse,
    ))
)]
pub struct ApiDoc;

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ingest", post(api::ingest_handler))
        .route("/search", post(api::search_handler))
        .route("/feedback-search", post(api::feedback_search_handler))
        .route("/feedback", post(api::feedback_handler))
        .route("/images", get(api::list_handler))
        .route("/images/delete", post(api::delete_images_handler))
        .route("/images/{id}", get(api::get_image_handler).delete(api::delete_image_handler))
        .route("/images/{id}/compute", post(api::compute_handler))
        .route("/categories", get(api::categories_handler))
        .route("/api-docs/openapi.json", get(openapi_handler))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}
