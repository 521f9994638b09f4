use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_typed_multipart::TypedMultipartError;
use log::error;
use serde_json::json;

use crate::error::CbirError;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> (StatusCode, String) {
        if let Some(err) = self.0.downcast_ref::<CbirError>() {
            return match err {
                CbirError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
                CbirError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
                other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
            };
        }
        let malformed = self.0.is::<JsonRejection>()
            || self.0.is::<QueryRejection>()
            || self.0.is::<PathRejection>()
            || self.0.is::<TypedMultipartError>();
        if malformed {
            (StatusCode::BAD_REQUEST, self.0.to_string())
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {:?}", self.0);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
