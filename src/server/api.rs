use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum_typed_multipart::{TypedMultipart, TypedMultipartError};
use log::{info, warn};

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::error::CbirError;
use crate::imdb::{FeedbackRequest, IngestRequest, SearchRequest};
use crate::store::{Category, ImageRecord, ImageSummary};
use crate::utils::content_id;

fn parse_category(category: Option<&str>) -> Result<Option<Category>> {
    Ok(category.filter(|s| !s.trim().is_empty()).map(str::parse).transpose()?)
}

/// 上传图片并计算描述符
#[utoipa::path(
    post,
    path = "/ingest",
    request_body(content = IngestForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = IngestResponse),
        (status = 400, body = ErrorResponse),
    )
)]
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    data: std::result::Result<TypedMultipart<IngestRequestForm>, TypedMultipartError>,
) -> Result<Json<IngestResponse>> {
    let data = data?;
    if data.file.is_empty() {
        return Err(CbirError::validation("missing file").into());
    }
    let category = parse_category(data.category.as_deref())?;

    tokio::fs::create_dir_all(&state.upload_dir).await?;

    // 每个文件单独处理，一个文件失败不影响其余文件
    let mut images = vec![];
    let mut failed = vec![];
    let mut first_error = None;
    for file in &data.file {
        let filename = file.metadata.file_name.clone().unwrap_or_default();
        match ingest_file(&state, filename.clone(), &file.contents, category).await {
            Ok(record) => images.push(ImageSummary::from(&record)),
            Err(e) => {
                warn!("添加上传图片失败 {}: {}", filename, e);
                failed.push(IngestFailure { filename, error: e.to_string() });
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if images.is_empty() => Err(e.into()),
        _ => Ok(Json(IngestResponse { images, failed })),
    }
}

/// 保存上传文件并入库，失败时删除已写入的文件
async fn ingest_file(
    state: &AppState,
    filename: String,
    contents: &[u8],
    category: Option<Category>,
) -> std::result::Result<ImageRecord, CbirError> {
    if filename.is_empty() {
        return Err(CbirError::validation("missing filename"));
    }
    let id = content_id(contents);
    let ext = FsPath::new(&filename)
        .extension()
        .map(|s| s.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let path = state.upload_dir.join(format!("{id}.{ext}"));
    let req = IngestRequest { filename, id: Some(id), path: Some(path.to_string_lossy().into_owned()), category };
    req.validate()?;

    info!("正在添加上传图片: {}", req.filename);
    tokio::fs::write(&path, contents).await?;
    let result = state.db.ingest(contents.to_vec(), req).await;
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("删除上传文件失败 {}: {}", path.display(), e);
        }
    }
    result
}

/// 删除上传目录中属于该记录的文件，其他位置的文件不做处理
async fn remove_upload(state: &AppState, record: &ImageRecord) {
    let Some(path) = record.path.as_deref().map(FsPath::new) else {
        return;
    };
    if !path.starts_with(&state.upload_dir) {
        return;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!("删除上传文件: {}", path.display()),
        Err(e) => warn!("删除上传文件失败 {}: {}", path.display(), e),
    }
}

/// 使用描述符搜索相似图片
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, body = ErrorResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    req: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>> {
    let Json(req) = req?;
    let start = Instant::now();
    let result = state.db.search(req).await?;
    Ok(Json(SearchResponse { time: start.elapsed().as_millis() as u64, result }))
}

/// 结合相关反馈搜索相似图片
#[utoipa::path(
    post,
    path = "/feedback-search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
        (status = 400, body = ErrorResponse),
    )
)]
pub async fn feedback_search_handler(
    State(state): State<Arc<AppState>>,
    req: std::result::Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>> {
    let Json(req) = req?;
    let start = Instant::now();
    let result = state.db.search_with_feedback(req).await?;
    Ok(Json(SearchResponse { time: start.elapsed().as_millis() as u64, result }))
}

/// 提交相关反馈
#[utoipa::path(
    post,
    path = "/feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 200, body = FeedbackResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    req: std::result::Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>> {
    let Json(req) = req?;
    let record = state.db.submit_feedback(req).await?;
    Ok(Json(FeedbackResponse { status: "ok".to_string(), id: record.id, timestamp: record.timestamp }))
}

/// 列出图片
#[utoipa::path(
    get,
    path = "/images",
    params(("category" = Option<String>, Query, description = "图片分类")),
    responses(
        (status = 200, body = ImagesResponse),
        (status = 400, body = ErrorResponse),
    )
)]
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ImagesResponse>> {
    let Query(query) = query?;
    let category = parse_category(query.category.as_deref())?;
    let images = state.db.list(category).await?.iter().map(ImageSummary::from).collect();
    Ok(Json(ImagesResponse { images }))
}

/// 获取图片记录
#[utoipa::path(
    get,
    path = "/images/{id}",
    params(("id" = String, Path, description = "图片 ID")),
    responses(
        (status = 200, body = ImageRecord),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn get_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ImageRecord>> {
    Ok(Json(state.db.get(&id).await?))
}

/// 重新计算图片描述符
#[utoipa::path(
    post,
    path = "/images/{id}/compute",
    params(("id" = String, Path, description = "图片 ID")),
    responses(
        (status = 200, body = ImageRecord),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn compute_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ImageRecord>> {
    Ok(Json(state.db.compute(&id).await?))
}

/// 删除图片记录
#[utoipa::path(
    delete,
    path = "/images/{id}",
    params(("id" = String, Path, description = "图片 ID")),
    responses(
        (status = 200, body = DeleteResponse),
        (status = 404, body = ErrorResponse),
    )
)]
pub async fn delete_image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let record = state.db.delete(&id).await?;
    remove_upload(&state, &record).await;
    Ok(Json(DeleteResponse { deleted: vec![record.id], missing: vec![] }))
}

/// 批量删除图片记录
#[utoipa::path(
    post,
    path = "/images/delete",
    request_body = DeleteRequest,
    responses(
        (status = 200, body = DeleteResponse),
        (status = 400, body = ErrorResponse),
    )
)]
pub async fn delete_images_handler(
    State(state): State<Arc<AppState>>,
    req: std::result::Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>> {
    let Json(req) = req?;
    let summary = state.db.delete_many(&req.ids).await?;
    let mut deleted = vec![];
    for record in &summary.deleted {
        remove_upload(&state, record).await;
        deleted.push(record.id.clone());
    }
    Ok(Json(DeleteResponse { deleted, missing: summary.missing }))
}

/// 列出全部分类
#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, body = CategoriesResponse))
)]
pub async fn categories_handler() -> Json<CategoriesResponse> {
    Json(CategoriesResponse { categories: Category::sorted() })
}
