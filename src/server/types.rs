use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ranker::SearchHit;
use crate::store::{Category, ImageSummary};

/// 上传图片请求参数
#[derive(TryFromMultipart)]
pub struct IngestRequestForm {
    pub file: Vec<FieldData<Bytes>>,
    pub category: Option<String>,
}

/// 上传表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct IngestForm {
    /// 上传的图片文件，可以是多张图片，仅支持 png、jpg、jpeg、gif
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 图片分类
    pub category: Option<String>,
}

/// 图片列表
#[derive(Debug, Serialize, ToSchema)]
pub struct ImagesResponse {
    pub images: Vec<ImageSummary>,
}

/// 上传结果，失败的文件不影响其余文件
#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub images: Vec<ImageSummary>,
    pub failed: Vec<IngestFailure>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestFailure {
    pub filename: String,
    pub error: String,
}

/// 批量删除请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

/// 删除结果
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteResponse {
    pub deleted: Vec<String>,
    /// 不存在的图片 ID
    pub missing: Vec<String>,
}

/// 分类列表，按名称排序
#[derive(Debug, Serialize, ToSchema)]
pub struct CategoriesResponse {
    pub categories: Vec<Category>,
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u64,
    pub result: Vec<SearchHit>,
}

/// 反馈响应
#[derive(Debug, Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub status: String,
    /// 反馈记录 ID
    pub id: i64,
    pub timestamp: DateTime<Utc>,
}

/// 列表查询参数
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
}

/// 错误响应
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct ErrorResponse {
    pub error: String,
}
