use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use tokio::task::spawn_blocking;
use utoipa::ToSchema;

use crate::config::{ConfDir, ExtractOptions};
use crate::descriptor::{DescriptorBundle, DescriptorExtractor};
use crate::error::{CbirError, Result};
use crate::feedback::{DEFAULT_HISTORY, FeedbackStats, rerank};
use crate::metrics;
use crate::ranker::{DEFAULT_MAX_RESULTS, ScoreMode, SearchHit, rank};
use crate::store::*;
use crate::utils::content_id;

/// 允许添加的图片后缀
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

/// 搜索请求
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 查询描述符，至少包含一个模态
    pub query_descriptors: Option<DescriptorBundle>,
    /// 返回的结果数量，默认为 10
    pub max_results: Option<usize>,
    /// 评分方式，反馈搜索时忽略
    #[serde(default)]
    pub mode: ScoreMode,
    /// 只搜索指定分类的图片
    pub category: Option<Category>,
}

/// 反馈请求
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct FeedbackRequest {
    pub image_id: Option<String>,
    pub feedback: Option<FeedbackLabel>,
    /// 产生这次搜索结果的查询描述符
    pub query_descriptors: Option<DescriptorBundle>,
}

/// 添加图片时的元数据
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub filename: String,
    /// 不填则使用图片内容的哈希
    pub id: Option<String>,
    /// 图片文件路径，用于之后重新计算描述符
    pub path: Option<String>,
    pub category: Option<Category>,
}

impl IngestRequest {
    pub fn from_path(path: impl AsRef<Path>, category: Option<Category>) -> Self {
        let path = path.as_ref();
        Self {
            filename: path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
            id: None,
            path: Some(path.to_string_lossy().into_owned()),
            category,
        }
    }

    /// 校验文件名与后缀
    pub fn validate(&self) -> Result<()> {
        let filename = self.filename.trim();
        if filename.is_empty() {
            return Err(CbirError::validation("missing filename"));
        }
        let allowed = Path::new(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));
        if !allowed {
            return Err(CbirError::validation(format!("unsupported file type: {filename}")));
        }
        if self.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(CbirError::validation("empty image id"));
        }
        Ok(())
    }

    fn into_record(self, id: String, size: usize, descriptors: Option<DescriptorBundle>) -> ImageRecord {
        ImageRecord {
            id,
            filename: self.filename,
            path: self.path,
            category: self.category,
            size: size as u64,
            created_at: Utc::now(),
            descriptors,
        }
    }
}

impl SearchRequest {
    pub fn new(query: DescriptorBundle) -> Self {
        Self { query_descriptors: Some(query), ..Default::default() }
    }

    /// 校验请求，返回查询描述符与结果数量
    fn validate(&self) -> Result<(DescriptorBundle, usize)> {
        let query = self
            .query_descriptors
            .as_ref()
            .ok_or_else(|| CbirError::validation("missing query_descriptors"))?;
        if query.is_empty() {
            return Err(CbirError::validation("query_descriptors is empty"));
        }
        query.validate()?;
        let max_results = self.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
        if max_results == 0 {
            return Err(CbirError::validation("max_results must be positive"));
        }
        Ok((query.clone(), max_results))
    }
}

impl FeedbackRequest {
    fn validate(self) -> Result<(String, FeedbackLabel, DescriptorBundle)> {
        let image_id = self
            .image_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| CbirError::validation("missing image_id"))?;
        let label = self.feedback.ok_or_else(|| CbirError::validation("missing feedback"))?;
        let query = self
            .query_descriptors
            .ok_or_else(|| CbirError::validation("missing query_descriptors"))?;
        query.validate()?;
        Ok((image_id, label, query))
    }
}

/// 批量删除的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteSummary {
    pub deleted: Vec<ImageRecord>,
    pub missing: Vec<String>,
}

pub struct IMDBBuilder {
    conf_dir: ConfDir,
    extract: ExtractOptions,
    feedback_history: usize,
}

impl IMDBBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir, extract: ExtractOptions::default(), feedback_history: DEFAULT_HISTORY }
    }

    /// 描述符提取参数
    pub fn extract(mut self, extract: ExtractOptions) -> Self {
        self.extract = extract;
        self
    }

    /// 反馈搜索时使用的最近反馈数量
    pub fn feedback_history(mut self, n: usize) -> Self {
        self.feedback_history = n;
        self
    }

    /// 使用指定的存储构建
    pub fn build<S>(self, store: S) -> IMDB<S> {
        IMDB { store, extract: self.extract, feedback_history: self.feedback_history }
    }

    /// 打开配置目录下的 SQLite 数据库
    pub async fn open(self) -> Result<IMDB<SqliteStore>> {
        let store = SqliteStore::open(self.conf_dir.database()).await?;
        Ok(self.build(store))
    }
}

/// 图片检索引擎
pub struct IMDB<S = SqliteStore> {
    store: S,
    extract: ExtractOptions,
    feedback_history: usize,
}

impl<S> IMDB<S> {
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn extractor(&self) -> DescriptorExtractor {
        DescriptorExtractor::create(self.extract.clone())
    }

    /// 在阻塞线程中提取描述符
    async fn extract_bytes(&self, bytes: Vec<u8>) -> Result<DescriptorBundle> {
        let extractor = self.extractor();
        let start = Instant::now();
        let descriptors = spawn_blocking(move || extractor.extract_bytes(&bytes)).await??;
        metrics::observe_extract_duration(start.elapsed().as_secs_f32());
        Ok(descriptors)
    }
}

impl<S: DescriptorStore + FeedbackLedger> IMDB<S> {
    /// 提取描述符并保存图片记录，失败时不会写入
    pub async fn ingest(&self, bytes: Vec<u8>, req: IngestRequest) -> Result<ImageRecord> {
        req.validate()?;
        let id = req.id.clone().unwrap_or_else(|| content_id(&bytes));
        let size = bytes.len();
        let descriptors = self.extract_bytes(bytes).await?;

        let record = req.into_record(id, size, Some(descriptors));
        self.store.put(record.clone()).await?;
        metrics::inc_ingest("extracted");
        info!("添加图片: {} ({})", record.filename, record.id);
        Ok(record)
    }

    /// 只保存图片记录，描述符留待之后用 [`IMDB::compute`] 计算
    pub async fn register(&self, bytes: &[u8], req: IngestRequest) -> Result<ImageRecord> {
        req.validate()?;
        let id = req.id.clone().unwrap_or_else(|| content_id(bytes));
        let record = req.into_record(id, bytes.len(), None);
        self.store.put(record.clone()).await?;
        metrics::inc_ingest("registered");
        info!("登记图片: {} ({})", record.filename, record.id);
        Ok(record)
    }

    /// 根据保存的路径重新计算描述符
    pub async fn compute(&self, id: &str) -> Result<ImageRecord> {
        let mut record =
            self.store.get(id).await?.ok_or_else(|| CbirError::not_found(format!("image {id}")))?;
        let path = record
            .path
            .clone()
            .ok_or_else(|| CbirError::validation(format!("image {id} has no stored path")))?;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| CbirError::validation(format!("cannot read {path}: {e}")))?;
        record.size = bytes.len() as u64;
        record.descriptors = Some(self.extract_bytes(bytes).await?);
        self.store.put(record.clone()).await?;
        info!("重新计算描述符: {} ({})", record.filename, record.id);
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<ImageRecord> {
        self.store.get(id).await?.ok_or_else(|| CbirError::not_found(format!("image {id}")))
    }

    pub async fn list(&self, category: Option<Category>) -> Result<Vec<ImageRecord>> {
        self.store.list(category).await
    }

    /// 删除图片记录并返回被删除的记录，该图片的反馈记录保留
    pub async fn delete(&self, id: &str) -> Result<ImageRecord> {
        let record = self.get(id).await?;
        self.store.delete(id).await?;
        metrics::inc_delete();
        info!("删除图片: {} ({})", record.filename, record.id);
        Ok(record)
    }

    /// 批量删除，不存在的 ID 记录在结果中而不是报错
    pub async fn delete_many(&self, ids: &[String]) -> Result<DeleteSummary> {
        if ids.is_empty() {
            return Err(CbirError::validation("missing ids"));
        }
        let mut summary = DeleteSummary::default();
        for id in ids {
            match self.store.get(id).await? {
                Some(record) if self.store.delete(id).await? => {
                    metrics::inc_delete();
                    summary.deleted.push(record);
                }
                _ => summary.missing.push(id.clone()),
            }
        }
        info!("批量删除图片: 删除 {} 张，不存在 {} 张", summary.deleted.len(), summary.missing.len());
        Ok(summary)
    }

    /// 相似度搜索
    pub async fn search(&self, req: SearchRequest) -> Result<Vec<SearchHit>> {
        let (query, max_results) = req.validate()?;
        let start = Instant::now();

        let records = self.store.list(req.category).await?;
        let candidates = records.len();
        let mode = req.mode;
        let hits = spawn_blocking(move || rank(&query, &records, mode, max_results)).await?;

        let elapsed = start.elapsed().as_secs_f32();
        let mode = match mode {
            ScoreMode::Cosine => "cosine",
            ScoreMode::Distance => "distance",
        };
        debug!("搜索 {} 条记录，模式 {}，耗时 {:.2}ms", candidates, mode, elapsed * 1000.);
        metrics::inc_search(mode, candidates, elapsed);
        Ok(hits)
    }

    /// 结合相关反馈的搜索
    pub async fn search_with_feedback(&self, req: SearchRequest) -> Result<Vec<SearchHit>> {
        let (query, max_results) = req.validate()?;
        let start = Instant::now();

        let records = self.store.list(req.category).await?;
        let history = self.store.recent(self.feedback_history).await?;
        let tally = self.store.tally().await?;
        let candidates = records.len();
        let now = Utc::now();

        let hits = spawn_blocking(move || {
            let stats = FeedbackStats::derive(&history, now);
            rerank(&query, &records, &stats, &tally, max_results)
        })
        .await?;

        let elapsed = start.elapsed().as_secs_f32();
        debug!("反馈搜索 {} 条记录，耗时 {:.2}ms", candidates, elapsed * 1000.);
        metrics::inc_search("feedback", candidates, elapsed);
        Ok(hits)
    }

    /// 记录一条反馈，时间戳由服务端生成
    pub async fn submit_feedback(&self, req: FeedbackRequest) -> Result<FeedbackRecord> {
        let (image_id, label, query_descriptors) = req.validate()?;
        if self.store.get(&image_id).await?.is_none() {
            return Err(CbirError::not_found(format!("image {image_id}")));
        }

        let record = self
            .store
            .append(NewFeedback { image_id, label, query_descriptors, timestamp: Utc::now() })
            .await?;
        metrics::inc_feedback(label.as_str());
        info!("收到反馈: {} -> {}", record.image_id, label);
        Ok(record)
    }
}
