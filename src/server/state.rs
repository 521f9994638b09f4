use std::path::PathBuf;
use std::sync::Arc;

use crate::IMDB;

/// 应用状态
pub struct AppState {
    /// 检索引擎
    pub db: IMDB,
    /// 上传图片的保存目录
    pub upload_dir: PathBuf,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(db: IMDB, upload_dir: PathBuf) -> Arc<Self> {
        Arc::new(AppState { db, upload_dir })
    }
}
