use thiserror::Error;

pub type Result<T, E = CbirError> = std::result::Result<T, E>;

/// 核心错误类型
#[derive(Debug, Error)]
pub enum CbirError {
    /// 请求或输入数据无效，不会修改存储
    #[error("validation failed: {0}")]
    Validation(String),
    /// 引用的图片不存在
    #[error("not found: {0}")]
    NotFound(String),
    /// 存储或反馈记录读写失败，不做自动重试
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// OpenCV 图像处理失败
    #[error("opencv error: {0}")]
    Vision(#[from] opencv::Error),
    /// 后台计算任务异常退出
    #[error("worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("failed to decode descriptors: {0}")]
    Codec(#[from] bincode::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("corrupted column {0}")]
    Corrupted(String),
}

impl CbirError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

impl From<sqlx::Error> for CbirError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.into())
    }
}

impl From<bincode::Error> for CbirError {
    fn from(err: bincode::Error) -> Self {
        Self::Store(err.into())
    }
}

impl From<std::io::Error> for CbirError {
    fn from(err: std::io::Error) -> Self {
        Self::Store(err.into())
    }
}
