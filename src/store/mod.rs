//! 描述符存储与反馈记录

mod memory;
mod model;
mod sqlite;

use std::collections::HashMap;
use std::future::Future;

pub use self::memory::MemoryStore;
pub use self::model::*;
pub use self::sqlite::{SqliteStore, init_db};
use crate::descriptor::{DescriptorBundle, Modality};
use crate::error::{Result, StoreError};

/// 图片记录存储
pub trait DescriptorStore: Send + Sync {
    fn get(&self, id: &str) -> impl Future<Output = Result<Option<ImageRecord>>> + Send;

    /// 写入完整记录，ID 已存在时整体覆盖，但不改变其扫描顺序
    fn put(&self, record: ImageRecord) -> impl Future<Output = Result<()>> + Send;

    /// 删除记录，返回记录是否存在；反馈记录不受影响
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// 按写入顺序返回全部记录
    fn scan(&self) -> impl Future<Output = Result<Vec<ImageRecord>>> + Send;

    /// 按写入顺序列出记录，可按分类过滤
    fn list(
        &self,
        category: Option<Category>,
    ) -> impl Future<Output = Result<Vec<ImageRecord>>> + Send {
        async move {
            let mut records = self.scan().await?;
            if let Some(category) = category {
                records.retain(|r| r.category == Some(category));
            }
            Ok(records)
        }
    }
}

/// 只追加的反馈记录
pub trait FeedbackLedger: Send + Sync {
    fn append(&self, feedback: NewFeedback) -> impl Future<Output = Result<FeedbackRecord>> + Send;

    /// 最近的 `limit` 条反馈，按时间从新到旧排列
    fn recent(&self, limit: usize) -> impl Future<Output = Result<Vec<FeedbackRecord>>> + Send;

    /// 每张图片的全部反馈计数
    fn tally(&self) -> impl Future<Output = Result<HashMap<String, FeedbackTally>>> + Send;
}

/// 将描述符编码为 bincode
///
/// bincode 不是自描述格式，这里按固定的模态顺序写入 7 个可选向量。
pub(crate) fn encode_bundle(bundle: &DescriptorBundle) -> Result<Vec<u8>, StoreError> {
    let slots = Modality::ALL.map(|m| bundle.get(m));
    Ok(bincode::serialize(&slots)?)
}

pub(crate) fn decode_bundle(bytes: &[u8]) -> Result<DescriptorBundle, StoreError> {
    let slots: [Option<Vec<f32>>; 7] = bincode::deserialize(bytes)?;
    let mut bundle = DescriptorBundle::default();
    for (m, v) in Modality::ALL.into_iter().zip(slots) {
        bundle.set(m, v);
    }
    Ok(bundle)
}
