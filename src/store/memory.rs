use std::collections::HashMap;
use std::sync::RwLock;

use super::*;

/// 内存存储，供嵌入使用和测试
#[derive(Default)]
pub struct MemoryStore {
    images: RwLock<Vec<ImageRecord>>,
    feedback: RwLock<Vec<FeedbackRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DescriptorStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<ImageRecord>> {
        let images = self.images.read().map_err(|_| StoreError::Poisoned)?;
        Ok(images.iter().find(|r| r.id == id).cloned())
    }

    async fn put(&self, record: ImageRecord) -> Result<()> {
        let mut images = self.images.write().map_err(|_| StoreError::Poisoned)?;
        match images.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => images.push(record),
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut images = self.images.write().map_err(|_| StoreError::Poisoned)?;
        let before = images.len();
        images.retain(|r| r.id != id);
        Ok(images.len() < before)
    }

    async fn scan(&self) -> Result<Vec<ImageRecord>> {
        let images = self.images.read().map_err(|_| StoreError::Poisoned)?;
        Ok(images.clone())
    }
}

impl FeedbackLedger for MemoryStore {
    async fn append(&self, feedback: NewFeedback) -> Result<FeedbackRecord> {
        let mut ledger = self.feedback.write().map_err(|_| StoreError::Poisoned)?;
        let record = FeedbackRecord {
            id: ledger.len() as i64 + 1,
            image_id: feedback.image_id,
            label: feedback.label,
            query_descriptors: feedback.query_descriptors,
            timestamp: feedback.timestamp,
        };
        ledger.push(record.clone());
        Ok(record)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let ledger = self.feedback.read().map_err(|_| StoreError::Poisoned)?;
        let mut records = ledger.clone();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    async fn tally(&self) -> Result<HashMap<String, FeedbackTally>> {
        let ledger = self.feedback.read().map_err(|_| StoreError::Poisoned)?;
        let mut tally = HashMap::<String, FeedbackTally>::new();
        for record in ledger.iter() {
            tally.entry(record.image_id.clone()).or_default().add(record.label);
        }
        Ok(tally)
    }
}
