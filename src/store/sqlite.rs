use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};

use super::*;

/// 打开数据库并执行迁移
pub async fn init_db(filename: impl AsRef<Path>) -> Result<SqlitePool, StoreError> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    if let Some(parent) = filename.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// 解析数据库中保存的枚举值，无法识别时视为数据损坏
fn parse_column<T: std::str::FromStr>(column: &str, value: &str) -> Result<T, StoreError> {
    value.parse().map_err(|_| StoreError::Corrupted(format!("{column}: {value}")))
}

struct ImageRow {
    id: String,
    filename: String,
    path: Option<String>,
    category: Option<String>,
    size: i64,
    created_at: i64,
    descriptors: Option<Vec<u8>>,
}

impl ImageRow {
    fn into_record(self) -> Result<ImageRecord> {
        Ok(ImageRecord {
            id: self.id,
            filename: self.filename,
            path: self.path,
            category: self.category.as_deref().map(|c| parse_column("category", c)).transpose()?,
            size: self.size.max(0) as u64,
            created_at: from_millis(self.created_at),
            descriptors: self.descriptors.as_deref().map(decode_bundle).transpose()?,
        })
    }
}

struct FeedbackRow {
    id: i64,
    image_id: String,
    label: String,
    query_descriptors: Vec<u8>,
    timestamp: i64,
}

impl FeedbackRow {
    fn into_record(self) -> Result<FeedbackRecord> {
        Ok(FeedbackRecord {
            id: self.id,
            image_id: self.image_id,
            label: parse_column("label", &self.label)?,
            query_descriptors: decode_bundle(&self.query_descriptors)?,
            timestamp: from_millis(self.timestamp),
        })
    }
}

/// 基于 SQLite 的存储
///
/// 时间戳以毫秒整数保存。
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let pool = init_db(filename).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 图片记录数量
    pub async fn count(&self) -> Result<u64> {
        let result = sqlx::query!(
            r#"
            SELECT COUNT(*) as count FROM image
            "#
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(result.count as u64)
    }
}

impl DescriptorStore for SqliteStore {
    async fn get(&self, id: &str) -> Result<Option<ImageRecord>> {
        let row = sqlx::query_as!(
            ImageRow,
            r#"
            SELECT id as "id!", filename as "filename!", path, category,
                   size as "size!", created_at as "created_at!", descriptors
            FROM image WHERE id = ?
            "#,
            id
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(ImageRow::into_record).transpose()
    }

    async fn put(&self, record: ImageRecord) -> Result<()> {
        let descriptors = record.descriptors.as_ref().map(encode_bundle).transpose()?;
        let category = record.category.map(|c| c.as_str());
        let size = record.size as i64;
        let created_at = record.created_at.timestamp_millis();
        sqlx::query!(
            r#"
            INSERT INTO image (id, filename, path, category, size, created_at, descriptors)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                filename = excluded.filename,
                path = excluded.path,
                category = excluded.category,
                size = excluded.size,
                created_at = excluded.created_at,
                descriptors = excluded.descriptors
            "#,
            record.id,
            record.filename,
            record.path,
            category,
            size,
            created_at,
            descriptors
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query!(
            r#"
            DELETE FROM image WHERE id = ?
            "#,
            id
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn scan(&self) -> Result<Vec<ImageRecord>> {
        let rows = sqlx::query_as!(
            ImageRow,
            r#"
            SELECT id as "id!", filename as "filename!", path, category,
                   size as "size!", created_at as "created_at!", descriptors
            FROM image ORDER BY seq ASC
            "#
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ImageRow::into_record).collect()
    }

    async fn list(&self, category: Option<Category>) -> Result<Vec<ImageRecord>> {
        let Some(category) = category else {
            return self.scan().await;
        };
        let category = category.as_str();
        let rows = sqlx::query_as!(
            ImageRow,
            r#"
            SELECT id as "id!", filename as "filename!", path, category,
                   size as "size!", created_at as "created_at!", descriptors
            FROM image WHERE category = ? ORDER BY seq ASC
            "#,
            category
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ImageRow::into_record).collect()
    }
}

impl FeedbackLedger for SqliteStore {
    async fn append(&self, feedback: NewFeedback) -> Result<FeedbackRecord> {
        let blob = encode_bundle(&feedback.query_descriptors)?;
        let label = feedback.label.as_str();
        let timestamp = feedback.timestamp.timestamp_millis();
        let result = sqlx::query!(
            r#"
            INSERT INTO feedback (image_id, label, query_descriptors, timestamp)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
            feedback.image_id,
            label,
            blob,
            timestamp
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(FeedbackRecord {
            id: result.id,
            image_id: feedback.image_id,
            label: feedback.label,
            query_descriptors: feedback.query_descriptors,
            timestamp: from_millis(timestamp),
        })
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>> {
        let limit = limit as i64;
        let rows = sqlx::query_as!(
            FeedbackRow,
            r#"
            SELECT id as "id!", image_id as "image_id!", label as "label!",
                   query_descriptors as "query_descriptors!", timestamp as "timestamp!"
            FROM feedback
            ORDER BY timestamp DESC, id DESC LIMIT ?
            "#,
            limit
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FeedbackRow::into_record).collect()
    }

    async fn tally(&self) -> Result<HashMap<String, FeedbackTally>> {
        let rows = sqlx::query!(
            r#"
            SELECT image_id as "image_id!", label as "label!", COUNT(*) as "count!: i64"
            FROM feedback GROUP BY image_id, label
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tally = HashMap::<String, FeedbackTally>::new();
        for row in rows {
            let entry = tally.entry(row.image_id).or_default();
            match parse_column::<FeedbackLabel>("label", &row.label)? {
                FeedbackLabel::Relevant => entry.relevant += row.count as u64,
                FeedbackLabel::NonRelevant => entry.non_relevant += row.count as u64,
            }
        }
        Ok(tally)
    }
}
