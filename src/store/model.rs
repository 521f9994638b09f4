use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::descriptor::DescriptorBundle;
use crate::error::CbirError;

/// 图片分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Category {
    Resident,
    Forest,
    Industry,
    Agriculture,
    Park,
    Urban,
    River,
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Resident,
        Category::Forest,
        Category::Industry,
        Category::Agriculture,
        Category::Park,
        Category::Urban,
        Category::River,
        Category::Other,
    ];

    /// 按名称排序的全部分类
    pub fn sorted() -> Vec<Category> {
        let mut all = Self::ALL.to_vec();
        all.sort_by_key(|c| c.as_str());
        all
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Resident => "Resident",
            Category::Forest => "Forest",
            Category::Industry => "Industry",
            Category::Agriculture => "Agriculture",
            Category::Park => "Park",
            Category::Urban => "Urban",
            Category::River => "River",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CbirError;

    /// 不区分大小写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CbirError::validation(format!("unknown category: {s}")))
    }
}

/// 图片记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImageRecord {
    /// 图片 ID
    pub id: String,
    /// 原始文件名
    pub filename: String,
    /// 图片文件路径，重新计算描述符时使用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    /// 文件大小，单位为字节
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// 尚未计算描述符时为空，这样的记录不参与搜索
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptors: Option<DescriptorBundle>,
}

/// 不含描述符的图片信息，用于列表展示
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ImageSummary {
    pub id: String,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// 是否已计算描述符
    pub computed: bool,
}

impl From<&ImageRecord> for ImageSummary {
    fn from(record: &ImageRecord) -> Self {
        Self {
            id: record.id.clone(),
            filename: record.filename.clone(),
            category: record.category,
            size: record.size,
            created_at: record.created_at,
            computed: record.descriptors.is_some(),
        }
    }
}

/// 反馈标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum FeedbackLabel {
    #[serde(rename = "relevant")]
    Relevant,
    #[serde(rename = "non-relevant")]
    NonRelevant,
}

impl FeedbackLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackLabel::Relevant => "relevant",
            FeedbackLabel::NonRelevant => "non-relevant",
        }
    }
}

impl fmt::Display for FeedbackLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackLabel {
    type Err = CbirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevant" => Ok(FeedbackLabel::Relevant),
            "non-relevant" => Ok(FeedbackLabel::NonRelevant),
            _ => Err(CbirError::validation(format!("unknown feedback label: {s}"))),
        }
    }
}

/// 待写入的反馈
#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub image_id: String,
    pub label: FeedbackLabel,
    pub query_descriptors: DescriptorBundle,
    pub timestamp: DateTime<Utc>,
}

/// 反馈记录，写入后不可修改
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    /// 写入顺序
    pub id: i64,
    pub image_id: String,
    pub label: FeedbackLabel,
    /// 提交反馈时的查询描述符快照
    pub query_descriptors: DescriptorBundle,
    pub timestamp: DateTime<Utc>,
}

/// 单张图片的反馈计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackTally {
    pub relevant: u64,
    pub non_relevant: u64,
}

impl FeedbackTally {
    pub fn add(&mut self, label: FeedbackLabel) {
        match label {
            FeedbackLabel::Relevant => self.relevant += 1,
            FeedbackLabel::NonRelevant => self.non_relevant += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_str() {
        assert_eq!("forest".parse::<Category>().unwrap(), Category::Forest);
        assert_eq!(" River ".parse::<Category>().unwrap(), Category::River);
        assert!("Desert".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_sorted() {
        let names = Category::sorted().into_iter().map(|c| c.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["Agriculture", "Forest", "Industry", "Other", "Park", "Resident", "River", "Urban"]
        );
    }

    #[test]
    fn test_feedback_label_wire() {
        let label: FeedbackLabel = serde_json::from_str(r#""non-relevant""#).unwrap();
        assert_eq!(label, FeedbackLabel::NonRelevant);
        assert_eq!(serde_json::to_string(&FeedbackLabel::Relevant).unwrap(), r#""relevant""#);
        assert!("irrelevant".parse::<FeedbackLabel>().is_err());
    }
}
