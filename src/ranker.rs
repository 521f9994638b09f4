//! 基于描述符的相似度排序

use std::cmp::Ordering;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::descriptor::DescriptorBundle;
use crate::store::ImageRecord;
use crate::utils::{cosine_similarity, l2_distance};

/// 默认返回的结果数量
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// 评分方式
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMode {
    /// 各模态欧氏距离之和，越小越相似
    Distance,
    /// 各模态余弦相似度之和，越大越相似
    #[default]
    Cosine,
}

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchHit {
    pub image_id: String,
    pub filename: String,
    pub similarity_score: f32,
}

impl SearchHit {
    pub fn new(record: &ImageRecord, similarity_score: f32) -> Self {
        Self { image_id: record.id.clone(), filename: record.filename.clone(), similarity_score }
    }
}

/// 计算两组描述符的得分，只使用双方都存在且非空的模态
///
/// 没有共同模态时，余弦模式得 0，距离模式得 `f32::MAX`。
pub fn score(query: &DescriptorBundle, target: &DescriptorBundle, mode: ScoreMode) -> f32 {
    let mut shared = 0;
    let mut total = 0f32;
    for (modality, q) in query.iter() {
        let Some(t) = target.get(modality) else {
            continue;
        };
        if q.is_empty() || t.is_empty() {
            continue;
        }
        shared += 1;
        total += match mode {
            ScoreMode::Distance => l2_distance(q, t),
            ScoreMode::Cosine => cosine_similarity(q, t),
        };
    }
    match (shared, mode) {
        (0, ScoreMode::Distance) => f32::MAX,
        (0, ScoreMode::Cosine) => 0.0,
        _ => total,
    }
}

/// 按得分稳定排序，得分相同时保持输入顺序
pub fn sort_hits(hits: &mut [SearchHit], mode: ScoreMode) {
    hits.sort_by(|a, b| {
        let ord = a.similarity_score.partial_cmp(&b.similarity_score).unwrap_or(Ordering::Equal);
        match mode {
            ScoreMode::Distance => ord,
            ScoreMode::Cosine => ord.reverse(),
        }
    });
}

/// 对记录进行线性扫描排序，没有描述符的记录会被跳过
pub fn rank(
    query: &DescriptorBundle,
    records: &[ImageRecord],
    mode: ScoreMode,
    max_results: usize,
) -> Vec<SearchHit> {
    let mut hits = records
        .iter()
        .filter_map(|r| r.descriptors.as_ref().map(|d| SearchHit::new(r, score(query, d, mode))))
        .collect::<Vec<_>>();
    sort_hits(&mut hits, mode);
    hits.truncate(max_results);
    hits
}
