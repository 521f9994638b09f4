//! 相关反馈重排序
//!
//! 每次搜索都根据最近的反馈记录重新计算统计量，不保留任何长期模型。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;

use crate::descriptor::{DescriptorBundle, Modality};
use crate::ranker::{ScoreMode, SearchHit, sort_hits};
use crate::store::{FeedbackLabel, FeedbackRecord, FeedbackTally, ImageRecord};
use crate::utils::{dot, normalize_l2};

/// 参与反馈计算的模态
pub const TRACKED_FEATURES: [Modality; 3] =
    [Modality::ColorHistogram, Modality::HogFeatures, Modality::GaborFeatures];
/// 计算统计量时使用的反馈记录数量
pub const DEFAULT_HISTORY: usize = 50;

const SIMILARITY_WEIGHT: f32 = 0.6;
const FEEDBACK_WEIGHT: f32 = 1.4;
const RECENCY_SCALE: f32 = 10.0;

/// 单个类别（相关或不相关）的统计量
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStats {
    pub prior: f32,
    /// 按 `TRACKED_FEATURES` 顺序保存的加权均值，已单位化
    pub means: [Vec<f32>; 3],
}

impl ClassStats {
    pub fn mean(&self, modality: Modality) -> Option<&[f32]> {
        TRACKED_FEATURES.iter().position(|&m| m == modality).map(|i| self.means[i].as_slice())
    }

    fn derive(records: &[&FeedbackRecord], prior: f32, now: DateTime<Utc>) -> Self {
        let means = TRACKED_FEATURES.map(|modality| {
            let samples = records
                .iter()
                .filter_map(|r| {
                    let v = r.query_descriptors.get(modality).filter(|v| !v.is_empty())?;
                    Some((recency_weight(r.timestamp, now), v))
                })
                .collect::<Vec<_>>();
            weighted_mean(modality, &samples)
        });
        Self { prior, means }
    }
}

/// 反馈统计量
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackStats {
    pub relevant: ClassStats,
    pub non_relevant: ClassStats,
}

/// 时间衰减权重 `10 / (1 + age)`，age 以秒计，未来的时间戳按 0 处理
pub fn recency_weight(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age = ((now - timestamp).num_milliseconds() as f32 / 1000.0).max(0.0);
    RECENCY_SCALE / (1.0 + age)
}

/// 加权均值，较短的向量末尾补 0；没有样本时返回该模态名义长度的零向量
fn weighted_mean(modality: Modality, samples: &[(f32, &[f32])]) -> Vec<f32> {
    let len = samples.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
    let total_weight = samples.iter().map(|(w, _)| w).sum::<f32>();
    if len == 0 || total_weight <= 0.0 {
        return vec![0.0; modality.length().nominal()];
    }
    let mut mean = vec![0f32; len];
    for (w, v) in samples {
        for (m, x) in mean.iter_mut().zip(v.iter()) {
            *m += w * x;
        }
    }
    mean.iter_mut().for_each(|m| *m /= total_weight);
    normalize_l2(&mean)
}

impl FeedbackStats {
    /// 根据反馈记录计算统计量，调用方负责限制记录数量
    pub fn derive(history: &[FeedbackRecord], now: DateTime<Utc>) -> Self {
        let (relevant, non_relevant): (Vec<_>, Vec<_>) =
            history.iter().partition(|r| r.label == FeedbackLabel::Relevant);

        let total = history.len();
        let (p_rel, p_non) = if total == 0 {
            (0.5, 0.5)
        } else {
            (relevant.len() as f32 / total as f32, non_relevant.len() as f32 / total as f32)
        };
        debug!(
            "反馈统计：相关 {} 条，不相关 {} 条，先验 {:.3}/{:.3}",
            relevant.len(),
            non_relevant.len(),
            p_rel,
            p_non
        );

        Self {
            relevant: ClassStats::derive(&relevant, p_rel, now),
            non_relevant: ClassStats::derive(&non_relevant, p_non, now),
        }
    }
}

/// 全局流行度加成，使用全部反馈计数
pub fn boost(tally: Option<&FeedbackTally>) -> f32 {
    match tally {
        Some(t) if t.relevant > 0 => (1.0 + 0.1 * t.relevant as f32).min(1.5),
        Some(t) if t.non_relevant > 0 => (1.0 - 0.1 * t.non_relevant as f32).max(0.5),
        _ => 1.0,
    }
}

/// 单条记录的反馈得分
///
/// 每个模态的得分为 `0.6 * sim + 1.4 * (P(rel) * dot(rel) - P(non) * dot(non))`，
/// 其中的后验概率没有除以证据项。记录与查询向量均使用原始值，只有类别均值是单位化的。
fn feedback_score(query: &[Option<&[f32]>; 3], target: &DescriptorBundle, stats: &FeedbackStats) -> f32 {
    let mut total = 0.0;
    for (i, &modality) in TRACKED_FEATURES.iter().enumerate() {
        let Some(v) = target.get(modality).filter(|v| !v.is_empty()) else {
            continue;
        };
        let similarity = query[i].map_or(0.0, |q| dot(v, q));
        let evidence = dot(v, &stats.relevant.means[i]) * stats.relevant.prior
            - dot(v, &stats.non_relevant.means[i]) * stats.non_relevant.prior;
        total += SIMILARITY_WEIGHT * similarity + FEEDBACK_WEIGHT * evidence;
    }
    total
}

/// 结合反馈统计量重新排序
pub fn rerank(
    query: &DescriptorBundle,
    records: &[ImageRecord],
    stats: &FeedbackStats,
    tally: &HashMap<String, FeedbackTally>,
    max_results: usize,
) -> Vec<SearchHit> {
    let query = TRACKED_FEATURES.map(|m| query.get(m).filter(|v| !v.is_empty()));

    let mut hits = records
        .iter()
        .filter_map(|record| {
            let descriptors = record.descriptors.as_ref()?;
            let score = feedback_score(&query, descriptors, stats) * boost(tally.get(&record.id));
            Some(SearchHit::new(record, score))
        })
        .collect::<Vec<_>>();
    sort_hits(&mut hits, ScoreMode::Cosine);
    hits.truncate(max_results);
    hits
}
