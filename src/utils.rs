use std::time::{SystemTime, UNIX_EPOCH};

use indicatif::ProgressStyle;

/// 归一化时使用的最小模长
pub const NORM_EPS: f32 = 1e-10;

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// 按 L2 范数归一化，模长小于 `NORM_EPS` 时按 `NORM_EPS` 计算
pub fn normalize_l2(v: &[f32]) -> Vec<f32> {
    let norm = l2_norm(v).max(NORM_EPS);
    v.iter().map(|x| x / norm).collect()
}

/// 按 L1 范数原地归一化，分母为 0 时保持不变并返回 false
pub fn normalize_l1(v: &mut [f32]) -> bool {
    let sum = v.iter().map(|x| x.abs()).sum::<f32>();
    if sum <= 0.0 {
        return false;
    }
    v.iter_mut().for_each(|x| *x /= sum);
    true
}

/// 点积，长度不同时只计算公共前缀
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// 欧氏距离，长度不同时只计算公共前缀
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

/// 余弦相似度
///
/// 两个全零向量视为相同，相似度为 1；只有一方为零向量时为 0。
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (na, nb) = (l2_norm(a), l2_norm(b));
    if na < NORM_EPS && nb < NORM_EPS {
        return 1.0;
    }
    dot(a, b) / (na.max(NORM_EPS) * nb.max(NORM_EPS))
}

/// 根据当前时间生成随机种子
pub fn seed_from_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// 计算图片内容的 ID：blake3 哈希的前 16 位十六进制
pub fn content_id(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex()[..16].to_string()
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}
