use std::cmp::Reverse;

use kmeans::{EuclideanDistance, KMeans, KMeansConfig};
use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

/// 单次聚类的最大迭代次数
pub const MAX_ITER: usize = 10;
/// 随机重启次数，保留距离和最小的结果
pub const ATTEMPTS: usize = 10;

/// 聚类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering<const D: usize> {
    pub centers: Vec<[f32; D]>,
    /// 所有点到所属中心的距离和
    pub distsum: f32,
}

/// 单次 Lloyd 聚类，初始中心从样本中随机选取
fn lloyd<const D: usize>(samples: &[f32], n: usize, k: usize, seed: u64) -> Clustering<D> {
    let km: KMeans<_, 8, _> = KMeans::new(samples, n, D, EuclideanDistance);
    let conf = KMeansConfig::build().random_generator(StdRng::seed_from_u64(seed)).build();
    let result = km.kmeans_lloyd(k.min(n), MAX_ITER, KMeans::init_random_sample, &conf);

    // 聚类中心按 SIMD 宽度补齐，每个中心只取前 D 个值
    let centroids = result.centroids.to_vec();
    let stride = centroids.len() / k.min(n);
    let mut centers = centroids
        .chunks(stride)
        .map(|c| std::array::from_fn(|j| c[j]))
        .collect::<Vec<[f32; D]>>();

    // 空簇的中心没有意义，用样本最多的簇代替，数量不足 k 时同样补齐
    let frequency = &result.centroid_frequency;
    let largest = (0..centers.len()).max_by_key(|&i| (frequency[i], Reverse(i))).unwrap_or(0);
    let fallback = centers[largest];
    for (i, c) in centers.iter_mut().enumerate() {
        if frequency[i] == 0 || c.iter().any(|v| !v.is_finite()) {
            *c = fallback;
        }
    }
    centers.resize(k, fallback);

    Clustering { centers, distsum: result.distsum }
}

/// 带随机重启的 k-means 聚类
///
/// 第 `i` 次尝试使用种子 `seed + i`，相同输入与种子得到相同结果。
/// 距离和相同时保留较早的尝试。
pub fn kmeans<const D: usize>(points: &[[f32; D]], k: usize, seed: u64) -> Clustering<D> {
    assert!(k > 0, "k must be positive");
    assert!(!points.is_empty(), "points must not be empty");
    let samples = points.iter().flatten().copied().collect::<Vec<_>>();

    let attempts = (0..ATTEMPTS)
        .into_par_iter()
        .map(|i| lloyd(&samples, points.len(), k, seed.wrapping_add(i as u64)))
        .collect::<Vec<_>>();

    let mut best = 0;
    for (i, attempt) in attempts.iter().enumerate() {
        if attempt.distsum < attempts[best].distsum {
            best = i;
        }
    }
    debug!("kmeans 第 {} 次尝试最优，距离和 {:.2}", best + 1, attempts[best].distsum);
    attempts.into_iter().nth(best).expect("at least one attempt")
}
