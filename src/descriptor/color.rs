use image::RgbImage;

use super::{COLOR_BINS, DOMINANT_K};
use crate::kmeans::kmeans;
use crate::utils::normalize_l1;

/// 三通道联合颜色直方图，按 `b * 64 + g * 8 + r` 展开并归一化为和为 1
pub fn color_histogram(image: &RgbImage) -> Vec<f32> {
    let shift = 8 - COLOR_BINS.trailing_zeros();
    let mut hist = vec![0f32; COLOR_BINS.pow(3)];
    for px in image.pixels() {
        let [r, g, b] = px.0;
        let (r, g, b) = ((r >> shift) as usize, (g >> shift) as usize, (b >> shift) as usize);
        hist[(b * COLOR_BINS + g) * COLOR_BINS + r] += 1.0;
    }
    normalize_l1(&mut hist);
    hist
}

/// 使用 k-means 计算主色，返回按 (B, G, R) 顺序展开的聚类中心
///
/// 结果取决于 `seed`，这是描述符中唯一不确定的部分。
pub fn dominant_colors(image: &RgbImage, seed: u64) -> Vec<f32> {
    let pixels = image
        .pixels()
        .map(|px| {
            let [r, g, b] = px.0;
            [b as f32, g as f32, r as f32]
        })
        .collect::<Vec<_>>();
    let clustering = kmeans(&pixels, DOMINANT_K, seed);
    clustering.centers.into_iter().flatten().collect()
}
