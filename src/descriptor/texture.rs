use std::f64::consts::PI;

use ndarray::ArrayView2;
use opencv::core::{self, Mat, Size};
use opencv::imgproc;

use super::{GABOR_ORIENTATIONS, LBP_BINS};
use crate::utils::normalize_l1;

const GABOR_KSIZE: i32 = 21;
const GABOR_SIGMA: f64 = 8.0;
const GABOR_LAMBDA: f64 = 10.0;
const GABOR_GAMMA: f64 = 0.5;
const GABOR_PSI: f64 = 0.0;

const LBP_POINTS: usize = 8;
const LBP_RADIUS: f64 = 1.0;

fn gabor_kernel(theta: f64) -> opencv::Result<Mat> {
    imgproc::get_gabor_kernel(
        Size::new(GABOR_KSIZE, GABOR_KSIZE),
        GABOR_SIGMA,
        theta,
        GABOR_LAMBDA,
        GABOR_GAMMA,
        GABOR_PSI,
        core::CV_32F,
    )
}

/// 4 个方向（0, π/4, π/2, 3π/4）的 Gabor 纹理特征
///
/// 每个方向的响应先截断到 u8 范围再取均值。
pub fn gabor_features(gray: &Mat) -> opencv::Result<Vec<f32>> {
    (0..GABOR_ORIENTATIONS)
        .map(|i| {
            let kernel = gabor_kernel(i as f64 * PI / GABOR_ORIENTATIONS as f64)?;
            let mut response = Mat::default();
            imgproc::filter_2d_def(gray, &mut response, core::CV_8U, &kernel)?;
            Ok(core::mean_def(&response)?[0] as f32)
        })
        .collect()
}

/// 双线性插值，图像外的像素按 0 处理
fn bilinear(gray: &ArrayView2<u8>, r: f64, c: f64) -> f64 {
    let (h, w) = gray.dim();
    let get = |r: f64, c: f64| -> f64 {
        if r < 0.0 || c < 0.0 || r >= h as f64 || c >= w as f64 {
            0.0
        } else {
            gray[[r as usize, c as usize]] as f64
        }
    };
    let (minr, maxr) = (r.floor(), r.ceil());
    let (minc, maxc) = (c.floor(), c.ceil());
    let (dr, dc) = (r - minr, c - minc);
    let lerp = |a: f64, b: f64, t: f64| a + t * (b - a);
    let top = lerp(get(minr, minc), get(minr, maxc), dc);
    let bottom = lerp(get(maxr, minc), get(maxr, maxc), dc);
    lerp(top, bottom, dr)
}

/// 统一模式 LBP 直方图（P = 8, R = 1），26 个 bin，归一化为和为 1
///
/// 相邻采样点之间跳变不超过 2 次的模式编码为置位数量，其余编码为 P + 1。
pub fn lbp_histogram(gray: ArrayView2<u8>) -> Vec<f32> {
    let round5 = |v: f64| (v * 1e5).round() / 1e5;
    let offsets = (0..LBP_POINTS)
        .map(|i| {
            let angle = 2.0 * PI * i as f64 / LBP_POINTS as f64;
            (round5(-LBP_RADIUS * angle.sin()), round5(LBP_RADIUS * angle.cos()))
        })
        .collect::<Vec<_>>();

    let mut hist = vec![0f32; LBP_BINS];
    for ((r, c), &center) in gray.indexed_iter() {
        let center = center as f64;
        let mut bits = [false; LBP_POINTS];
        for (bit, (dr, dc)) in bits.iter_mut().zip(&offsets) {
            *bit = bilinear(&gray, r as f64 + dr, c as f64 + dc) - center >= 0.0;
        }
        let changes = bits.windows(2).filter(|p| p[0] != p[1]).count();
        let code = if changes <= 2 {
            bits.iter().filter(|&&b| b).count()
        } else {
            LBP_POINTS + 1
        };
        hist[code] += 1.0;
    }
    normalize_l1(&mut hist);
    hist
}
