use opencv::core::{self, Mat};
use opencv::imgproc;
use opencv::prelude::*;

use super::EDGE_BINS;
use crate::utils::normalize_l1;

const CANNY_LOW: f64 = 100.0;
const CANNY_HIGH: f64 = 200.0;

/// Canny 边缘掩码，3x3 Sobel，梯度幅值使用 L1 范数
fn canny(gray: &Mat) -> opencv::Result<Mat> {
    let mut edges = Mat::default();
    imgproc::canny(gray, &mut edges, CANNY_LOW, CANNY_HIGH, 3, false)?;
    Ok(edges)
}

/// 3x3 Sobel 梯度，边界按复制处理
fn sobel(gray: &Mat, dx: i32, dy: i32) -> opencv::Result<Mat> {
    let mut grad = Mat::default();
    imgproc::sobel(gray, &mut grad, core::CV_32F, dx, dy, 3, 1.0, 0.0, core::BORDER_REPLICATE)?;
    Ok(grad)
}

/// 边缘方向直方图：18 个 bin 覆盖 [0°, 180°)，归一化为和为 1
///
/// 没有检测到边缘时保持全 0。
pub fn edge_histogram(gray: &Mat) -> opencv::Result<Vec<f32>> {
    let edges = canny(gray)?;
    let (gx, gy) = (sobel(gray, 1, 0)?, sobel(gray, 0, 1)?);

    let bin_width = 180.0 / EDGE_BINS as f32;
    let mut hist = vec![0f32; EDGE_BINS];
    let pixels = edges.data_bytes()?.iter().zip(gx.data_typed::<f32>()?).zip(gy.data_typed::<f32>()?);
    for ((&edge, &x), &y) in pixels {
        if edge == 0 {
            continue;
        }
        let angle = y.atan2(x).to_degrees().rem_euclid(180.0);
        let bin = ((angle / bin_width) as usize).min(EDGE_BINS - 1);
        hist[bin] += 1.0;
    }
    normalize_l1(&mut hist);
    Ok(hist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::gray_from_fn;

    #[test]
    fn test_no_edges() {
        let gray = gray_from_fn(20, 20, |_, _| 128).unwrap();
        assert_eq!(edge_histogram(&gray).unwrap(), vec![0.0; EDGE_BINS]);
    }

    #[test]
    fn test_vertical_edge() {
        let gray = gray_from_fn(20, 20, |_, c| if c < 10 { 0 } else { 255 }).unwrap();
        let edges = canny(&gray).unwrap();
        assert!(core::count_non_zero(&edges).unwrap() >= 20);

        let hist = edge_histogram(&gray).unwrap();
        // 水平方向的梯度，角度为 0
        assert!((hist[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_horizontal_edge() {
        let gray = gray_from_fn(20, 20, |r, _| if r < 10 { 0 } else { 255 }).unwrap();
        let hist = edge_histogram(&gray).unwrap();
        assert!((hist[9] - 1.0).abs() < 1e-6);
        assert!((hist.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_weak_edge_without_strong_seed() {
        // 幅值 4 * 30 = 120，介于双阈值之间，且没有强边缘连接
        let gray = gray_from_fn(20, 20, |_, c| if c < 10 { 100 } else { 130 }).unwrap();
        assert_eq!(core::count_non_zero(&canny(&gray).unwrap()).unwrap(), 0);
        assert_eq!(edge_histogram(&gray).unwrap(), vec![0.0; EDGE_BINS]);
    }
}
