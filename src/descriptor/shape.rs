use opencv::core::{Mat, Point, Size, Vector};
use opencv::imgproc;
use opencv::objdetect::HOGDescriptor;
use opencv::prelude::*;

use super::{HOG_MAX_LEN, HOG_STRIDE};

/// 灰度图的 7 个 Hu 不变矩，保留原始数值（不做对数缩放）
///
/// 像素灰度值作为质量参与计算，`m00 == 0` 时全部为 0。
pub fn hu_moments(gray: &Mat) -> opencv::Result<Vec<f32>> {
    let moments = imgproc::moments_def(gray)?;
    let mut hu = [0f64; 7];
    imgproc::hu_moments(moments, &mut hu)?;
    Ok(hu.into_iter().map(|h| h as f32).collect())
}

/// 默认参数的 HOG：64x128 窗口，16x16 block，8x8 cell，9 个方向
fn hog_descriptor() -> opencv::Result<HOGDescriptor> {
    HOGDescriptor::default()
}

/// 按行优先顺序列出前 `limit` 个窗口的左上角坐标
fn window_locations(image: Size, win: Size, stride: Size, limit: usize) -> Vector<Point> {
    let windows_x = (image.width - win.width) / stride.width + 1;
    let windows_y = (image.height - win.height) / stride.height + 1;
    (0..windows_y)
        .flat_map(|wy| (0..windows_x).map(move |wx| Point::new(wx * stride.width, wy * stride.height)))
        .take(limit)
        .collect()
}

/// HOG 特征：以 8 像素步长滑动窗口，原始系数每 10 个取 1 个，再截断到 1000 个
///
/// 只计算填满结果所需的窗口，与对完整向量降采样再截断的结果一致。
/// 图片小于一个窗口时返回空向量。
pub fn hog_features(gray: &Mat) -> opencv::Result<Vec<f32>> {
    let hog = hog_descriptor()?;
    let (size, win, stride) = (gray.size()?, hog.win_size(), hog.block_stride());
    if size.width < win.width || size.height < win.height {
        return Ok(vec![]);
    }

    let per_window = hog.get_descriptor_size()?;
    let needed = (HOG_MAX_LEN * HOG_STRIDE).div_ceil(per_window);
    let locations = window_locations(size, win, stride, needed);

    let mut raw = Vector::<f32>::new();
    hog.compute(gray, &mut raw, stride, Size::new(0, 0), &locations)?;

    // 先降采样，再截断
    Ok(raw.iter().step_by(HOG_STRIDE).take(HOG_MAX_LEN).collect())
}
