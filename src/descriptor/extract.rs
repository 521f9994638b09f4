use std::path::Path;
use std::time::Instant;

use image::RgbImage;
use log::debug;
use ndarray::ArrayView2;
use opencv::core::{self, Mat, Scalar};
use opencv::imgproc;
use opencv::prelude::*;

use super::*;
use crate::config::ExtractOptions;
use crate::error::{CbirError, Result};
use crate::utils::seed_from_time;

/// 图片宽高的最小值
pub const MIN_SIDE: u32 = 10;

/// 复制为 OpenCV 的 RGB 三通道矩阵
fn to_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let (w, h) = image.dimensions();
    let mut mat = Mat::new_rows_cols_with_default(h as i32, w as i32, core::CV_8UC3, Scalar::all(0.))?;
    mat.data_bytes_mut()?.copy_from_slice(image.as_raw());
    Ok(mat)
}

/// 转换为灰度图，系数与 `COLOR_BGR2GRAY` 相同
pub fn to_gray(image: &RgbImage) -> opencv::Result<Mat> {
    let rgb = to_mat(image)?;
    let mut gray = Mat::default();
    imgproc::cvt_color_def(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY)?;
    Ok(gray)
}

/// 单通道连续矩阵的只读视图
pub fn gray_view(gray: &Mat) -> opencv::Result<ArrayView2<'_, u8>> {
    let shape = (gray.rows() as usize, gray.cols() as usize);
    ArrayView2::from_shape(shape, gray.data_bytes()?)
        .map_err(|e| opencv::Error::new(core::StsUnmatchedSizes, e.to_string()))
}

/// 描述符提取器
pub struct DescriptorExtractor {
    opts: ExtractOptions,
}

impl DescriptorExtractor {
    pub fn create(opts: ExtractOptions) -> Self {
        Self { opts }
    }

    /// 本次提取使用的主色聚类种子，未指定时由当前时间生成
    fn seed(&self) -> u64 {
        self.opts.seed.unwrap_or_else(seed_from_time)
    }

    /// 解码图片
    pub fn decode(bytes: &[u8]) -> Result<RgbImage> {
        let image = image::load_from_memory(bytes).map_err(|_| CbirError::validation("undecodable"))?;
        Ok(image.to_rgb8())
    }

    pub fn extract_file(&self, path: impl AsRef<Path>) -> Result<DescriptorBundle> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            CbirError::validation(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.extract_bytes(&bytes)
    }

    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<DescriptorBundle> {
        let image = Self::decode(bytes)?;
        self.extract_image(&image)
    }

    /// 计算全部 7 种描述符
    pub fn extract_image(&self, image: &RgbImage) -> Result<DescriptorBundle> {
        let (w, h) = image.dimensions();
        if w < MIN_SIDE || h < MIN_SIDE {
            return Err(CbirError::validation("too-small"));
        }

        let start = Instant::now();
        let seed = self.seed();
        let gray = to_gray(image)?;
        let pixels = gray_view(&gray)?;

        // 纯 Rust 实现的模态并行计算，OpenCV 部分在当前线程依次计算
        let ((color, dominant), lbp) = rayon::join(
            || rayon::join(|| color_histogram(image), || dominant_colors(image, seed)),
            || lbp_histogram(pixels),
        );
        let gabor = gabor_features(&gray)?;
        let hu = hu_moments(&gray)?;
        let hog = hog_features(&gray)?;
        let edge = edge_histogram(&gray)?;

        debug!("提取 {}x{} 图片描述符耗时 {:.2}ms", w, h, start.elapsed().as_secs_f32() * 1000.);

        Ok(DescriptorBundle {
            color_histogram: Some(color),
            dominant_colors: Some(dominant),
            gabor_features: Some(gabor),
            hu_moments: Some(hu),
            lbp_histogram: Some(lbp),
            hog_features: Some(hog),
            edge_histogram: Some(edge),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb};

    use super::*;

    fn extractor(seed: u64) -> DescriptorExtractor {
        DescriptorExtractor::create(ExtractOptions { seed: Some(seed) })
    }

    fn noisy_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let v = (x * 31 + y * 17) ^ (x * y);
            Rgb([(v % 256) as u8, ((v / 3) % 256) as u8, ((x + y) * 4 % 256) as u8])
        })
    }

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(vec![]);
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_to_gray() {
        let image = RgbImage::from_pixel(2, 1, Rgb([255, 0, 0]));
        let gray = to_gray(&image).unwrap();
        assert_eq!((gray.rows(), gray.cols(), gray.channels()), (1, 2, 1));
        assert_eq!(gray_view(&gray).unwrap()[[0, 1]], 76);
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 0, 255]));
        assert_eq!(gray_view(&to_gray(&image).unwrap()).unwrap()[[0, 0]], 29);
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        assert_eq!(gray_view(&to_gray(&image).unwrap()).unwrap()[[0, 0]], 255);
    }

    #[test]
    fn test_undecodable() {
        let err = extractor(0).extract_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CbirError::Validation(ref r) if r == "undecodable"));
    }

    #[test]
    fn test_too_small() {
        let bytes = png_bytes(&noisy_image(9, 40));
        let err = extractor(0).extract_bytes(&bytes).unwrap_err();
        assert!(matches!(err, CbirError::Validation(ref r) if r == "too-small"));
    }

    #[test]
    fn test_lengths() {
        let bundle = extractor(1).extract_bytes(&png_bytes(&noisy_image(70, 130))).unwrap();
        assert!(bundle.validate().is_ok());
        for m in Modality::ALL {
            let v = bundle.get(m).unwrap();
            match m.length() {
                Length::Exact(n) => assert_eq!(v.len(), n, "{}", m.name()),
                Length::AtMost(n) => assert!(v.len() <= n && !v.is_empty()),
            }
        }
    }

    #[test]
    fn test_deterministic_except_dominant_colors() {
        let bytes = png_bytes(&noisy_image(40, 30));
        let a = extractor(1).extract_bytes(&bytes).unwrap();
        let b = extractor(2).extract_bytes(&bytes).unwrap();
        for m in Modality::ALL {
            if m != Modality::DominantColors {
                assert_eq!(a.get(m), b.get(m), "{}", m.name());
            }
        }
        let c = extractor(1).extract_bytes(&bytes).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn test_histograms_sum_to_one() {
        let bundle = extractor(3).extract_image(&noisy_image(48, 48)).unwrap();
        for m in [Modality::ColorHistogram, Modality::LbpHistogram, Modality::EdgeHistogram] {
            let sum = bundle.get(m).unwrap().iter().sum::<f32>();
            assert!((sum - 1.0).abs() < 1e-5, "{}: {}", m.name(), sum);
        }
    }
}
