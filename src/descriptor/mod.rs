//! 图片描述符：多模态特征向量及其提取

mod color;
mod edge;
mod extract;
mod shape;
mod texture;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub use self::color::{color_histogram, dominant_colors};
pub use self::edge::edge_histogram;
pub use self::extract::{DescriptorExtractor, gray_view, to_gray};
pub use self::shape::{hog_features, hu_moments};
pub use self::texture::{gabor_features, lbp_histogram};
use crate::error::{CbirError, Result};

/// 按函数生成单通道灰度矩阵
#[cfg(test)]
pub(crate) fn gray_from_fn(
    rows: i32,
    cols: i32,
    f: impl Fn(usize, usize) -> u8,
) -> opencv::Result<opencv::core::Mat> {
    use opencv::core::{CV_8U, Mat, Scalar};
    use opencv::prelude::*;

    let mut mat = Mat::new_rows_cols_with_default(rows, cols, CV_8U, Scalar::all(0.))?;
    let data = mat.data_bytes_mut()?;
    for r in 0..rows as usize {
        for c in 0..cols as usize {
            data[r * cols as usize + c] = f(r, c);
        }
    }
    Ok(mat)
}

/// 颜色直方图每个通道的 bin 数量
pub const COLOR_BINS: usize = 8;
/// 主色数量
pub const DOMINANT_K: usize = 3;
/// Gabor 滤波器方向数量
pub const GABOR_ORIENTATIONS: usize = 4;
/// LBP 直方图 bin 数量
pub const LBP_BINS: usize = 26;
/// HOG 降采样步长
pub const HOG_STRIDE: usize = 10;
/// HOG 特征最大长度
pub const HOG_MAX_LEN: usize = 1000;
/// 边缘方向直方图 bin 数量
pub const EDGE_BINS: usize = 18;

/// 特征模态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    ColorHistogram,
    DominantColors,
    GaborFeatures,
    HuMoments,
    LbpHistogram,
    HogFeatures,
    EdgeHistogram,
}

/// 模态向量长度约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Exact(usize),
    AtMost(usize),
}

impl Length {
    pub fn accepts(&self, len: usize) -> bool {
        match *self {
            Length::Exact(n) => len == n,
            Length::AtMost(n) => len <= n,
        }
    }

    /// 该模态的名义长度
    pub fn nominal(&self) -> usize {
        match *self {
            Length::Exact(n) | Length::AtMost(n) => n,
        }
    }
}

impl Modality {
    pub const ALL: [Modality; 7] = [
        Modality::ColorHistogram,
        Modality::DominantColors,
        Modality::GaborFeatures,
        Modality::HuMoments,
        Modality::LbpHistogram,
        Modality::HogFeatures,
        Modality::EdgeHistogram,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Modality::ColorHistogram => "color_histogram",
            Modality::DominantColors => "dominant_colors",
            Modality::GaborFeatures => "gabor_features",
            Modality::HuMoments => "hu_moments",
            Modality::LbpHistogram => "lbp_histogram",
            Modality::HogFeatures => "hog_features",
            Modality::EdgeHistogram => "edge_histogram",
        }
    }

    pub fn length(&self) -> Length {
        match self {
            Modality::ColorHistogram => Length::Exact(COLOR_BINS.pow(3)),
            Modality::DominantColors => Length::Exact(3 * DOMINANT_K),
            Modality::GaborFeatures => Length::Exact(GABOR_ORIENTATIONS),
            Modality::HuMoments => Length::Exact(7),
            Modality::LbpHistogram => Length::Exact(LBP_BINS),
            Modality::HogFeatures => Length::AtMost(HOG_MAX_LEN),
            Modality::EdgeHistogram => Length::Exact(EDGE_BINS),
        }
    }
}

impl std::str::FromStr for Modality {
    type Err = CbirError;

    fn from_str(s: &str) -> Result<Self> {
        Modality::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .or(match s {
                "lbp" => Some(Modality::LbpHistogram),
                "hog" => Some(Modality::HogFeatures),
                _ => None,
            })
            .ok_or_else(|| CbirError::validation(format!("unknown modality: {s}")))
    }
}

/// 描述符集合，每个模态都可以缺省
///
/// 查询时只需提供部分模态，比较时只使用双方都存在的模态。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DescriptorBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_histogram: Option<Vec<f32>>,
    /// 主色中心，按 (B, G, R) 顺序展开
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_colors: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gabor_features: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hu_moments: Option<Vec<f32>>,
    #[serde(default, alias = "lbp", skip_serializing_if = "Option::is_none")]
    pub lbp_histogram: Option<Vec<f32>>,
    /// 图片小于检测窗口时为空
    #[serde(default, alias = "hog", skip_serializing_if = "Option::is_none")]
    pub hog_features: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_histogram: Option<Vec<f32>>,
}

impl DescriptorBundle {
    pub fn get(&self, modality: Modality) -> Option<&[f32]> {
        let v = match modality {
            Modality::ColorHistogram => &self.color_histogram,
            Modality::DominantColors => &self.dominant_colors,
            Modality::GaborFeatures => &self.gabor_features,
            Modality::HuMoments => &self.hu_moments,
            Modality::LbpHistogram => &self.lbp_histogram,
            Modality::HogFeatures => &self.hog_features,
            Modality::EdgeHistogram => &self.edge_histogram,
        };
        v.as_deref()
    }

    pub fn set(&mut self, modality: Modality, value: Option<Vec<f32>>) {
        let slot = match modality {
            Modality::ColorHistogram => &mut self.color_histogram,
            Modality::DominantColors => &mut self.dominant_colors,
            Modality::GaborFeatures => &mut self.gabor_features,
            Modality::HuMoments => &mut self.hu_moments,
            Modality::LbpHistogram => &mut self.lbp_histogram,
            Modality::HogFeatures => &mut self.hog_features,
            Modality::EdgeHistogram => &mut self.edge_histogram,
        };
        *slot = value;
    }

    /// 返回一个只保留指定模态的副本
    pub fn select(&self, modalities: &[Modality]) -> Self {
        let mut out = Self::default();
        for &m in modalities {
            out.set(m, self.get(m).map(<[f32]>::to_vec));
        }
        out
    }

    /// 遍历存在的模态
    pub fn iter(&self) -> impl Iterator<Item = (Modality, &[f32])> + '_ {
        Modality::ALL.into_iter().filter_map(|m| self.get(m).map(|v| (m, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// 校验每个模态的长度与数值
    pub fn validate(&self) -> Result<()> {
        for (modality, values) in self.iter() {
            let length = modality.length();
            if !length.accepts(values.len()) {
                let expected = match length {
                    Length::Exact(n) => format!("{n}"),
                    Length::AtMost(n) => format!("at most {n}"),
                };
                return Err(CbirError::validation(format!(
                    "{} has length {}, expected {}",
                    modality.name(),
                    values.len(),
                    expected
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(CbirError::validation(format!(
                    "{} contains non-finite values",
                    modality.name()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_bundle() -> DescriptorBundle {
        let mut bundle = DescriptorBundle::default();
        for m in Modality::ALL {
            bundle.set(m, Some(vec![0.5; m.length().nominal()]));
        }
        bundle
    }

    #[test]
    fn test_validate_lengths() {
        let bundle = full_bundle();
        assert!(bundle.validate().is_ok());

        let mut short = bundle.clone();
        short.gabor_features = Some(vec![1.0; 3]);
        let err = short.validate().unwrap_err();
        assert!(err.to_string().contains("gabor_features"));

        let mut hog = bundle.clone();
        hog.hog_features = Some(vec![]);
        assert!(hog.validate().is_ok());
        hog.hog_features = Some(vec![0.0; HOG_MAX_LEN + 1]);
        assert!(hog.validate().is_err());
    }

    #[test]
    fn test_validate_non_finite() {
        let mut bundle = full_bundle();
        bundle.hu_moments = Some(vec![0.0, 0.0, 0.0, f32::NAN, 0.0, 0.0, 0.0]);
        assert!(matches!(bundle.validate(), Err(CbirError::Validation(_))));
    }

    #[test]
    fn test_wire_aliases() {
        let json = r#"{"lbp": [0.0], "hog": [1.0, 2.0], "gabor_features": [1, 2, 3, 4]}"#;
        let bundle: DescriptorBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.lbp_histogram.as_deref(), Some(&[0.0][..]));
        assert_eq!(bundle.hog_features.as_deref(), Some(&[1.0, 2.0][..]));
        assert!(bundle.color_histogram.is_none());

        let out = serde_json::to_value(&bundle).unwrap();
        assert!(out.get("lbp_histogram").is_some());
        assert!(out.get("color_histogram").is_none());
    }

    #[test]
    fn test_select() {
        let bundle = full_bundle();
        let partial = bundle.select(&[Modality::HuMoments, Modality::EdgeHistogram]);
        let present = partial.iter().map(|(m, _)| m).collect::<Vec<_>>();
        assert_eq!(present, vec![Modality::HuMoments, Modality::EdgeHistogram]);
    }

    #[test]
    fn test_modality_from_str() {
        assert_eq!("hog".parse::<Modality>().unwrap(), Modality::HogFeatures);
        assert_eq!("color_histogram".parse::<Modality>().unwrap(), Modality::ColorHistogram);
        assert!("sift".parse::<Modality>().is_err());
    }
}
