use crate::utils::error::ScanError;
use crate::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// 肿瘤四分类标签
///
/// 索引顺序与分类模型的输出通道一致，不能调整。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TumorClass {
    Glioma,
    Meningioma,
    NoTumor,
    Pituitary,
}

impl TumorClass {
    /// 从模型输出索引映射到类别
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(TumorClass::Glioma),
            1 => Ok(TumorClass::Meningioma),
            2 => Ok(TumorClass::NoTumor),
            3 => Ok(TumorClass::Pituitary),
            _ => Err(ScanError::Inference(format!(
                "Class index {} out of range [0, 4)",
                index
            ))),
        }
    }

    /// 展示用标签
    pub fn display_name(&self) -> &'static str {
        match self {
            TumorClass::Glioma => "Glioma",
            TumorClass::Meningioma => "Meningioma",
            TumorClass::NoTumor => "No Tumor",
            TumorClass::Pituitary => "Pituitary",
        }
    }

    /// 是否检出肿瘤，只有NoTumor为否
    pub fn is_tumor(&self) -> bool {
        !matches!(self, TumorClass::NoTumor)
    }

    pub fn all() -> [TumorClass; 4] {
        [
            TumorClass::Glioma,
            TumorClass::Meningioma,
            TumorClass::NoTumor,
            TumorClass::Pituitary,
        ]
    }
}

/// 分类预测结果
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    /// 预测类别
    pub class: TumorClass,
    /// 展示用标签
    pub label: String,
    /// 模型输出索引
    pub class_index: usize,
    /// 获胜类别的激活值
    pub confidence: f32,
    /// 全部类别的激活值
    pub probabilities: Vec<f32>,
}

/// 掩码统计信息
#[derive(Debug, Clone, Serialize)]
pub struct MaskStats {
    /// 掩码中为1的像素数
    pub tumor_pixels: usize,
    /// 总像素数
    pub total_pixels: usize,
    /// 肿瘤像素占比 (0.0 - 1.0)
    pub coverage_ratio: f32,
}

impl MaskStats {
    pub fn from_mask(mask: &Array2<u8>) -> Self {
        let total_pixels = mask.len();
        let tumor_pixels = mask.iter().filter(|v| **v == 1).count();
        let coverage_ratio = if total_pixels > 0 {
            tumor_pixels as f32 / total_pixels as f32
        } else {
            0.0
        };

        Self {
            tumor_pixels,
            total_pixels,
            coverage_ratio,
        }
    }
}

/// 模型信息
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    /// 分类模型输入尺寸
    pub classifier_input: String,
    /// 分割模型输入尺寸
    pub segmenter_input: String,
    /// 支持的类别列表
    pub classes: Vec<String>,
}

/// 完整的扫描处理结果
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// 分类预测
    pub prediction: Prediction,
    /// 是否检出肿瘤
    pub tumor_detected: bool,
    /// 原图 (base64 PNG)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_image: Option<String>,
    /// 叠加掩码后的图像 (base64 PNG)，只在检出肿瘤时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_image: Option<String>,
    /// 掩码统计，只在检出肿瘤时存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_stats: Option<MaskStats>,
    /// 处理耗时（秒）
    pub processing_time: f32,
    /// 模型信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
}

/// 扫描处理选项
#[derive(Debug, Clone, Deserialize)]
pub struct ScanOptions {
    /// 是否在响应中包含编码后的图像
    #[serde(default = "default_include_images")]
    pub include_images: bool,

    /// 是否在响应中包含模型信息
    #[serde(default)]
    pub include_model_info: bool,
}

fn default_include_images() -> bool {
    true
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_images: true,
            include_model_info: false,
        }
    }
}

/// 扫描处理阶段
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanStage {
    Decoding,
    Classification,
    Segmentation,
    Overlay,
    Completed,
    Error,
}

/// 扫描处理状态
#[derive(Debug, Clone)]
pub struct ScanStatus {
    /// 当前处理阶段
    pub stage: ScanStage,
    /// 进度百分比 (0.0 - 1.0)
    pub progress: f32,
    /// 状态消息
    pub message: String,
}

impl ScanStatus {
    pub fn new(stage: ScanStage, progress: f32, message: &str) -> Self {
        Self {
            stage,
            progress,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_index_follows_declaration_order() {
        for (i, class) in TumorClass::all().iter().enumerate() {
            assert_eq!(TumorClass::from_index(i).unwrap(), *class);
        }
    }

    #[test]
    fn out_of_range_index_is_inference_error() {
        assert!(matches!(
            TumorClass::from_index(4),
            Err(ScanError::Inference(_))
        ));
    }

    #[test]
    fn only_no_tumor_is_negative() {
        assert!(TumorClass::Glioma.is_tumor());
        assert!(TumorClass::Meningioma.is_tumor());
        assert!(TumorClass::Pituitary.is_tumor());
        assert!(!TumorClass::NoTumor.is_tumor());
    }

    #[test]
    fn display_names_match_labels() {
        assert_eq!(TumorClass::NoTumor.display_name(), "No Tumor");
        assert_eq!(TumorClass::Pituitary.display_name(), "Pituitary");
    }

    #[test]
    fn mask_stats_count_coverage() {
        let mut mask = Array2::<u8>::zeros((4, 4));
        mask[[0, 0]] = 1;
        mask[[1, 1]] = 1;
        mask[[2, 2]] = 1;
        mask[[3, 3]] = 1;

        let stats = MaskStats::from_mask(&mask);

        assert_eq!(stats.tumor_pixels, 4);
        assert_eq!(stats.total_pixels, 16);
        assert!((stats.coverage_ratio - 0.25).abs() < 1e-6);
    }

    #[test]
    fn scan_options_default_includes_images() {
        let options: ScanOptions = serde_json::from_str("{}").unwrap();
        assert!(options.include_images);
        assert!(!options.include_model_info);
    }
}
