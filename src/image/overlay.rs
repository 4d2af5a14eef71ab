use crate::image::transforms::ImageTransforms;
use crate::utils::error::ScanError;
use crate::Result;
use ndarray::{Array2, Array3};

/// 掩码叠加的混合权重
const OVERLAY_ALPHA: f32 = 0.4;

/// 肿瘤区域的标注颜色 (BGR: 红色)
const OVERLAY_COLOR: [f32; 3] = [0.0, 0.0, 255.0];

/// 掩码叠加渲染器
pub struct OverlayRenderer;

impl OverlayRenderer {
    /// 将二值掩码以红色半透明叠加到原图上
    ///
    /// 混合公式: out = img * 1.0 + color * 0.4，只作用于掩码为1的像素，
    /// 结果截断到[0, 255]。掩码尺寸与原图不一致时先做最近邻缩放。
    pub fn apply_mask(image: &Array3<f32>, mask: &Array2<u8>) -> Result<Array3<f32>> {
        let (height, width, channels) = image.dim();

        if channels != 3 {
            return Err(ScanError::ShapeMismatch(format!(
                "Expected 3 channels, got {}",
                channels
            )));
        }

        // 掩码对齐到原图尺寸
        let mask = if mask.dim() != (height, width) {
            ImageTransforms::resize_mask_nearest(mask, width, height)?
        } else {
            mask.clone()
        };

        let mut blended = image.clone();

        for h in 0..height {
            for w in 0..width {
                if mask[[h, w]] == 1 {
                    for c in 0..channels {
                        let v = image[[h, w, c]] + OVERLAY_COLOR[c] * OVERLAY_ALPHA;
                        blended[[h, w, c]] = v.clamp(0.0, 255.0);
                    }
                }
            }
        }

        Ok(blended)
    }
}
