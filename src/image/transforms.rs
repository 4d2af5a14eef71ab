use crate::utils::error::ScanError;
use crate::Result;
use ndarray::{Array2, Array3};

/// 图像变换工具集
pub struct ImageTransforms;

impl ImageTransforms {
    /// 双线性插值缩放到目标尺寸（拉伸，不保持宽高比）
    pub fn resize_bilinear(
        image: &Array3<f32>,
        target_width: usize,
        target_height: usize,
    ) -> Result<Array3<f32>> {
        let (orig_h, orig_w, channels) = image.dim();

        if orig_h == 0 || orig_w == 0 {
            return Err(ScanError::InvalidInput("Empty image".to_string()));
        }

        let scale_h = orig_h as f32 / target_height as f32;
        let scale_w = orig_w as f32 / target_width as f32;

        let mut resized = Array3::<f32>::zeros((target_height, target_width, channels));

        // 双线性插值
        for h in 0..target_height {
            for w in 0..target_width {
                let src_h = h as f32 * scale_h;
                let src_w = w as f32 * scale_w;

                let h1 = (src_h.floor() as usize).min(orig_h - 1);
                let h2 = (h1 + 1).min(orig_h - 1);
                let w1 = (src_w.floor() as usize).min(orig_w - 1);
                let w2 = (w1 + 1).min(orig_w - 1);

                let dh = src_h - h1 as f32;
                let dw = src_w - w1 as f32;

                for c in 0..channels {
                    let v11 = image[[h1, w1, c]];
                    let v12 = image[[h1, w2, c]];
                    let v21 = image[[h2, w1, c]];
                    let v22 = image[[h2, w2, c]];

                    let interpolated = v11 * (1.0 - dh) * (1.0 - dw)
                        + v12 * (1.0 - dh) * dw
                        + v21 * dh * (1.0 - dw)
                        + v22 * dh * dw;

                    resized[[h, w, c]] = interpolated;
                }
            }
        }

        Ok(resized)
    }

    /// 最近邻缩放二值掩码，保证输出仍然只含0和1
    pub fn resize_mask_nearest(
        mask: &Array2<u8>,
        target_width: usize,
        target_height: usize,
    ) -> Result<Array2<u8>> {
        let (orig_h, orig_w) = mask.dim();

        if orig_h == 0 || orig_w == 0 {
            return Err(ScanError::InvalidInput("Empty mask".to_string()));
        }

        let scale_h = orig_h as f32 / target_height as f32;
        let scale_w = orig_w as f32 / target_width as f32;

        let mut resized = Array2::<u8>::zeros((target_height, target_width));

        for h in 0..target_height {
            for w in 0..target_width {
                let src_h = ((h as f32 * scale_h) as usize).min(orig_h - 1);
                let src_w = ((w as f32 * scale_w) as usize).min(orig_w - 1);

                resized[[h, w]] = mask[[src_h, src_w]];
            }
        }

        Ok(resized)
    }
}
