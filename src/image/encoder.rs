use crate::utils::error::ScanError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use ndarray::Array3;
use std::io::Cursor;

/// 图像编码器，把BGR像素数组转回可传输的PNG
pub struct ImageEncoder;

impl ImageEncoder {
    /// BGR数组转换为RgbImage（通道翻转回RGB）
    pub fn to_rgb_image(array: &Array3<f32>) -> Result<RgbImage> {
        let (height, width, channels) = array.dim();
        if channels != 3 {
            return Err(ScanError::ShapeMismatch(format!(
                "Expected 3 channels, got {}",
                channels
            )));
        }

        let mut buffer = Vec::with_capacity(height * width * 3);
        for h in 0..height {
            for w in 0..width {
                // BGR -> RGB
                buffer.push(array[[h, w, 2]].clamp(0.0, 255.0).round() as u8);
                buffer.push(array[[h, w, 1]].clamp(0.0, 255.0).round() as u8);
                buffer.push(array[[h, w, 0]].clamp(0.0, 255.0).round() as u8);
            }
        }

        RgbImage::from_raw(width as u32, height as u32, buffer)
            .ok_or_else(|| ScanError::ImageProcessing("Pixel buffer size mismatch".to_string()))
    }

    /// 编码为PNG字节流
    pub fn to_png_bytes(array: &Array3<f32>) -> Result<Vec<u8>> {
        let rgb = Self::to_rgb_image(array)?;

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(ScanError::ImageDecode)?;

        Ok(cursor.into_inner())
    }

    /// 编码为数据URL形式的base64字符串，可直接放进JSON响应
    pub fn to_base64_png(array: &Array3<f32>) -> Result<String> {
        let png_bytes = Self::to_png_bytes(array)?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&png_bytes);

        Ok(format!("data:image/png;base64,{}", encoded))
    }
}
