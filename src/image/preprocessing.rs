use crate::image::transforms::ImageTransforms;
use crate::utils::error::ScanError;
use crate::Result;
use ndarray::{Array3, Array4, Axis};

pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// 模型输入预处理流水线
    ///
    /// 缩放到 input_size x input_size，像素归一化到[0,1]，
    /// 再添加batch维度得到 (1, H, W, 3) 张量。通道顺序保持BGR不变。
    pub fn to_model_tensor(image: &Array3<f32>, input_size: usize) -> Result<Array4<f32>> {
        let (_, _, channels) = image.dim();
        if channels != 3 {
            return Err(ScanError::ShapeMismatch(format!(
                "Expected 3 channels, got {}",
                channels
            )));
        }

        let resized = ImageTransforms::resize_bilinear(image, input_size, input_size)?;

        // 归一化到[0,1]
        let normalized = resized.mapv(|v| v / 255.0);

        // (H, W, 3) -> (1, H, W, 3)
        Ok(normalized.insert_axis(Axis(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_has_batch_dim_and_target_size() {
        let image = Array3::<f32>::from_elem((100, 80, 3), 128.0);
        let tensor = ImagePreprocessor::to_model_tensor(&image, 224).unwrap();

        assert_eq!(tensor.dim(), (1, 224, 224, 3));
    }

    #[test]
    fn tensor_values_are_normalized() {
        let image = Array3::<f32>::from_elem((64, 64, 3), 255.0);
        let tensor = ImagePreprocessor::to_model_tensor(&image, 256).unwrap();

        for v in tensor.iter() {
            assert!(*v >= 0.0 && *v <= 1.0);
            assert!((v - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn preprocessing_is_deterministic() {
        let mut image = Array3::<f32>::zeros((50, 70, 3));
        for (i, v) in image.iter_mut().enumerate() {
            *v = (i % 256) as f32;
        }

        let a = ImagePreprocessor::to_model_tensor(&image, 224).unwrap();
        let b = ImagePreprocessor::to_model_tensor(&image, 224).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let image = Array3::<f32>::zeros((32, 32, 1));
        assert!(matches!(
            ImagePreprocessor::to_model_tensor(&image, 224),
            Err(ScanError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn black_png_decodes_to_zero_tensor() {
        use crate::image::loader::ImageLoader;
        use axum::body::Bytes;
        use image::{DynamicImage, ImageFormat, RgbImage};
        use std::io::Cursor;

        // 全黑PNG走完整解码链: 字节 -> BGR数组 -> 分类输入张量
        let img = RgbImage::new(512, 512);
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();

        let decoded = ImageLoader::from_bytes(Bytes::from(buf.into_inner())).unwrap();
        let array = ImageLoader::decode_bgr(decoded).unwrap();

        assert_eq!(array.dim(), (512, 512, 3));
        assert!(array.iter().all(|v| *v == 0.0));

        let tensor = ImagePreprocessor::to_model_tensor(&array, 224).unwrap();

        assert_eq!(tensor.dim(), (1, 224, 224, 3));
        assert!(tensor.iter().all(|v| *v == 0.0));
    }
}
