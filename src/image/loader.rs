use crate::utils::error::ScanError;
use crate::Result;
use axum::body::Bytes;
use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat};
use ndarray::Array3;

/// 最大允许的图像文件大小（50MB）
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串加载图像
    pub fn from_base64(base64_data: &str) -> Result<DynamicImage> {
        // 检测并移除可能的数据URL前缀 (data:image/xxx;base64,)
        let base64_clean = if base64_data.starts_with("data:") {
            base64_data.split(',').nth(1).unwrap_or(base64_data)
        } else {
            base64_data
        };

        // 解码base64
        let image_bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_clean)
            .map_err(ScanError::Base64)?;

        // 检查文件大小
        if image_bytes.len() > MAX_IMAGE_BYTES {
            return Err(ScanError::FileTooLarge(image_bytes.len(), MAX_IMAGE_BYTES));
        }

        Self::check_format(&image_bytes)?;

        // 解码图像
        let image = image::load_from_memory(&image_bytes).map_err(ScanError::ImageDecode)?;

        Ok(image)
    }

    /// 从字节流加载图像
    pub fn from_bytes(bytes: Bytes) -> Result<DynamicImage> {
        // 检查文件大小
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ScanError::FileTooLarge(bytes.len(), MAX_IMAGE_BYTES));
        }

        Self::check_format(&bytes)?;

        let image = image::load_from_memory(&bytes).map_err(ScanError::ImageDecode)?;

        Ok(image)
    }

    /// 从文件路径加载图像，与字节流入口共用格式和大小门禁
    pub fn from_path(path: &str) -> Result<DynamicImage> {
        let bytes = std::fs::read(path)?;

        Self::from_bytes(Bytes::from(bytes))
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(format, ImageFormat::Png | ImageFormat::Jpeg)
    }

    /// 格式门禁，只放行PNG和JPEG
    ///
    /// 无法识别的字节不在这里拦截，交给解码器报错。
    fn check_format(bytes: &[u8]) -> Result<()> {
        if let Some(format) = Self::detect_format(bytes) {
            if !Self::is_supported_format(format) {
                return Err(ScanError::UnsupportedFormat(format!("{:?}", format)));
            }
        }

        Ok(())
    }

    /// 转换DynamicImage为ndarray::Array3<f32> (HWC格式, BGR通道顺序)
    ///
    /// 模型在BGR图像上训练，因此解码后立即翻转通道。
    pub fn to_bgr_array(image: &DynamicImage) -> Array3<f32> {
        let rgb_image = image.to_rgb8();
        let (width, height) = rgb_image.dimensions();
        let raw_data = rgb_image.into_raw();

        let mut array = Array3::<f32>::zeros((height as usize, width as usize, 3));

        for (i, pixel_value) in raw_data.iter().enumerate() {
            let h = (i / 3) / width as usize;
            let w = (i / 3) % width as usize;
            let c = i % 3;
            // RGB -> BGR
            array[[h, w, 2 - c]] = *pixel_value as f32;
        }

        array
    }

    /// 验证图像尺寸
    pub fn validate_dimensions(image: &DynamicImage) -> Result<()> {
        let (width, height) = image.dimensions();

        // 检查最小尺寸
        if width < 16 || height < 16 {
            return Err(ScanError::InvalidInput(format!(
                "Image too small: {}x{}, minimum 16x16",
                width, height
            )));
        }

        // 检查最大尺寸
        if width > 8192 || height > 8192 {
            return Err(ScanError::InvalidInput(format!(
                "Image too large: {}x{}, maximum 8192x8192",
                width, height
            )));
        }

        Ok(())
    }

    /// 解码并转换为BGR像素数组，扫描流水线的入口
    pub fn decode_bgr(image: DynamicImage) -> Result<Array3<f32>> {
        Self::validate_dimensions(&image)?;

        let rgb_image = image.to_rgb8();
        let array = Self::to_bgr_array(&DynamicImage::ImageRgb8(rgb_image));

        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use image::RgbImage;
    use std::io::Cursor;

    fn png_bytes(img: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn bgr_channel_order_is_flipped() {
        // 单像素: R=10, G=20, B=30
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgb([10, 20, 30]));

        let array = ImageLoader::to_bgr_array(&DynamicImage::ImageRgb8(img));

        assert_eq!(array[[0, 0, 0]], 30.0); // B
        assert_eq!(array[[0, 0, 1]], 20.0); // G
        assert_eq!(array[[0, 0, 2]], 10.0); // R
    }

    #[test]
    fn decode_bgr_yields_hwc_shape() {
        let img = RgbImage::from_pixel(32, 48, image::Rgb([128, 64, 255]));
        let bytes = png_bytes(img);

        let decoded = ImageLoader::from_bytes(Bytes::from(bytes)).unwrap();
        let array = ImageLoader::decode_bgr(decoded).unwrap();

        // HWC: 高48, 宽32, 3通道
        assert_eq!(array.dim(), (48, 32, 3));
        assert_eq!(array[[0, 0, 0]], 255.0); // B
        assert_eq!(array[[0, 0, 2]], 128.0); // R
    }

    #[test]
    fn from_base64_strips_data_url_prefix() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([1, 2, 3]));
        let bytes = png_bytes(img);
        let encoded = STANDARD.encode(&bytes);
        let with_prefix = format!("data:image/png;base64,{}", encoded);

        let plain = ImageLoader::from_base64(&encoded).unwrap();
        let prefixed = ImageLoader::from_base64(&with_prefix).unwrap();

        assert_eq!(plain.dimensions(), (16, 16));
        assert_eq!(prefixed.dimensions(), (16, 16));
    }

    #[test]
    fn invalid_bytes_are_rejected() {
        let result = ImageLoader::from_bytes(Bytes::from_static(b"not an image"));
        assert!(matches!(result, Err(ScanError::ImageDecode(_))));
    }

    #[test]
    fn non_png_jpeg_formats_are_rejected() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([1, 2, 3]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Bmp)
            .unwrap();

        let result = ImageLoader::from_bytes(Bytes::from(buf.into_inner()));
        assert!(matches!(result, Err(ScanError::UnsupportedFormat(_))));
    }

    #[test]
    fn from_path_loads_png_file() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([7, 8, 9]));
        let bytes = png_bytes(img);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, &bytes).unwrap();

        let loaded = ImageLoader::from_path(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.dimensions(), (16, 16));
    }

    #[test]
    fn from_path_applies_format_gate() {
        let img = RgbImage::from_pixel(16, 16, image::Rgb([1, 2, 3]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Bmp)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.bmp");
        std::fs::write(&path, buf.into_inner()).unwrap();

        let result = ImageLoader::from_path(path.to_str().unwrap());
        assert!(matches!(result, Err(ScanError::UnsupportedFormat(_))));
    }

    #[test]
    fn missing_path_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.png");

        let result = ImageLoader::from_path(path.to_str().unwrap());
        assert!(matches!(result, Err(ScanError::Io(_))));
    }

    #[test]
    fn tiny_image_fails_validation() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        assert!(matches!(
            ImageLoader::validate_dimensions(&img),
            Err(ScanError::InvalidInput(_))
        ));
    }
}
