use crate::{
    image::{ImageEncoder, ImageLoader, ImageTransforms, OverlayRenderer},
    models::ModelManager,
    scan::types::{MaskStats, ScanOptions, ScanResult, ScanStage, ScanStatus},
    Result,
};
use ndarray::Array3;
use std::time::Instant;
use tokio::sync::mpsc;

/// 扫描处理流水线
///
/// 解码 -> 分类 -> (检出肿瘤时) 分割 -> 掩码叠加 -> 编码。
/// 全程同步执行，调用方负责放到阻塞线程上运行。
pub struct ScanPipeline;

impl ScanPipeline {
    /// 处理base64图像
    pub fn process_base64(
        models: &ModelManager,
        base64_data: &str,
        options: ScanOptions,
        status_tx: Option<mpsc::UnboundedSender<ScanStatus>>,
    ) -> Result<ScanResult> {
        let start_time = Instant::now();

        // 发送解码状态
        if let Some(ref tx) = status_tx {
            let _ = tx.send(ScanStatus::new(
                ScanStage::Decoding,
                0.1,
                "Loading image from base64",
            ));
        }

        // 加载图像并执行扫描流水线
        let result = ImageLoader::from_base64(base64_data)
            .and_then(ImageLoader::decode_bgr)
            .and_then(|image_array| {
                Self::process_image_array(models, image_array, options, &status_tx, start_time)
            });

        Self::report_failure(&result, &status_tx);
        result
    }

    /// 处理字节流图像
    pub fn process_bytes(
        models: &ModelManager,
        bytes: axum::body::Bytes,
        options: ScanOptions,
        status_tx: Option<mpsc::UnboundedSender<ScanStatus>>,
    ) -> Result<ScanResult> {
        let start_time = Instant::now();

        // 发送解码状态
        if let Some(ref tx) = status_tx {
            let _ = tx.send(ScanStatus::new(
                ScanStage::Decoding,
                0.1,
                "Loading image from stream",
            ));
        }

        // 加载图像并执行扫描流水线
        let result = ImageLoader::from_bytes(bytes)
            .and_then(ImageLoader::decode_bgr)
            .and_then(|image_array| {
                Self::process_image_array(models, image_array, options, &status_tx, start_time)
            });

        Self::report_failure(&result, &status_tx);
        result
    }

    /// 失败时向观察者发送终态
    fn report_failure(
        result: &Result<ScanResult>,
        status_tx: &Option<mpsc::UnboundedSender<ScanStatus>>,
    ) {
        if let (Err(e), Some(tx)) = (result, status_tx) {
            let _ = tx.send(ScanStatus::new(
                ScanStage::Error,
                1.0,
                &format!("Scan failed: {}", e),
            ));
        }
    }

    /// 核心扫描流水线
    fn process_image_array(
        models: &ModelManager,
        image: Array3<f32>,
        options: ScanOptions,
        status_tx: &Option<mpsc::UnboundedSender<ScanStatus>>,
        start_time: Instant,
    ) -> Result<ScanResult> {
        // 肿瘤分类
        if let Some(tx) = status_tx {
            let _ = tx.send(ScanStatus::new(
                ScanStage::Classification,
                0.3,
                "Classifying tumor type",
            ));
        }

        let classifier = models.classifier();
        let classification_start = Instant::now();
        let prediction = classifier.predict(&image)?;
        let classification_time = classification_start.elapsed();

        tracing::debug!(
            "Classification done in {:.3}s: {} (confidence {:.4})",
            classification_time.as_secs_f32(),
            prediction.label,
            prediction.confidence
        );

        let tumor_detected = prediction.class.is_tumor();

        // 分割和掩码叠加，只在检出肿瘤时执行
        let (overlay_image, mask_stats) = if tumor_detected {
            if let Some(tx) = status_tx {
                let _ = tx.send(ScanStatus::new(
                    ScanStage::Segmentation,
                    0.5,
                    "Segmenting tumor region",
                ));
            }

            let segmenter = models.segmenter();
            let segmentation_start = Instant::now();
            let mask = segmenter.segment(&image)?;
            let segmentation_time = segmentation_start.elapsed();

            if let Some(tx) = status_tx {
                let _ = tx.send(ScanStatus::new(
                    ScanStage::Overlay,
                    0.7,
                    "Rendering mask overlay",
                ));
            }

            // 掩码放大到原图分辨率，统计和叠加都基于放大后的掩码
            let (height, width, _) = image.dim();
            let mask = if mask.dim() != (height, width) {
                ImageTransforms::resize_mask_nearest(&mask, width, height)?
            } else {
                mask
            };

            let blended = OverlayRenderer::apply_mask(&image, &mask)?;
            let stats = MaskStats::from_mask(&mask);

            tracing::debug!(
                "Segmentation done in {:.3}s: coverage {:.4}",
                segmentation_time.as_secs_f32(),
                stats.coverage_ratio
            );

            let encoded = if options.include_images {
                Some(ImageEncoder::to_base64_png(&blended)?)
            } else {
                None
            };

            (encoded, Some(stats))
        } else {
            (None, None)
        };

        let original_image = if options.include_images {
            Some(ImageEncoder::to_base64_png(&image)?)
        } else {
            None
        };

        let model_info = if options.include_model_info {
            Some(models.model_info())
        } else {
            None
        };

        let total_time = start_time.elapsed();

        // 发送完成状态
        if let Some(tx) = status_tx {
            let _ = tx.send(ScanStatus::new(
                ScanStage::Completed,
                1.0,
                &format!("Scan completed: {}", prediction.label),
            ));
        }

        tracing::info!(
            "Scan completed: class={}, tumor_detected={}, total_time={:.3}s",
            prediction.label,
            tumor_detected,
            total_time.as_secs_f32()
        );

        Ok(ScanResult {
            prediction,
            tumor_detected,
            original_image,
            overlay_image,
            mask_stats,
            processing_time: total_time.as_secs_f32(),
            model_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::types::{Prediction, TumorClass};
    use crate::utils::error::ScanError;

    fn no_tumor_result() -> ScanResult {
        let class = TumorClass::NoTumor;
        ScanResult {
            prediction: Prediction {
                class,
                label: class.display_name().to_string(),
                class_index: 2,
                confidence: 0.9,
                probabilities: vec![0.03, 0.03, 0.9, 0.04],
            },
            tumor_detected: false,
            original_image: None,
            overlay_image: None,
            mask_stats: None,
            processing_time: 0.1,
            model_info: None,
        }
    }

    #[test]
    fn failures_emit_terminal_error_status() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let result: Result<ScanResult> =
            Err(ScanError::InvalidInput("Empty image data".to_string()));

        ScanPipeline::report_failure(&result, &Some(tx));

        let status = rx.try_recv().unwrap();
        assert_eq!(status.stage, ScanStage::Error);
        assert!((status.progress - 1.0).abs() < 1e-6);
        assert!(status.message.contains("Empty image data"));
    }

    #[test]
    fn success_emits_no_failure_status() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScanStatus>();
        let result: Result<ScanResult> = Ok(no_tumor_result());

        ScanPipeline::report_failure(&result, &Some(tx));

        assert!(rx.try_recv().is_err());
    }
}
