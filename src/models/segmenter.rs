use crate::image::ImagePreprocessor;
use crate::utils::error::ScanError;
use crate::{Config, Result};
use ndarray::{s, Array2, Array3};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// 分割模型输入边长
const SEGMENTER_INPUT_SIZE: usize = 256;

/// 概率图二值化阈值，严格大于才算肿瘤像素
const MASK_THRESHOLD: f32 = 0.5;

pub struct TumorSegmenter {
    session: Arc<Mutex<Session>>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
    input_size: usize,
    thresh: f32,
}

impl TumorSegmenter {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = config.segmenter_model_path();

        if !model_path.exists() {
            return Err(ScanError::ModelLoad(format!(
                "Segmenter model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading segmenter model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .commit_from_file(&model_path)?;

        // 动态发现输入名称
        let input_name = if session.inputs.is_empty() {
            return Err(ScanError::ModelCompatibility(
                "Segmenter model has no inputs".to_string(),
            ));
        } else {
            session.inputs[0].name.clone()
        };

        // 动态发现输出名称
        let output_name = if session.outputs.is_empty() {
            return Err(ScanError::ModelCompatibility(
                "Segmenter model has no outputs".to_string(),
            ));
        } else {
            let output_name = session.outputs[0].name.clone();
            tracing::info!("Segmenter model output: '{}'", output_name);

            // 记录所有可用输出用于调试
            for (i, output) in session.outputs.iter().enumerate() {
                tracing::debug!("Segmenter output[{}]: '{}'", i, output.name);
            }

            output_name
        };

        let session = Arc::new(Mutex::new(session));

        Ok(Self {
            session,
            input_name,
            output_name,
            input_size: SEGMENTER_INPUT_SIZE,
            thresh: MASK_THRESHOLD,
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// 肿瘤区域分割，返回 input_size x input_size 的二值掩码
    pub fn segment(&self, image: &Array3<f32>) -> Result<Array2<u8>> {
        // 预处理: 缩放/归一化并添加batch维度
        let input_array = ImagePreprocessor::to_model_tensor(image, self.input_size)?;

        // 推理 - 立即提取数据避免生命周期冲突
        let input_tensor = Tensor::from_array(input_array)?;
        let prediction = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            // 使用动态发现的输出名称
            match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    // 提供详细的错误诊断信息
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(ScanError::Inference(format!(
                        "Segmenter output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        // 后处理: 概率图二值化
        let prob_map = Self::extract_prob_map(&prediction.view())?;
        let mask = Self::binarize(&prob_map.view(), self.thresh);

        tracing::debug!(
            "Segmentation mask: {}x{}, tumor pixels: {}",
            mask.dim().0,
            mask.dim().1,
            mask.iter().filter(|v| **v == 1).count()
        );

        Ok(mask)
    }

    /// 从模型输出中取出单通道概率图
    fn extract_prob_map(prediction: &ndarray::ArrayViewD<f32>) -> Result<Array2<f32>> {
        let pred_shape = prediction.shape();

        // 支持 3D 和 4D 张量
        let prob_map = if pred_shape.len() == 3 {
            // 3D 张量: (batch, height, width)
            if pred_shape[0] != 1 {
                return Err(ScanError::Inference(
                    "Expected batch size 1 for segmentation".to_string(),
                ));
            }
            prediction.slice(s![0, .., ..]).to_owned()
        } else if pred_shape.len() == 4 {
            // 4D 张量: 单通道维可能在最后 (batch,height,width,1) 或最前 (batch,1,height,width)
            if pred_shape[0] != 1 {
                return Err(ScanError::Inference(
                    "Expected batch size 1 for segmentation".to_string(),
                ));
            }
            if pred_shape[3] == 1 {
                prediction.slice(s![0, .., .., 0]).to_owned()
            } else if pred_shape[1] == 1 {
                prediction.slice(s![0, 0, .., ..]).to_owned()
            } else {
                return Err(ScanError::ModelCompatibility(format!(
                    "Expected single-channel segmentation output, got shape {:?}",
                    pred_shape
                )));
            }
        } else {
            return Err(ScanError::ModelCompatibility(format!(
                "Unsupported segmentation output shape: {:?}. Expected 3D (batch,height,width) or 4D (batch,height,width,channels)",
                pred_shape
            )));
        };

        Ok(prob_map)
    }

    /// 概率图二值化
    fn binarize(prob_map: &ndarray::ArrayView2<f32>, thresh: f32) -> Array2<u8> {
        let (height, width) = prob_map.dim();
        let mut mask = Array2::<u8>::zeros((height, width));

        for y in 0..height {
            for x in 0..width {
                if prob_map[[y, x]] > thresh {
                    mask[[y, x]] = 1;
                }
            }
        }

        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    #[test]
    fn binarize_is_strictly_greater_than() {
        let prob_map =
            Array2::from_shape_vec((1, 4), vec![0.49, 0.5, 0.500001, 0.9]).unwrap();

        let mask = TumorSegmenter::binarize(&prob_map.view(), MASK_THRESHOLD);

        assert_eq!(mask[[0, 0]], 0);
        assert_eq!(mask[[0, 1]], 0); // 恰好等于阈值不算
        assert_eq!(mask[[0, 2]], 1);
        assert_eq!(mask[[0, 3]], 1);
    }

    #[test]
    fn extract_handles_channel_last_4d() {
        let prediction =
            ArrayD::from_shape_vec(vec![1, 2, 2, 1], vec![0.1, 0.2, 0.3, 0.4]).unwrap();

        let prob_map = TumorSegmenter::extract_prob_map(&prediction.view()).unwrap();

        assert_eq!(prob_map.dim(), (2, 2));
        assert!((prob_map[[1, 1]] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn extract_handles_channel_first_4d() {
        let prediction =
            ArrayD::from_shape_vec(vec![1, 1, 2, 2], vec![0.1, 0.2, 0.3, 0.4]).unwrap();

        let prob_map = TumorSegmenter::extract_prob_map(&prediction.view()).unwrap();

        assert_eq!(prob_map.dim(), (2, 2));
        assert!((prob_map[[0, 1]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn extract_handles_3d() {
        let prediction = ArrayD::from_shape_vec(vec![1, 2, 2], vec![0.1, 0.2, 0.3, 0.4]).unwrap();

        let prob_map = TumorSegmenter::extract_prob_map(&prediction.view()).unwrap();

        assert_eq!(prob_map.dim(), (2, 2));
    }

    #[test]
    fn multi_channel_output_is_rejected() {
        let prediction = ArrayD::from_shape_vec(
            vec![1, 2, 2, 2],
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
        )
        .unwrap();

        assert!(matches!(
            TumorSegmenter::extract_prob_map(&prediction.view()),
            Err(ScanError::ModelCompatibility(_))
        ));
    }

    #[test]
    fn unexpected_rank_is_rejected() {
        let prediction = ArrayD::from_shape_vec(vec![2, 2], vec![0.1, 0.2, 0.3, 0.4]).unwrap();

        assert!(matches!(
            TumorSegmenter::extract_prob_map(&prediction.view()),
            Err(ScanError::ModelCompatibility(_))
        ));
    }
}
