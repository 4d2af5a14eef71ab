use crate::image::ImagePreprocessor;
use crate::scan::types::{Prediction, TumorClass};
use crate::utils::error::ScanError;
use crate::{Config, Result};
use ndarray::Array3;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// 分类模型输入边长
const CLASSIFIER_INPUT_SIZE: usize = 224;

pub struct TumorClassifier {
    session: Arc<Mutex<Session>>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
    input_size: usize,
}

impl TumorClassifier {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = config.classifier_model_path();

        if !model_path.exists() {
            return Err(ScanError::ModelLoad(format!(
                "Classifier model not found: {}",
                model_path.display()
            )));
        }

        tracing::info!("Loading classifier model from: {}", model_path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .commit_from_file(&model_path)?;

        // 动态发现输入名称
        let input_name = if session.inputs.is_empty() {
            return Err(ScanError::ModelCompatibility(
                "Classifier model has no inputs".to_string(),
            ));
        } else {
            session.inputs[0].name.clone()
        };

        // 动态发现输出名称
        let output_name = if session.outputs.is_empty() {
            return Err(ScanError::ModelCompatibility(
                "Classifier model has no outputs".to_string(),
            ));
        } else {
            let output_name = session.outputs[0].name.clone();
            tracing::info!("Classifier model output: '{}'", output_name);

            // 记录所有可用输出用于调试
            for (i, output) in session.outputs.iter().enumerate() {
                tracing::debug!("Classifier output[{}]: '{}'", i, output.name);
            }

            output_name
        };

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_name,
            input_size: CLASSIFIER_INPUT_SIZE,
        })
    }

    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// 肿瘤类别预测
    pub fn predict(&self, image: &Array3<f32>) -> Result<Prediction> {
        // 预处理: 缩放/归一化并添加batch维度
        let input_array = ImagePreprocessor::to_model_tensor(image, self.input_size)?;

        // 推理
        let input_tensor = Tensor::from_array(input_array)?;
        let predictions = {
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
                        "Classifier output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        Self::parse_prediction(&predictions.view())
    }

    /// 解析分类输出
    fn parse_prediction(predictions: &ndarray::ArrayViewD<f32>) -> Result<Prediction> {
        let pred_shape = predictions.shape();
        if pred_shape.len() != 2 {
            return Err(ScanError::Inference(format!(
                "Expected 2D classification tensor, got {:?}",
                pred_shape
            )));
        }

        let (batch_size, num_classes) = (pred_shape[0], pred_shape[1]);

        if batch_size != 1 {
            return Err(ScanError::Inference(
                "Expected batch size 1 for classification".to_string(),
            ));
        }

        if num_classes != TumorClass::all().len() {
            return Err(ScanError::ModelCompatibility(format!(
                "Classifier produces {} classes, expected {}",
                num_classes,
                TumorClass::all().len()
            )));
        }

        // 找到最大激活的类别
        let mut max_prob = f32::NEG_INFINITY;
        let mut max_idx = 0;
        let mut probabilities = Vec::with_capacity(num_classes);

        for i in 0..num_classes {
            let prob = predictions[[0, i]];
            probabilities.push(prob);
            if prob > max_prob {
                max_prob = prob;
                max_idx = i;
            }
        }

        let class = TumorClass::from_index(max_idx)?;

        Ok(Prediction {
            class,
            label: class.display_name().to_string(),
            class_index: max_idx,
            confidence: max_prob,
            probabilities,
        })
    }
}
