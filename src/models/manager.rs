use crate::models::{TumorClassifier, TumorSegmenter};
use crate::scan::types::{ModelInfo, TumorClass};
use crate::utils::error::ScanError;
use crate::{Config, Result};
use std::sync::Arc;

/// 模型管理器，持有全部ONNX会话
///
/// 服务启动时构造一次，之后通过Arc在请求间共享。
pub struct ModelManager {
    classifier: Arc<TumorClassifier>,
    segmenter: Arc<TumorSegmenter>,
    config: Config,
}

impl ModelManager {
    /// 加载全部模型
    pub fn new(config: Config) -> Result<Self> {
        tracing::info!("Initializing model manager...");

        let classifier = Arc::new(TumorClassifier::new(&config)?);
        let segmenter = Arc::new(TumorSegmenter::new(&config)?);

        tracing::info!(
            "Model manager initialized: intra_threads={}, graph_optimization={}",
            config.onnx_config.intra_threads,
            config.onnx_config.enable_optimization
        );

        Ok(Self {
            classifier,
            segmenter,
            config,
        })
    }

    /// 获取分类器引用
    pub fn classifier(&self) -> Arc<TumorClassifier> {
        Arc::clone(&self.classifier)
    }

    /// 获取分割器引用
    pub fn segmenter(&self) -> Arc<TumorSegmenter> {
        Arc::clone(&self.segmenter)
    }

    /// 模型健康检查
    pub fn health_check(&self) -> Result<()> {
        tracing::debug!("Performing model health check...");

        // 模型文件可能在启动后被移动或删除
        for path in [
            self.config.classifier_model_path(),
            self.config.segmenter_model_path(),
        ] {
            if !path.exists() {
                return Err(ScanError::ModelLoad(format!(
                    "Model file missing: {}",
                    path.display()
                )));
            }
        }

        tracing::debug!("Model health check passed");
        Ok(())
    }

    /// 组装响应用的模型信息
    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            classifier_input: format!("{0}x{0}", self.classifier.input_size()),
            segmenter_input: format!("{0}x{0}", self.segmenter.input_size()),
            classes: TumorClass::all()
                .iter()
                .map(|c| c.display_name().to_string())
                .collect(),
        }
    }

    /// 获取模型统计信息
    pub fn get_stats(&self) -> ModelStats {
        ModelStats {
            has_classifier: true,
            has_segmenter: true,
            intra_threads: self.config.onnx_config.intra_threads,
            optimization_level: self.config.onnx_config.optimization_level,
        }
    }
}

/// 模型统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelStats {
    pub has_classifier: bool,
    pub has_segmenter: bool,
    pub intra_threads: usize,
    pub optimization_level: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_requires_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(
            "127.0.0.1:5010".to_string(),
            dir.path().to_string_lossy().to_string(),
            Some(1),
            false,
        )
        .unwrap();

        assert!(matches!(
            ModelManager::new(config),
            Err(ScanError::ModelLoad(_))
        ));
    }
}
