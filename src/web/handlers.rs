use crate::{
    scan::{ScanOptions, ScanPipeline, ScanResult, ScanStatus},
    utils::error::ScanError,
    web::AppState,
    Result,
};
use axum::{
    extract::{Multipart, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct ScanJsonRequest {
    /// Base64编码的图像数据
    pub image: String,

    /// 扫描选项，直接从请求体顶层字段读取
    #[serde(flatten)]
    pub options: ScanOptions,
}

/// JSON响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// 开发模式下订阅进度消息并写入日志
fn spawn_progress_logger(
    dev_mode: bool,
    request_id: &str,
) -> Option<mpsc::UnboundedSender<ScanStatus>> {
    if !dev_mode {
        return None;
    }

    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<ScanStatus>();
    let progress_id = request_id.to_string();

    tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            tracing::debug!(
                "Scan progress [{}]: {:?} - {:.1}% - {}",
                progress_id,
                status.stage,
                status.progress * 100.0,
                status.message
            );
        }
    });

    Some(status_tx)
}

/// JSON base64上传处理器
pub async fn scan_json_handler(
    State(state): State<AppState>,
    Json(request): Json<ScanJsonRequest>,
) -> Result<Json<ApiResponse<ScanResult>>> {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!(
        "Processing JSON scan request: request_id={}, include_images={}",
        request_id,
        request.options.include_images
    );

    // 验证请求参数
    if request.image.is_empty() {
        return Err(ScanError::InvalidInput("Empty image data".to_string()));
    }

    let options = request.options;

    let status_tx = spawn_progress_logger(state.config.dev_mode, &request_id);

    // 推理是CPU密集型操作，放到阻塞线程上执行
    let models = Arc::clone(&state.models);
    let image_data = request.image;
    let result = tokio::task::spawn_blocking(move || {
        ScanPipeline::process_base64(&models, &image_data, options, status_tx)
    })
    .await
    .map_err(|e| ScanError::Internal(format!("Scan task failed: {}", e)))??;

    let processing_time = start_time.elapsed();

    tracing::info!(
        "JSON scan completed: request_id={}, class={}, time={:.3}s",
        request_id,
        result.prediction.label,
        processing_time.as_secs_f32()
    );

    Ok(Json(ApiResponse::success(result)))
}

/// Multipart文件上传处理器
pub async fn scan_upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<ScanResult>>> {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string();

    tracing::info!("Processing multipart scan request: request_id={}", request_id);

    let mut image_data: Option<axum::body::Bytes> = None;
    let mut options = ScanOptions::default();

    // 解析multipart数据
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ScanError::InvalidInput(format!("Failed to read multipart field: {}", e))
    })? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "file" => {
                // 验证内容类型
                if let Some(content_type) = field.content_type() {
                    if !content_type.starts_with("image/") {
                        return Err(ScanError::UnsupportedFormat(content_type.to_string()));
                    }
                }

                // 读取文件数据
                let data = field.bytes().await.map_err(|e| {
                    ScanError::InvalidInput(format!("Failed to read file data: {}", e))
                })?;

                if data.is_empty() {
                    return Err(ScanError::InvalidInput("Empty file".to_string()));
                }

                tracing::debug!("Received file: {} bytes", data.len());
                image_data = Some(data);
            }
            "include_images" => {
                let value = field.text().await.unwrap_or_default();
                options.include_images = value.parse().unwrap_or(true);
            }
            "include_model_info" => {
                let value = field.text().await.unwrap_or_default();
                options.include_model_info = value.parse().unwrap_or(false);
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    // 验证必需的图像数据
    let image_data =
        image_data.ok_or_else(|| ScanError::InvalidInput("No image file provided".to_string()))?;

    let status_tx = spawn_progress_logger(state.config.dev_mode, &request_id);

    // 推理是CPU密集型操作，放到阻塞线程上执行
    let models = Arc::clone(&state.models);
    let result = tokio::task::spawn_blocking(move || {
        ScanPipeline::process_bytes(&models, image_data, options, status_tx)
    })
    .await
    .map_err(|e| ScanError::Internal(format!("Scan task failed: {}", e)))??;

    let processing_time = start_time.elapsed();

    tracing::info!(
        "Upload scan completed: request_id={}, class={}, time={:.3}s",
        request_id,
        result.prediction.label,
        processing_time.as_secs_f32()
    );

    Ok(Json(ApiResponse::success(result)))
}
