use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model incompatible: {0}")]
    ModelCompatibility(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("Tensor shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ScanError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ScanError::ShapeMismatch(_) => StatusCode::BAD_REQUEST,
            ScanError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            ScanError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ScanError::Base64(_) => StatusCode::BAD_REQUEST,
            ScanError::Json(_) => StatusCode::BAD_REQUEST,
            ScanError::ImageDecode(_) => StatusCode::BAD_REQUEST,
            ScanError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScanError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ScanError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            ScanError::ModelCompatibility(_) => "MODEL_COMPATIBILITY_ERROR",
            ScanError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            ScanError::ShapeMismatch(_) => "SHAPE_MISMATCH",
            ScanError::Inference(_) => "INFERENCE_ERROR",
            ScanError::InvalidInput(_) => "INVALID_INPUT",
            ScanError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            ScanError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ScanError::Config(_) => "CONFIG_ERROR",
            ScanError::Io(_) => "IO_ERROR",
            ScanError::Json(_) => "JSON_ERROR",
            ScanError::Base64(_) => "BASE64_DECODE_ERROR",
            ScanError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            ScanError::Ort(_) => "ORT_ERROR",
            ScanError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        tracing::error!("Request failed: {} ({})", self, status);

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_map_to_client_status() {
        let err = ScanError::UnsupportedFormat("image/gif".to_string());
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");

        let err = ScanError::ShapeMismatch("expected (1, 224, 224, 3)".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn model_load_is_service_unavailable() {
        let err = ScanError::ModelLoad("classifier.onnx not found".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "MODEL_LOAD_ERROR");
    }
}
