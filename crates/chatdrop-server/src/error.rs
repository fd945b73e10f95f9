use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use chatdrop_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("No file provided")]
    MissingFile,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge { size: usize, max: usize },

    #[error("Request body exceeds {max} bytes")]
    BodyTooLarge { max: usize },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Upload storage error: {0}")]
    Storage(String),

    #[error("Message log error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::MissingFile
            | ServerError::UnsupportedFileType(_)
            | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::FileTooLarge { .. } | ServerError::BodyTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ServerError::Storage(_) | ServerError::Store(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
            match &self {
                ServerError::Storage(_) | ServerError::Store(_) => "Upload failed".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
