use serde::Serialize;
use thiserror::Error;

#[cfg(feature = "http-api")]
use hyper::{Body, Response, StatusCode};

/// 统一的会话/转码错误类型
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid stream key: {message}")]
    InvalidKey { message: String },

    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Session {id} is already active")]
    AlreadyActive { id: String },

    #[error("Failed to launch transcoder: {source}")]
    SpawnFailed { source: std::io::Error },

    #[error("Storage error: {source}")]
    Storage {
        #[from]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<config::ConfigError> for StreamError {
    fn from(err: config::ConfigError) -> Self {
        StreamError::Config {
            message: err.to_string(),
        }
    }
}

impl StreamError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StreamError::InvalidKey { .. } => "INVALID_KEY",
            StreamError::NotFound { .. } => "SESSION_NOT_FOUND",
            StreamError::AlreadyActive { .. } => "ALREADY_ACTIVE",
            StreamError::SpawnFailed { .. } => "SPAWN_FAILED",
            StreamError::Storage { .. } => "STORAGE_ERROR",
            StreamError::Config { .. } => "CONFIG_ERROR",
            StreamError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    #[cfg(feature = "http-api")]
    pub fn http_status(&self) -> StatusCode {
        match self {
            StreamError::InvalidKey { .. } => StatusCode::BAD_REQUEST,
            StreamError::NotFound { .. } => StatusCode::NOT_FOUND,
            StreamError::AlreadyActive { .. } => StatusCode::CONFLICT,
            StreamError::SpawnFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            StreamError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            StreamError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            StreamError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn should_log_error(&self) -> bool {
        !matches!(
            self,
            StreamError::InvalidKey { .. }
                | StreamError::NotFound { .. }
                | StreamError::AlreadyActive { .. }
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub message: String,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn from_error(error: &StreamError) -> Self {
        Self {
            error: "StreamError".to_string(),
            code: error.error_code().to_string(),
            message: error.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// 错误处理器 - 统一处理错误并生成HTTP响应
#[cfg(feature = "http-api")]
pub struct ErrorHandler;

#[cfg(feature = "http-api")]
impl ErrorHandler {
    pub fn handle_error(error: &StreamError) -> Response<Body> {
        if error.should_log_error() {
            log::error!("Stream error: {}", error);
        } else {
            log::warn!("Client error: {}", error);
        }

        let error_response = ErrorResponse::from_error(error);
        let status = error.http_status();

        let response = Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, POST, DELETE, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type");

        let body = match serde_json::to_string(&error_response) {
            Ok(json) => Body::from(json),
            Err(_) => Body::from(
                r#"{"error":"InternalError","message":"Failed to serialize error response"}"#,
            ),
        };

        response.body(body).unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Body::from("Failed to build error response"))
                .unwrap()
        })
    }

    pub fn handle_success<T: Serialize>(data: T) -> Response<Body> {
        let response = match serde_json::to_string(&data) {
            Ok(json) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/json")
                .header("Access-Control-Allow-Origin", "*")
                .body(Body::from(json)),
            Err(e) => {
                log::error!("Failed to serialize success response: {}", e);
                let error = StreamError::Internal {
                    message: "Failed to serialize response".to_string(),
                };
                return Self::handle_error(&error);
            }
        };

        response.unwrap_or_else(|_| {
            let error = StreamError::Internal {
                message: "Failed to build success response".to_string(),
            };
            Self::handle_error(&error)
        })
    }
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, StreamError>;
