//! 标准化错误处理
//!
//! 定义服务专用的错误类型，以及到 HTTP 响应的映射

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// 服务主要错误类型
#[derive(Error, Debug)]
pub enum AppError {
    /// 输入验证错误
    #[error("{0}")]
    Validation(String),

    /// 未登录或凭证无效
    #[error("{0}")]
    Unauthorized(String),

    /// 权限不足
    #[error("{0}")]
    Forbidden(String),

    /// 资源不存在
    #[error("{0}")]
    NotFound(String),

    /// 唯一性冲突
    #[error("{0}")]
    Conflict(String),

    /// OTP 已过期
    #[error("OTP has expired")]
    OtpExpired,

    /// 存储相关错误
    #[error("Storage error: {0}")]
    Storage(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 未分类的内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::OtpExpired => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Storage(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// 服务结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;
