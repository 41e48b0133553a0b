use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    auth::AuthError,
    store::StoreError,
    utils::{error_codes, error_to_api_response},
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("未授权访问")]
    Unauthorized(Option<AuthError>),
    #[error("用户名或密码错误")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} 不存在")]
    NotFound(String),
    #[error("生成令牌失败")]
    TokenIssue(#[from] jsonwebtoken::errors::Error),
    #[error("内部服务器错误")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AppError::NotFound(what),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("serialization failed: {}", e))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(e: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("password check failed: {}", e))
    }
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AppError::Unauthorized(_) | AppError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED)
            }
            AppError::Validation(_) | AppError::Conflict(_) => {
                (StatusCode::BAD_REQUEST, error_codes::VALIDATION_ERROR)
            }
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, error_codes::PERMISSION_DENIED),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, error_codes::NOT_FOUND),
            AppError::TokenIssue(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, error_codes::INTERNAL_ERROR)
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        match &self {
            AppError::Internal(detail) => tracing::error!("Internal error: {}", detail),
            AppError::TokenIssue(e) => tracing::error!("Failed to issue token: {}", e),
            _ => {}
        }

        // 认证失败对外统一为 401，具体原因只进日志
        (status, error_to_api_response::<()>(code, self.to_string())).into_response()
    }
}
