use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::lifecycle::AdminError;
use crate::notify::DirectoryError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown placement `{0}`")]
    UnknownPlacement(String),
    #[error("unknown expiration event `{0}`")]
    UnknownEvent(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),
    #[error(transparent)]
    Admin(#[from] AdminError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownPlacement(_) | ApiError::UnknownEvent(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            // 语法错误 400，字段或取值不合法 422
            ApiError::InvalidBody(rejection) => rejection.status(),
            ApiError::Admin(AdminError::Store(StoreError::Storage(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Admin(AdminError::Store(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Admin(AdminError::Upload(_)) | ApiError::Directory(_) => StatusCode::BAD_GATEWAY,
            ApiError::Admin(AdminError::UploaderNotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Admin(AdminError::Store(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            match status {
                StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error".to_string(),
                _ => self.to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
