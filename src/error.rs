//! 统一的 API 错误类型与转换。

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::remote::RemoteError;
use crate::session::SessionError;
use crate::staging::StagingError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Unavailable(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    message: &'a str,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Unavailable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: "error",
            message: self.message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(error: SessionError) -> Self {
        ApiError::Unavailable(format!("storage service unavailable: {error}"))
    }
}

impl From<RemoteError> for ApiError {
    fn from(error: RemoteError) -> Self {
        ApiError::Internal(format!("upload failed: {error}"))
    }
}

impl From<StagingError> for ApiError {
    fn from(error: StagingError) -> Self {
        match error {
            StagingError::TooLarge(limit) => {
                ApiError::BadRequest(format!("file exceeds upload limit of {limit} bytes"))
            }
            StagingError::Read(msg) => ApiError::BadRequest(format!("failed to read upload: {msg}")),
            StagingError::Io(err) => ApiError::Internal(format!("upload failed: {err}")),
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        let status = error.status();
        if status.is_client_error() {
            ApiError::BadRequest(error.body_text())
        } else {
            ApiError::Internal(error.body_text())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn error_renders_json_status_and_message() {
        let response = ApiError::Unauthorized("invalid api key".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json body");
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "invalid api key");
    }

    #[test]
    fn staging_limit_is_a_client_error() {
        let error: ApiError = StagingError::TooLarge(10).into();
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }
}
