//! 共享密钥认证：校验 `X-API-KEY` 请求头。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, Request};
use axum::{middleware, response::Response};
use std::sync::Arc;
use tracing::warn;

use crate::config::{API_KEY_HEADER, RelayConfig};
use crate::error::ApiError;

/// 认证中间件：未配置密钥时放行，否则要求请求头完全匹配。
///
/// Runs before the handler touches the body, so a rejected request never
/// reaches the staging directory or the remote session.
pub async fn require_api_key(
    Extension(config): Extension<Arc<RelayConfig>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, ApiError> {
    check_api_key(req.headers(), config.api_key.as_deref())?;
    Ok(next.run(req).await)
}

pub fn check_api_key(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let presented = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());
    match presented {
        Some(presented) if keys_match(presented.as_bytes(), expected.as_bytes()) => Ok(()),
        Some(_) => {
            warn!("rejected upload with invalid api key");
            Err(ApiError::Unauthorized("invalid API key".into()))
        }
        None => Err(ApiError::Unauthorized("missing API key".into())),
    }
}

fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    if presented.len() != expected.len() {
        return false;
    }
    presented
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with_key(key: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-API-KEY", HeaderValue::from_static(key));
        headers
    }

    #[test]
    fn matching_key_is_accepted() {
        let result = check_api_key(&headers_with_key("secret123"), Some("secret123"));
        assert!(result.is_ok());
    }

    #[test]
    fn wrong_or_missing_key_is_unauthorized() {
        let wrong = check_api_key(&headers_with_key("wrong"), Some("secret123"));
        assert!(matches!(wrong, Err(ApiError::Unauthorized(_))));

        let prefix = check_api_key(&headers_with_key("secret12"), Some("secret123"));
        assert!(matches!(prefix, Err(ApiError::Unauthorized(_))));

        let missing = check_api_key(&HeaderMap::new(), Some("secret123"));
        assert!(matches!(missing, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn unset_key_leaves_route_open() {
        assert!(check_api_key(&HeaderMap::new(), None).is_ok());
    }
}
