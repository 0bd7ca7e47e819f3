//! HTTP 辅助工具：客户端 IP、CORS 与响应头。

use axum::body::Body as AxumBody;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, header};
use axum::{middleware, response::Response};
use std::net::IpAddr;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::API_KEY_HEADER;

/// 跨域上传所需的 CORS Layer；只放行中继实际使用的方法与请求头。
pub fn build_cors_layer(cors_origins: Option<&str>) -> Option<CorsLayer> {
    let mut origins = Vec::new();
    for origin in cors_origins?.split(',').map(str::trim) {
        if origin.is_empty() {
            continue;
        }
        match HeaderValue::from_str(origin) {
            Ok(value) => origins.push(value),
            Err(_) => warn!(origin, "ignoring invalid cors origin"),
        }
    }
    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                header::CONTENT_TYPE,
                header::ACCEPT,
                HeaderName::from_static(API_KEY_HEADER),
            ]),
    )
}

/// 客户端 IP：优先取代理转发头中的第一跳，其次 `x-real-ip`，最后是连接地址。
pub fn resolve_client_ip(headers: &HeaderMap, connect_ip: Option<IpAddr>) -> Option<IpAddr> {
    let header_ip = |name: &str, first_hop: bool| {
        let value = headers.get(name)?.to_str().ok()?;
        let value = if first_hop {
            value.split(',').next()?
        } else {
            value
        };
        value.trim().parse::<IpAddr>().ok()
    };
    header_ip("x-forwarded-for", true)
        .or_else(|| header_ip("x-real-ip", false))
        .or(connect_ip)
}

/// 为每个响应附加安全头。状态页与上传结果都随账户状态变化，禁止缓存；
/// 提示消息放在查询串里，也不随 Referer 外泄。
pub async fn add_security_headers(request: Request<AxumBody>, next: middleware::Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    headers
        .entry(header::CACHE_CONTROL)
        .or_insert(HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_ip_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let ip = resolve_client_ip(&headers, Some("127.0.0.1".parse().expect("ip")));
        assert_eq!(ip, Some("203.0.113.7".parse().expect("ip")));
    }

    #[test]
    fn connect_ip_is_used_without_forwarded_header() {
        let connect: IpAddr = "192.0.2.1".parse().expect("ip");
        assert_eq!(resolve_client_ip(&HeaderMap::new(), Some(connect)), Some(connect));
    }

    #[test]
    fn real_ip_header_is_used_behind_single_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        let ip = resolve_client_ip(&headers, Some("127.0.0.1".parse().expect("ip")));
        assert_eq!(ip, Some("198.51.100.4".parse().expect("ip")));

        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        assert_eq!(
            resolve_client_ip(&headers, None),
            Some("198.51.100.4".parse().expect("ip"))
        );
    }

    #[test]
    fn cors_layer_requires_valid_origins() {
        assert!(build_cors_layer(None).is_none());
        assert!(build_cors_layer(Some(" , ")).is_none());
        assert!(build_cors_layer(Some("https://example.com")).is_some());
    }
}
