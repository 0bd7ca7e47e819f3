//! 路由组装：上传、状态页与中间件。

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::config::RelayConfig;
use crate::http::resolve_client_ip;
use crate::session::SessionManager;
use crate::staging::Staging;
use crate::{auth, dashboard, http, upload, version};

/// Slack on top of the file size limit for multipart boundaries and headers.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

pub fn build_router(
    config: Arc<RelayConfig>,
    sessions: Arc<SessionManager>,
    staging: Arc<Staging>,
) -> Router {
    let upload_routes = Router::new()
        .route(
            "/upload",
            post(upload::upload_file).route_layer(middleware::from_fn(auth::require_api_key)),
        )
        .route("/upload_via_dashboard", post(upload::upload_via_dashboard))
        .layer(upload_body_limit(config.max_upload_size));

    Router::new()
        .route("/", get(dashboard::home))
        .route("/api/status", get(dashboard::api_status))
        .route("/api/version", get(version::get_version_info))
        .merge(upload_routes)
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = resolve_client_ip(request.headers(), connect_ip)
                        .map(|ip| ip.to_string())
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        uri = %request.uri(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(Extension(config))
        .layer(Extension(sessions))
        .layer(Extension(staging))
}

fn upload_body_limit(max_upload_size: u64) -> DefaultBodyLimit {
    if max_upload_size == 0 {
        return DefaultBodyLimit::disable();
    }
    let limit = max_upload_size.saturating_add(MULTIPART_OVERHEAD);
    DefaultBodyLimit::max(usize::try_from(limit).unwrap_or(usize::MAX))
}
