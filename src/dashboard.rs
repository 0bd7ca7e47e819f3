//! 状态页：JSON 状态报告与 HTML 仪表盘。

use axum::extract::rejection::QueryRejection;
use axum::extract::{Extension, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Json as JsonResponse, Response};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

use crate::config::RelayConfig;
use crate::remote::StorageQuota;
use crate::session::SessionManager;

#[derive(Serialize, Debug)]
pub struct StatusReport {
    pub status: &'static str,
    pub message: String,
    pub remote_folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageQuota>,
}

#[derive(Deserialize, Default)]
pub struct FlashQuery {
    message_text: Option<String>,
    message_class: Option<String>,
}

/// One-shot message carried to the dashboard in the redirect's query string.
#[derive(Debug, PartialEq, Eq)]
pub struct Flash {
    pub text: String,
    pub class: FlashClass,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashClass {
    Success,
    Error,
}

impl FlashClass {
    fn as_str(self) -> &'static str {
        match self {
            FlashClass::Success => "success",
            FlashClass::Error => "error",
        }
    }
}

impl Flash {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            class: FlashClass::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            class: FlashClass::Error,
        }
    }

    /// 重定向目标地址。
    pub fn location(&self) -> String {
        format!(
            "/?message_text={}&message_class={}",
            urlencoding::encode(&self.text),
            self.class.as_str()
        )
    }

    fn from_query(query: FlashQuery) -> Option<Self> {
        let text = query.message_text.filter(|text| !text.is_empty())?;
        let class = match query.message_class.as_deref() {
            Some("success") => FlashClass::Success,
            _ => FlashClass::Error,
        };
        Some(Self { text, class })
    }
}

/// 汇总远端连接状态与配额。
pub async fn build_status(config: &RelayConfig, sessions: &SessionManager) -> (StatusCode, StatusReport) {
    match sessions.session().await {
        Ok(session) => {
            let storage = match session.storage_quota().await {
                Ok(quota) => Some(quota),
                Err(err) => {
                    debug!(error = %err, "storage quota unavailable");
                    None
                }
            };
            (
                StatusCode::OK,
                StatusReport {
                    status: "connected",
                    message: "Server and MEGA are connected.".into(),
                    remote_folder: config.folder_name.clone(),
                    storage,
                },
            )
        }
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            StatusReport {
                status: "unavailable",
                message: format!("Server is running, but MEGA connection failed: {err}"),
                remote_folder: config.folder_name.clone(),
                storage: None,
            },
        ),
    }
}

/// JSON 状态接口。
pub async fn api_status(
    Extension(config): Extension<Arc<RelayConfig>>,
    Extension(sessions): Extension<Arc<SessionManager>>,
) -> (StatusCode, JsonResponse<StatusReport>) {
    let (status, report) = build_status(&config, &sessions).await;
    (status, JsonResponse(report))
}

/// 首页：浏览器返回仪表盘，其余客户端返回 JSON。
pub async fn home(
    Extension(config): Extension<Arc<RelayConfig>>,
    Extension(sessions): Extension<Arc<SessionManager>>,
    headers: HeaderMap,
    query: Result<Query<FlashQuery>, QueryRejection>,
) -> Response {
    let (status, report) = build_status(&config, &sessions).await;
    if !wants_html(&headers) {
        return (status, JsonResponse(report)).into_response();
    }
    // 提示消息只是附带信息，无法解析时忽略，状态报告照常返回。
    let flash = query.ok().and_then(|Query(query)| Flash::from_query(query));
    (status, Html(render_dashboard(&report, flash.as_ref()))).into_response()
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn render_dashboard(report: &StatusReport, flash: Option<&Flash>) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>MEGA Relay</title>\n</head>\n<body>\n<h1>MEGA Relay</h1>\n",
    );
    if let Some(flash) = flash {
        let _ = writeln!(
            html,
            "<p class=\"flash {}\">{}</p>",
            flash.class.as_str(),
            escape_html(&flash.text)
        );
    }
    let _ = writeln!(
        html,
        "<p class=\"status {}\">{}</p>",
        report.status,
        escape_html(&report.message)
    );
    let _ = writeln!(
        html,
        "<p>Destination folder: <code>{}</code></p>",
        escape_html(&report.remote_folder)
    );
    if let Some(quota) = report.storage {
        let _ = writeln!(
            html,
            "<p>Storage: {} of {} used</p>",
            format_bytes(quota.used),
            format_bytes(quota.total)
        );
    }
    html.push_str(
        "<form action=\"/upload_via_dashboard\" method=\"post\" enctype=\"multipart/form-data\">\n<input type=\"file\" name=\"file\">\n<button type=\"submit\">Upload</button>\n</form>\n</body>\n</html>\n",
    );
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_location_encodes_message() {
        let flash = Flash::error("upload failed: a & b");
        assert_eq!(
            flash.location(),
            "/?message_text=upload%20failed%3A%20a%20%26%20b&message_class=error"
        );
    }

    #[test]
    fn flash_from_query_defaults_to_error_class() {
        let flash = Flash::from_query(FlashQuery {
            message_text: Some("hi".into()),
            message_class: Some("bogus".into()),
        });
        assert_eq!(flash, Some(Flash::error("hi")));
        assert_eq!(Flash::from_query(FlashQuery::default()), None);
    }

    #[test]
    fn dashboard_escapes_flash_text() {
        let report = StatusReport {
            status: "connected",
            message: "ok".into(),
            remote_folder: "Uploaded_Data".into(),
            storage: Some(StorageQuota {
                used: 1536,
                total: 20 * 1024 * 1024 * 1024,
            }),
        };
        let html = render_dashboard(&report, Some(&Flash::success("<b>x</b>")));
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
        assert!(html.contains("1.5 KB of 20.0 GB used"));
        assert!(html.contains("action=\"/upload_via_dashboard\""));
    }

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
    }
}
