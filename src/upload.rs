//! 上传处理器：暂存文件、转发到远端目录并清理。

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Extension, Multipart};
use axum::response::{Json as JsonResponse, Redirect};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{RelayConfig, UPLOAD_FIELD_NAME};
use crate::dashboard::Flash;
use crate::error::ApiError;
use crate::remote::{RemoteError, RemoteSession, resolve_folder};
use crate::session::SessionManager;
use crate::staging::{StagedFile, Staging};

#[derive(Serialize, Debug)]
pub struct UploadReceipt {
    pub status: &'static str,
    pub message: String,
    pub filename: String,
    pub remote_folder: String,
}

/// API 上传接口：返回 JSON 结果。
pub async fn upload_file(
    Extension(config): Extension<Arc<RelayConfig>>,
    Extension(sessions): Extension<Arc<SessionManager>>,
    Extension(staging): Extension<Arc<Staging>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<JsonResponse<UploadReceipt>, ApiError> {
    let receipt = relay_upload(&config, &sessions, &staging, multipart?).await?;
    Ok(JsonResponse(receipt))
}

/// 仪表盘上传接口：结果通过重定向的提示消息返回。
pub async fn upload_via_dashboard(
    Extension(config): Extension<Arc<RelayConfig>>,
    Extension(sessions): Extension<Arc<SessionManager>>,
    Extension(staging): Extension<Arc<Staging>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Redirect {
    let result = match multipart {
        Ok(multipart) => relay_upload(&config, &sessions, &staging, multipart).await,
        Err(rejection) => Err(rejection.into()),
    };
    let flash = match result {
        Ok(receipt) => Flash::success(format!(
            "{} uploaded to {}",
            receipt.filename, receipt.remote_folder
        )),
        Err(err) => Flash::error(err.message()),
    };
    Redirect::to(&flash.location())
}

/// Reads the `file` field, stages it and forwards it to the remote folder.
///
/// The staged file is removed before this returns, whatever the outcome.
async fn relay_upload(
    config: &RelayConfig,
    sessions: &SessionManager,
    staging: &Staging,
    mut multipart: Multipart,
) -> Result<UploadReceipt, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD_NAME) {
            continue;
        }
        let Some(filename) = field.file_name().and_then(sanitize_file_name) else {
            return Err(ApiError::BadRequest("No selected file".into()));
        };

        let session = sessions.session().await?;
        let staged = staging.stage(field).await?;
        let outcome = forward(session.as_ref(), &staged, &filename, &config.folder_name).await;
        let bytes = staged.size();
        if let Err(err) = staged.discard().await {
            warn!(filename = %filename, error = %err, "failed to remove staged file");
        }

        if let Err(err) = outcome {
            warn!(filename = %filename, remote_folder = %config.folder_name, error = %err, "upload failed");
            return Err(err.into());
        }
        info!(filename = %filename, remote_folder = %config.folder_name, bytes, "file relayed");
        return Ok(UploadReceipt {
            status: "success",
            message: "File uploaded successfully to MEGA storage.".into(),
            filename,
            remote_folder: config.folder_name.clone(),
        });
    }

    Err(ApiError::BadRequest("No file part in the request".into()))
}

async fn forward(
    session: &dyn RemoteSession,
    staged: &StagedFile,
    filename: &str,
    folder_name: &str,
) -> Result<(), RemoteError> {
    let folder = resolve_folder(session, folder_name).await?;
    session.upload(staged.path(), filename, &folder).await
}

/// 只保留文件名的最后一段，去掉客户端附带的目录。
fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_client_directories() {
        assert_eq!(sanitize_file_name("a.txt").as_deref(), Some("a.txt"));
        assert_eq!(
            sanitize_file_name("C:\\Users\\me\\report.pdf").as_deref(),
            Some("report.pdf")
        );
        assert_eq!(
            sanitize_file_name("../../etc/passwd").as_deref(),
            Some("passwd")
        );
    }

    #[test]
    fn sanitize_rejects_empty_names() {
        assert_eq!(sanitize_file_name(""), None);
        assert_eq!(sanitize_file_name("   "), None);
        assert_eq!(sanitize_file_name("photos/"), None);
        assert_eq!(sanitize_file_name(".."), None);
    }
}
