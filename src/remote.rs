//! 远端存储账户的抽象：登录、目录查找/创建、上传与配额查询。

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::config::Credentials;

/// A folder in the remote account. `handle` is whatever the vendor client
/// addresses it by (a remote path for MEGAcmd).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteFolder {
    pub handle: String,
    pub name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StorageQuota {
    pub used: u64,
    pub total: u64,
}

#[derive(Debug)]
pub enum RemoteError {
    Login(String),
    Folder(String),
    Transfer(String),
    Quota(String),
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Login(msg) => write!(f, "login failed: {msg}"),
            RemoteError::Folder(msg) => write!(f, "folder lookup failed: {msg}"),
            RemoteError::Transfer(msg) => write!(f, "transfer failed: {msg}"),
            RemoteError::Quota(msg) => write!(f, "quota lookup failed: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Establishes authenticated sessions against the remote account.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn RemoteSession>, RemoteError>;
}

/// An authenticated handle to the remote account.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Finds a folder whose name matches `name` exactly.
    async fn find_folder(&self, name: &str) -> Result<Option<RemoteFolder>, RemoteError>;

    /// Creates a folder named `name` at the top of the account.
    async fn create_folder(&self, name: &str) -> Result<RemoteFolder, RemoteError>;

    /// Uploads the local file at `source` into `folder` under `name`.
    async fn upload(
        &self,
        source: &Path,
        name: &str,
        folder: &RemoteFolder,
    ) -> Result<(), RemoteError>;

    async fn storage_quota(&self) -> Result<StorageQuota, RemoteError>;
}

/// 按名称查找目标目录，不存在时创建。
pub async fn resolve_folder(
    session: &dyn RemoteSession,
    name: &str,
) -> Result<RemoteFolder, RemoteError> {
    if let Some(folder) = session.find_folder(name).await? {
        return Ok(folder);
    }
    tracing::info!(folder = name, "remote folder not found, creating it");
    session.create_folder(name).await
}
