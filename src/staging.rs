//! 上传文件的本地暂存：写入临时文件，请求结束时删除。

use axum::body::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const STAGED_SUFFIX: &str = ".part";

#[derive(Debug)]
pub enum StagingError {
    TooLarge(u64),
    Read(String),
    Io(io::Error),
}

impl fmt::Display for StagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StagingError::TooLarge(limit) => write!(f, "file exceeds {limit} bytes"),
            StagingError::Read(msg) => write!(f, "failed to read upload: {msg}"),
            StagingError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for StagingError {}

impl From<io::Error> for StagingError {
    fn from(err: io::Error) -> Self {
        StagingError::Io(err)
    }
}

/// Local directory holding uploads while they are forwarded.
#[derive(Clone, Debug)]
pub struct Staging {
    root: PathBuf,
    max_size: u64,
}

impl Staging {
    pub fn new(root: PathBuf, max_size: u64) -> Self {
        Self { root, max_size }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 将请求体流写入新的暂存文件。
    ///
    /// The on-disk name is random; the client's filename never reaches the
    /// local filesystem. On any error the partial file is removed before
    /// returning.
    pub async fn stage<S, E>(&self, body: S) -> Result<StagedFile, StagingError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: fmt::Display,
    {
        let mut body = std::pin::pin!(body);
        self.ensure_root().await?;
        let path = self
            .root
            .join(format!("{}{STAGED_SUFFIX}", Uuid::new_v4()));
        let mut staged = StagedFile {
            path,
            size: 0,
            removed: false,
        };
        let mut file = File::create(&staged.path).await?;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| StagingError::Read(err.to_string()))?;
            if chunk.is_empty() {
                continue;
            }
            staged.size += chunk.len() as u64;
            if self.max_size > 0 && staged.size > self.max_size {
                return Err(StagingError::TooLarge(self.max_size));
            }
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;

        debug!(path = ?staged.path, bytes = staged.size, "upload staged");
        Ok(staged)
    }
}

/// A staged upload. The file is deleted by [`StagedFile::discard`] or, failing
/// that, when the value is dropped.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    size: u64,
    removed: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 删除暂存文件。
    pub async fn discard(mut self) -> io::Result<()> {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path)
            && err.kind() != io::ErrorKind::NotFound
        {
            warn!(path = ?self.path, error = %err, "failed to remove staged file");
        }
    }
}

/// 清理过期的暂存文件（进程崩溃遗留）。
pub async fn sweep_stale(staging: &Staging, ttl: Duration) -> Result<usize, io::Error> {
    if ttl.is_zero() {
        return Ok(0);
    }
    if fs::metadata(staging.root_path()).await.is_err() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut removed = 0;
    let mut dir = fs::read_dir(staging.root_path()).await?;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(&STAGED_SUFFIX[1..]) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let age = match metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
        {
            Some(value) => value,
            None => continue,
        };
        if age >= ttl {
            if let Err(err) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %err, "failed to remove stale staged file");
            } else {
                info!(path = ?path, "removed stale staged file");
                removed += 1;
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use std::convert::Infallible;
    use tempfile::tempdir;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|part| Ok(Bytes::from_static(part.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn file_count(dir: &Path) -> usize {
        let mut count = 0;
        let mut entries = fs::read_dir(dir).await.expect("read dir");
        while entries.next_entry().await.expect("entry").is_some() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn stage_writes_body_and_discard_removes_it() {
        let temp = tempdir().expect("tempdir");
        let staging = Staging::new(temp.path().join("staging"), 0);

        let staged = staging.stage(chunks(&["hello ", "world"])).await.expect("stage");
        assert_eq!(staged.size(), 11);
        let contents = fs::read(staged.path()).await.expect("read staged");
        assert_eq!(contents, b"hello world");

        let path = staged.path().to_path_buf();
        staged.discard().await.expect("discard");
        assert!(fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn dropping_staged_file_removes_it() {
        let temp = tempdir().expect("tempdir");
        let staging = Staging::new(temp.path().to_path_buf(), 0);

        let staged = staging.stage(chunks(&["abc"])).await.expect("stage");
        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(fs::metadata(&path).await.is_err());
    }

    #[tokio::test]
    async fn oversized_upload_leaves_nothing_behind() {
        let temp = tempdir().expect("tempdir");
        let staging = Staging::new(temp.path().to_path_buf(), 4);

        let result = staging.stage(chunks(&["abc", "def"])).await;
        assert!(matches!(result, Err(StagingError::TooLarge(4))));
        assert_eq!(file_count(temp.path()).await, 0);
    }

    #[tokio::test]
    async fn broken_body_leaves_nothing_behind() {
        let temp = tempdir().expect("tempdir");
        let staging = Staging::new(temp.path().to_path_buf(), 0);
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err("connection closed"),
        ]);

        let result = staging.stage(body).await;
        assert!(matches!(result, Err(StagingError::Read(_))));
        assert_eq!(file_count(temp.path()).await, 0);
    }

    #[tokio::test]
    async fn sweep_removes_only_staged_files_past_ttl() {
        let temp = tempdir().expect("tempdir");
        let staging = Staging::new(temp.path().to_path_buf(), 0);
        let an_hour_ago = SystemTime::now() - Duration::from_secs(3600);
        let old = temp.path().join("old.part");
        std::fs::write(&old, b"x").expect("write old");
        std::fs::File::options()
            .write(true)
            .open(&old)
            .and_then(|file| file.set_modified(an_hour_ago))
            .expect("age old file");
        let other = temp.path().join("keep.txt");
        std::fs::write(&other, b"x").expect("write other");
        std::fs::File::options()
            .write(true)
            .open(&other)
            .and_then(|file| file.set_modified(an_hour_ago))
            .expect("age other file");

        let fresh = staging.stage(chunks(&["new"])).await.expect("stage");
        let removed = sweep_stale(&staging, Duration::from_secs(60))
            .await
            .expect("sweep");

        assert_eq!(removed, 1);
        assert!(fs::metadata(&old).await.is_err());
        assert!(fs::metadata(&other).await.is_ok());
        assert!(fs::metadata(fresh.path()).await.is_ok());
    }

    #[tokio::test]
    async fn sweep_is_disabled_with_zero_ttl() {
        let temp = tempdir().expect("tempdir");
        let staging = Staging::new(temp.path().to_path_buf(), 0);
        std::fs::write(temp.path().join("old.part"), b"x").expect("write old");

        let removed = sweep_stale(&staging, Duration::ZERO).await.expect("sweep");
        assert_eq!(removed, 0);
    }
}
