//! 通过 MEGAcmd 命令行工具访问 MEGA 账户。
//!
//! MEGAcmd keeps the logged-in session in its own background server, so every
//! `mega-*` invocation after a successful `mega-login` acts on that account.

use async_trait::async_trait;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::Credentials;
use crate::remote::{Connector, RemoteError, RemoteFolder, RemoteSession, StorageQuota};

#[derive(Debug)]
enum CommandError {
    Spawn(String, std::io::Error),
    Failed(String, ExitStatus, String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Spawn(program, err) => write!(f, "could not run {program}: {err}"),
            CommandError::Failed(program, status, output) if output.is_empty() => {
                write!(f, "{program} exited with {status}")
            }
            CommandError::Failed(program, _, output) => write!(f, "{program}: {output}"),
        }
    }
}

/// Locates and runs the `mega-*` executables.
#[derive(Clone, Debug, Default)]
pub struct MegaCmd {
    bin_dir: Option<PathBuf>,
}

impl MegaCmd {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self { bin_dir }
    }

    fn program(&self, command: &str) -> PathBuf {
        let name = format!("mega-{command}");
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Runs `mega-<command>` and returns its stdout.
    async fn run<I, S>(&self, command: &str, args: I) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = self.program(command);
        let label = format!("mega-{command}");
        let output = Command::new(&program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| CommandError::Spawn(label.clone(), err))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => stdout.trim().to_string(),
                stderr => stderr.to_string(),
            };
            return Err(CommandError::Failed(label, output.status, message));
        }
        debug!(command = %label, "megacmd command finished");
        Ok(stdout)
    }
}

/// Connector that logs MEGAcmd in to the configured account.
pub struct MegaCmdConnector {
    cmd: MegaCmd,
}

impl MegaCmdConnector {
    pub fn new(cmd: MegaCmd) -> Self {
        Self { cmd }
    }
}

#[async_trait]
impl Connector for MegaCmdConnector {
    async fn login(&self, credentials: &Credentials) -> Result<Arc<dyn RemoteSession>, RemoteError> {
        let session: Arc<dyn RemoteSession> = Arc::new(MegaCmdSession {
            cmd: self.cmd.clone(),
        });

        // A MEGAcmd server left running from an earlier process may already
        // hold a session; mega-login refuses to run while one is active.
        match self.cmd.run("whoami", std::iter::empty::<&str>()).await {
            Ok(whoami) if whoami_matches(&whoami, &credentials.email) => {
                info!(email = %credentials.email, "reusing existing MEGAcmd session");
                return Ok(session);
            }
            Ok(_) => {
                info!("MEGAcmd holds a session for another account, logging out");
                self.cmd
                    .run("logout", std::iter::empty::<&str>())
                    .await
                    .map_err(|err| RemoteError::Login(err.to_string()))?;
            }
            Err(err) => debug!(error = %err, "no existing MEGAcmd session"),
        }

        self.cmd
            .run("login", [credentials.email.as_str(), credentials.password.as_str()])
            .await
            .map_err(|err| RemoteError::Login(err.to_string()))?;
        info!(email = %credentials.email, "logged in to MEGA");
        Ok(session)
    }
}

struct MegaCmdSession {
    cmd: MegaCmd,
}

#[async_trait]
impl RemoteSession for MegaCmdSession {
    async fn find_folder(&self, name: &str) -> Result<Option<RemoteFolder>, RemoteError> {
        let listing = self
            .cmd
            .run("ls", ["/"])
            .await
            .map_err(|err| RemoteError::Folder(err.to_string()))?;
        Ok(listing
            .lines()
            .map(str::trim_end)
            .any(|entry| entry.trim_end_matches('/') == name)
            .then(|| folder_at_root(name)))
    }

    async fn create_folder(&self, name: &str) -> Result<RemoteFolder, RemoteError> {
        let folder = folder_at_root(name);
        self.cmd
            .run("mkdir", ["-p", folder.handle.as_str()])
            .await
            .map_err(|err| RemoteError::Folder(err.to_string()))?;
        Ok(folder)
    }

    async fn upload(
        &self,
        source: &Path,
        name: &str,
        folder: &RemoteFolder,
    ) -> Result<(), RemoteError> {
        let target = format!("{}/{}", folder.handle.trim_end_matches('/'), name);
        debug!(name, remote_path = %target, "sending file to MEGA");
        self.cmd
            .run("put", [source.as_os_str(), OsStr::new(&target)])
            .await
            .map_err(|err| RemoteError::Transfer(err.to_string()))?;
        Ok(())
    }

    async fn storage_quota(&self) -> Result<StorageQuota, RemoteError> {
        let report = self
            .cmd
            .run("df", std::iter::empty::<&str>())
            .await
            .map_err(|err| RemoteError::Quota(err.to_string()))?;
        parse_storage_quota(&report)
            .ok_or_else(|| RemoteError::Quota("unrecognized mega-df output".into()))
    }
}

fn folder_at_root(name: &str) -> RemoteFolder {
    RemoteFolder {
        handle: format!("/{name}"),
        name: name.to_string(),
    }
}

fn whoami_matches(output: &str, email: &str) -> bool {
    output
        .split_whitespace()
        .any(|word| word.eq_ignore_ascii_case(email))
}

/// 解析 `mega-df` 的 `USED STORAGE:` 行，例如
/// `USED STORAGE:   1048576   0.00% of 21474836480`。
fn parse_storage_quota(report: &str) -> Option<StorageQuota> {
    let line = report
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("USED STORAGE:"))?;
    let rest = line.trim_start_matches("USED STORAGE:");
    let used = rest.split_whitespace().next()?.parse().ok()?;
    let total = rest
        .rsplit_once(" of ")
        .map(|(_, total)| total.trim())?
        .parse()
        .ok()?;
    Some(StorageQuota { used, total })
}
