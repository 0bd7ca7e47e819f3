//! 远端会话管理：首次使用时登录，失败后按冷却时间重试。

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::remote::{Connector, RemoteSession};

#[derive(Debug, Clone)]
pub enum SessionError {
    MissingCredentials,
    LoginFailed(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::MissingCredentials => write!(f, "MEGA credentials are not configured"),
            SessionError::LoginFailed(reason) => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for SessionError {}

enum SessionState {
    Idle,
    Active(Arc<dyn RemoteSession>),
    Failed { at: Instant, error: SessionError },
}

/// Owns the process-wide remote session.
///
/// The first caller logs in; everyone after reuses the handle with no
/// freshness check. A failed login is remembered and reported to every caller
/// until `relogin_after` has passed, so a broken account is not hammered with
/// one login per request. With `relogin_after` unset the failure is final.
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    credentials: Option<Credentials>,
    relogin_after: Option<Duration>,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        credentials: Option<Credentials>,
        relogin_after: Option<Duration>,
    ) -> Self {
        Self {
            connector,
            credentials,
            relogin_after,
            state: Mutex::new(SessionState::Idle),
        }
    }

    /// 返回当前会话，必要时登录。
    pub async fn session(&self) -> Result<Arc<dyn RemoteSession>, SessionError> {
        let mut state = self.state.lock().await;
        match &*state {
            SessionState::Active(session) => return Ok(session.clone()),
            SessionState::Failed { at, error } if !self.may_retry(*at) => {
                return Err(error.clone());
            }
            _ => {}
        }

        match self.login().await {
            Ok(session) => {
                *state = SessionState::Active(session.clone());
                Ok(session)
            }
            Err(error) => {
                warn!(error = %error, "remote session unavailable");
                *state = SessionState::Failed {
                    at: Instant::now(),
                    error: error.clone(),
                };
                Err(error)
            }
        }
    }

    fn may_retry(&self, failed_at: Instant) -> bool {
        self.relogin_after
            .is_some_and(|cooldown| failed_at.elapsed() >= cooldown)
    }

    async fn login(&self) -> Result<Arc<dyn RemoteSession>, SessionError> {
        let Some(credentials) = &self.credentials else {
            return Err(SessionError::MissingCredentials);
        };
        info!(email = %credentials.email, "logging in to remote storage");
        self.connector
            .login(credentials)
            .await
            .map_err(|err| SessionError::LoginFailed(err.to_string()))
    }
}
