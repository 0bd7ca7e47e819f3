//! CLI arguments and relay configuration defaults.

use clap::Parser;
use shadow_rs::formatcp;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::build;

const VERSION_INFO: &str = formatcp!(
    r#"{}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}"#,
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL
);

pub const API_KEY_HEADER: &str = "x-api-key";
pub const UPLOAD_FIELD_NAME: &str = "file";
pub const DEFAULT_FOLDER_NAME: &str = "Uploaded_Data";
pub const DEFAULT_PORT: u16 = 5000;
pub const STAGING_DIR_NAME: &str = "mega-relay";
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 1024 * 1024 * 1024;
pub const DEFAULT_RELOGIN_AFTER_SECS: u64 = 5 * 60;
pub const DEFAULT_STAGING_TTL_SECS: u64 = 60 * 60;
pub const STAGING_SWEEP_INTERVAL_SECS: u64 = 600;

/// CLI arguments and environment configuration for the relay.
#[derive(Parser, Debug)]
#[command(name = "mega-relay", version = VERSION_INFO, about = "MEGA upload relay")]
pub struct Args {
    #[arg(long, env = "MEGA_EMAIL", help = "MEGA account email")]
    pub mega_email: Option<String>,
    #[arg(
        long,
        env = "MEGA_PASSWORD",
        hide_env_values = true,
        help = "MEGA account password"
    )]
    pub mega_password: Option<String>,
    #[arg(
        short = 'f',
        long,
        env = "MEGA_FOLDER_NAME",
        default_value = DEFAULT_FOLDER_NAME,
        help = "Destination folder in the MEGA account"
    )]
    pub folder_name: String,
    #[arg(
        short = 'k',
        long,
        env = "RELAY_API_KEY",
        hide_env_values = true,
        help = "Shared secret expected in X-API-KEY (unset leaves /upload open)"
    )]
    pub api_key: Option<String>,
    #[arg(
        short = 'b',
        long,
        env = "RELAY_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        short = 's',
        long,
        env = "RELAY_STAGING_DIR",
        help = "Directory for staged uploads (defaults to the system temp dir)"
    )]
    pub staging_dir: Option<String>,
    #[arg(
        long,
        env = "RELAY_MAX_UPLOAD_SIZE",
        default_value_t = DEFAULT_MAX_UPLOAD_SIZE,
        help = "Max upload size in bytes (0 to disable)"
    )]
    pub max_upload_size: u64,
    #[arg(
        long,
        env = "RELAY_RELOGIN_AFTER_SECS",
        default_value_t = DEFAULT_RELOGIN_AFTER_SECS,
        help = "Seconds before retrying a failed MEGA login (0 to never retry)"
    )]
    pub relogin_after_secs: u64,
    #[arg(
        long,
        env = "RELAY_CONNECT_ON_START",
        default_value_t = false,
        help = "Log in to MEGA at startup instead of on the first request"
    )]
    pub connect_on_start: bool,
    #[arg(
        long,
        env = "RELAY_STAGING_TTL_SECS",
        default_value_t = DEFAULT_STAGING_TTL_SECS,
        help = "Remove staged files older than this many seconds (0 to disable)"
    )]
    pub staging_ttl_secs: u64,
    #[arg(long, env = "RELAY_CORS_ORIGINS", help = "Comma separated CORS origins")]
    pub cors_origins: Option<String>,
    #[arg(
        long,
        env = "MEGACMD_DIR",
        help = "Directory containing the MEGAcmd mega-* executables (defaults to PATH)"
    )]
    pub megacmd_dir: Option<String>,
}

/// MEGA account credentials.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Settings shared by the request handlers, built once at startup.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub credentials: Option<Credentials>,
    pub folder_name: String,
    pub api_key: Option<String>,
    pub staging_dir: PathBuf,
    pub max_upload_size: u64,
    pub relogin_after: Option<Duration>,
    pub staging_ttl: Duration,
    pub megacmd_dir: Option<PathBuf>,
}

impl RelayConfig {
    /// Builds the relay configuration from parsed arguments.
    ///
    /// Blank values count as unset so that an empty `RELAY_API_KEY=` does not
    /// turn into a secret that nobody can present.
    pub fn from_args(args: &Args) -> Self {
        let credentials = match (non_blank(&args.mega_email), non_blank(&args.mega_password)) {
            (Some(email), Some(password)) => Some(Credentials { email, password }),
            _ => None,
        };
        let staging_dir = non_blank(&args.staging_dir)
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join(STAGING_DIR_NAME));
        let folder_name = match args.folder_name.trim() {
            "" => DEFAULT_FOLDER_NAME.to_string(),
            name => name.to_string(),
        };
        Self {
            credentials,
            folder_name,
            api_key: non_blank(&args.api_key),
            staging_dir,
            max_upload_size: args.max_upload_size,
            relogin_after: match args.relogin_after_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            staging_ttl: Duration::from_secs(args.staging_ttl_secs),
            megacmd_dir: non_blank(&args.megacmd_dir).map(PathBuf::from),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
