use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::SecurityHeaders;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_SITE_URL: &str = "http://localhost:8000";
const DEFAULT_FROM_EMAIL: &str = "noreply@eventplanner.com";
const DEFAULT_DB_MEDIA_LOCATION: &str = "uploads";
const DEFAULT_SMTP_PORT: u16 = 587;
const TEMP_MEDIA_DIR: &str = "eventplanner-media";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    FileSystem,
    Database,
}

impl FromStr for StorageBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "filesystem" | "fs" | "local" => Ok(Self::FileSystem),
            "database" | "db" => Ok(Self::Database),
            other => Err(format!("unknown media storage backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub backend: StorageBackendKind,
    /// `MEDIA_ROOT`
    pub root: Option<PathBuf>,
    /// `PERSISTENT_DISK_PATH`, a mounted volume supplied by the platform.
    pub disk_root: Option<PathBuf>,
    pub db_location: String,
}

impl MediaConfig {
    /// Candidate media directories in probing order.
    pub fn root_candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if let Some(root) = &self.root {
            candidates.push(root.clone());
        }
        if let Some(disk) = &self.disk_root {
            candidates.push(disk.join("media"));
        }
        candidates.push(env::temp_dir().join(TEMP_MEDIA_DIR));
        candidates
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    /// Absolute base used for links in outgoing email.
    pub site_url: String,
    pub cors_allowed_origins: Option<String>,
    pub production: bool,
    pub media: MediaConfig,
    pub mail: MailConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let port = parsed("PORT").unwrap_or(DEFAULT_PORT);

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/eventplanner".to_string()),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            site_url: env::var("SITE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_SITE_URL.to_string()),
            cors_allowed_origins: non_empty("CORS_ALLOWED_ORIGINS"),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            media: MediaConfig {
                backend: parsed("MEDIA_STORAGE").unwrap_or(StorageBackendKind::FileSystem),
                root: non_empty("MEDIA_ROOT").map(PathBuf::from),
                disk_root: non_empty("PERSISTENT_DISK_PATH").map(PathBuf::from),
                db_location: non_empty("DB_MEDIA_LOCATION")
                    .unwrap_or_else(|| DEFAULT_DB_MEDIA_LOCATION.to_string()),
            },
            mail: MailConfig {
                smtp_host: non_empty("SMTP_HOST"),
                smtp_port: parsed("SMTP_PORT").unwrap_or(DEFAULT_SMTP_PORT),
                smtp_username: non_empty("SMTP_USERNAME"),
                smtp_password: non_empty("SMTP_PASSWORD"),
                from_address: non_empty("DEFAULT_FROM_EMAIL")
                    .unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
            },
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = non_empty(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Config: ignoring invalid {}='{}': {}", key, raw, e);
            None
        }
    }
}
