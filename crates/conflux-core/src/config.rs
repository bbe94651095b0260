use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8780;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Top-level config (conflux.toml + CONFLUX_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluxConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub media_engine: MediaEngineConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub files: FilesConfig,
}

impl Default for ConfluxConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            bus: BusConfig::default(),
            media_engine: MediaEngineConfig::default(),
            auth: AuthConfig::default(),
            files: FilesConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Verification mode for inbound bearer tokens. `Static` is the single-token
/// bring-up mode; `Jwt` verifies tokens issued by an external identity system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Static,
    Jwt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_mode")]
    pub mode: AuthMode,
    pub token: Option<String>,
    pub jwt_secret: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: default_auth_mode(),
            token: Some("change-me".to_string()),
            jwt_secret: None,
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_outbox_retry_secs")]
    pub outbox_retry_interval_secs: u64,
    #[serde(default = "default_outbox_max_attempts")]
    pub outbox_max_attempts: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            outbox_retry_interval_secs: default_outbox_retry_secs(),
            outbox_max_attempts: default_outbox_max_attempts(),
        }
    }
}

/// Connection settings for the line-protocol media engine driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEngineConfig {
    #[serde(default = "default_media_engine_addr")]
    pub addr: String,
    #[serde(default = "default_media_engine_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for MediaEngineConfig {
    fn default() -> Self {
        Self {
            addr: default_media_engine_addr(),
            connect_timeout_ms: default_media_engine_connect_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_storage_root")]
    pub storage_root: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_auth_mode() -> AuthMode {
    AuthMode::Static
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_outbox_retry_secs() -> u64 {
    5
}
fn default_outbox_max_attempts() -> u32 {
    10
}
fn default_media_engine_addr() -> String {
    "127.0.0.1:9100".to_string()
}
fn default_media_engine_connect_timeout_ms() -> u64 {
    5_000
}
fn default_storage_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.conflux/files")
}
fn default_max_upload_bytes() -> u64 {
    100 * 1024 * 1024
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.conflux/conflux.db")
}

impl ConfluxConfig {
    /// Load config from a TOML file with CONFLUX_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. CONFLUX_CONFIG env var
    ///   3. ~/.conflux/conflux.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("CONFLUX_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: ConfluxConfig = Figment::from(figment::providers::Serialized::defaults(
            ConfluxConfig::default(),
        ))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("CONFLUX_").split("__"))
        .extract()
        .map_err(|e| crate::error::ConfluxError::InvalidArgument(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.conflux/conflux.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_static_auth_mode() {
        let cfg = ConfluxConfig::default();
        assert_eq!(cfg.auth.mode, AuthMode::Static);
        assert_eq!(cfg.server.port, DEFAULT_PORT);
    }
}
