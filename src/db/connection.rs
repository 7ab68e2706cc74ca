use anyhow::{Context, Result};
use postgres_native_tls::MakeTlsConnector;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use super::error::{StoreError, StoreResult};
use super::retry::RetryPolicy;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Connection settings for the PostgreSQL (server) engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    /// Accept invalid/self-signed certificates. Only honored for
    /// `Prefer`/`Require`.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Optional path to a custom CA certificate file (PEM format).
    #[serde(default)]
    pub ca_cert_path: Option<String>,
}

/// SSL/TLS connection modes for PostgreSQL.
///
/// These match the standard PostgreSQL sslmode parameter:
/// - `Disable`: No SSL (unencrypted)
/// - `Prefer`: Try SSL first, fall back to non-SSL (default)
/// - `Require`: Require SSL but don't verify certificate
/// - `VerifyCa`: Require SSL and verify the server certificate is signed by a trusted CA
/// - `VerifyFull`: Like VerifyCa, but also verify the server hostname matches the certificate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl ServerConfig {
    pub fn connection_string(&self) -> String {
        let sslmode = match self.ssl_mode {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        };
        format!(
            "host={} port={} dbname={} user={} password={} sslmode={} connect_timeout=10",
            quote_conn_value(&self.host),
            self.port,
            quote_conn_value(&self.database),
            quote_conn_value(&self.username),
            quote_conn_value(&self.password),
            sslmode
        )
    }

    pub fn display_string(&self) -> String {
        format!(
            "{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 5432,
            database: String::from("postgres"),
            username: String::from("postgres"),
            password: String::new(),
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
        }
    }
}

/// Which engine a store talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Client-server PostgreSQL.
    Server(ServerConfig),
    /// Single-file SQLite.
    Embedded {
        path: PathBuf,
        /// SQLite busy timeout. Zero hands lock contention straight to the
        /// retry policy.
        #[serde(default)]
        busy_timeout_ms: u64,
    },
}

impl BackendConfig {
    pub fn embedded(path: impl Into<PathBuf>) -> Self {
        BackendConfig::Embedded {
            path: path.into(),
            busy_timeout_ms: 0,
        }
    }

    pub fn display_string(&self) -> String {
        match self {
            BackendConfig::Server(server) => server.display_string(),
            BackendConfig::Embedded { path, .. } => format!("sqlite:{}", path.display()),
        }
    }
}

/// Everything needed to open a [`crate::Store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Record each statement and its result text.
    #[serde(default)]
    pub audit: bool,
}

impl StoreConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
            audit: false,
        }
    }
}

/// A named, saved [`StoreConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(flatten)]
    pub config: StoreConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SavedProfiles {
    #[serde(default)]
    profiles: Vec<Profile>,
}

pub fn profiles_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("flexstore")
        .join("connections.toml")
}

pub fn load_profiles_from(path: &Path) -> Result<Vec<Profile>> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profiles from {}", path.display()))?;
    let saved: SavedProfiles = toml::from_str(&content)
        .with_context(|| format!("Failed to parse profiles in {}", path.display()))?;
    Ok(saved.profiles)
}

pub fn save_profiles_to(path: &Path, profiles: &[Profile]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let saved = SavedProfiles {
        profiles: profiles.to_vec(),
    };
    let content = toml::to_string_pretty(&saved)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_profiles() -> Result<Vec<Profile>> {
    load_profiles_from(&profiles_path())
}

pub fn find_profile(name: &str) -> Result<Option<Profile>> {
    Ok(load_profiles()?
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(name)))
}

/// Open a fresh PostgreSQL client. The connection task ends when the
/// returned client is dropped.
pub async fn create_client(config: &ServerConfig) -> StoreResult<Client> {
    connect_server(config)
        .await
        .map_err(|e| StoreError::Connection(format!("{:#}", e)))
}

async fn connect_server(config: &ServerConfig) -> Result<Client> {
    let conn_string = config.connection_string();
    debug!(target = %config.display_string(), "connecting");

    let client = match config.ssl_mode {
        SslMode::Disable => {
            let (client, connection) =
                tokio::time::timeout(CONNECT_TIMEOUT, tokio_postgres::connect(&conn_string, NoTls))
                    .await
                    .map_err(|_| anyhow::anyhow!("Connection timed out after 15s"))?
                    .context("Failed to connect to PostgreSQL")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!("connection error: {}", e);
                }
            });
            client
        }
        SslMode::Prefer | SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            let strict = matches!(config.ssl_mode, SslMode::VerifyCa | SslMode::VerifyFull);
            let tls = build_tls_connector(config, strict)?;
            let (client, connection) =
                tokio::time::timeout(CONNECT_TIMEOUT, tokio_postgres::connect(&conn_string, tls))
                    .await
                    .map_err(|_| anyhow::anyhow!("Connection timed out after 15s"))?
                    .context("Failed to connect to PostgreSQL")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!("connection error: {}", e);
                }
            });
            client
        }
    };

    Ok(client)
}

/// Build a TLS connector. `strict_verify` ignores `accept_invalid_certs`.
fn build_tls_connector(config: &ServerConfig, strict_verify: bool) -> Result<MakeTlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();

    if config.accept_invalid_certs && !strict_verify {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    } else if let Some(ca_path) = &config.ca_cert_path {
        let ca_data = std::fs::read(ca_path)
            .with_context(|| format!("Failed to read CA certificate file: {}", ca_path))?;
        let cert = native_tls::Certificate::from_pem(&ca_data)
            .context("Failed to parse CA certificate")?;
        builder.add_root_certificate(cert);
    }

    let connector = builder.build().context("Failed to build TLS connector")?;

    Ok(MakeTlsConnector::new(connector))
}

/// Quote a value for use in a libpq key=value connection string.
/// Wraps in single quotes and escapes backslashes and single quotes.
fn quote_conn_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_quotes_values() {
        let config = ServerConfig {
            password: "it's secret".to_string(),
            ..ServerConfig::default()
        };
        let s = config.connection_string();
        assert!(s.contains("host='localhost'"));
        assert!(s.contains("port=5432"));
        assert!(s.contains("password='it\\'s secret'"));
        assert!(s.contains("sslmode=prefer"));
    }

    #[test]
    fn test_password_is_not_serialized() {
        let config = ServerConfig {
            password: "hunter2".to_string(),
            ..ServerConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert!(!text.contains("hunter2"));
    }

    #[test]
    fn test_profiles_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("connections.toml");
        let profiles = vec![
            Profile {
                name: "local".to_string(),
                config: StoreConfig::new(BackendConfig::Server(ServerConfig::default())),
            },
            Profile {
                name: "scratch".to_string(),
                config: StoreConfig {
                    audit: true,
                    ..StoreConfig::new(BackendConfig::embedded("/tmp/scratch.db"))
                },
            },
        ];
        save_profiles_to(&path, &profiles).unwrap();

        let loaded = load_profiles_from(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "local");
        assert!(matches!(loaded[0].config.backend, BackendConfig::Server(_)));
        assert!(loaded[1].config.audit);
        assert_eq!(loaded[1].config.retry, RetryPolicy::default());
        match &loaded[1].config.backend {
            BackendConfig::Embedded { path, .. } => assert_eq!(path, Path::new("/tmp/scratch.db")),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_missing_profiles_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_profiles_from(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_display_string() {
        assert_eq!(
            BackendConfig::Server(ServerConfig::default()).display_string(),
            "postgres@localhost:5432/postgres"
        );
        assert_eq!(
            BackendConfig::embedded("data.db").display_string(),
            "sqlite:data.db"
        );
    }
}
