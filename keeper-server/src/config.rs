//! Server configuration: defaults, then an optional JSON file, then
//! `KEEPER_*` environment variables, then command-line overrides.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use rand::RngCore;
use serde::Deserialize;
use tracing::warn;

use crate::auth::DEFAULT_TOKEN_TTL;
use crate::store::StoreKind;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://keeper.db";
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_CONFIG: &str = "KEEPER_CONFIG";
const ENV_BIND_ADDRESS: &str = "KEEPER_BIND_ADDRESS";
const ENV_STORE: &str = "KEEPER_STORE";
const ENV_DATABASE_URL: &str = "KEEPER_DATABASE_URL";
const ENV_TOKEN_SECRET: &str = "KEEPER_TOKEN_SECRET";
const ENV_TOKEN_TTL_SECS: &str = "KEEPER_TOKEN_TTL_SECS";
const ENV_LOG_LEVEL: &str = "KEEPER_LOG_LEVEL";

#[derive(Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    pub store: StoreKind,
    pub database_url: String,
    pub token_secret: Option<String>,
    pub token_ttl: Duration,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreKind::default(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            token_secret: None,
            token_ttl: DEFAULT_TOKEN_TTL,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_address", &self.bind_address)
            .field("store", &self.store)
            .field("database_url", &self.database_url)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("token_ttl", &self.token_ttl)
            .field("log_level", &self.log_level)
            .finish()
    }
}

/// Shape of the optional JSON config file. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_address: Option<String>,
    store: Option<StoreKind>,
    database_url: Option<String>,
    token_secret: Option<String>,
    token_ttl_secs: Option<u64>,
    log_level: Option<String>,
}

/// Values supplied on the command line; they win over every other source.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub bind: Option<String>,
    pub store: Option<StoreKind>,
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn load(overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolves the configuration reading variables through `env`.
    pub fn resolve(
        overrides: &ConfigOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let mut config = Self::default();

        let config_path = overrides
            .config_path
            .clone()
            .or_else(|| env(ENV_CONFIG).map(PathBuf::from));
        if let Some(path) = config_path {
            config.apply_file(read_file_config(&path)?)?;
        }

        if let Some(bind) = env(ENV_BIND_ADDRESS) {
            config.bind_address = parse_bind(&bind)?;
        }
        if let Some(store) = env(ENV_STORE) {
            config.store = store.parse().map_err(|err: String| anyhow!(err))?;
        }
        if let Some(url) = env(ENV_DATABASE_URL) {
            config.database_url = url;
        }
        if let Some(secret) = env(ENV_TOKEN_SECRET).filter(|value| !value.is_empty()) {
            config.token_secret = Some(secret);
        }
        if let Some(ttl) = env(ENV_TOKEN_TTL_SECS) {
            let secs: u64 = ttl
                .trim()
                .parse()
                .with_context(|| format!("{ENV_TOKEN_TTL_SECS} must be a number of seconds"))?;
            config.token_ttl = Duration::from_secs(secs);
        }
        if let Some(level) = env(ENV_LOG_LEVEL) {
            config.log_level = level;
        }

        if let Some(bind) = &overrides.bind {
            config.bind_address = parse_bind(bind)?;
        }
        if let Some(store) = overrides.store {
            config.store = store;
        }
        if let Some(url) = &overrides.database_url {
            config.database_url = url.clone();
        }

        if config.token_ttl.is_zero() {
            return Err(anyhow!("token ttl must be greater than zero"));
        }
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) -> anyhow::Result<()> {
        if let Some(bind) = file.bind_address {
            self.bind_address = parse_bind(&bind)?;
        }
        if let Some(store) = file.store {
            self.store = store;
        }
        if let Some(url) = file.database_url {
            self.database_url = url;
        }
        if let Some(secret) = file.token_secret {
            self.token_secret = Some(secret);
        }
        if let Some(secs) = file.token_ttl_secs {
            self.token_ttl = Duration::from_secs(secs);
        }
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        Ok(())
    }

    /// Signing key for session tokens. Without a configured secret a random
    /// one is generated, so tokens do not survive a restart.
    pub fn token_secret_bytes(&self) -> Vec<u8> {
        match &self.token_secret {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                warn!("no token secret configured; generated an ephemeral signing key");
                let mut secret = vec![0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                secret
            }
        }
    }
}

fn read_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn parse_bind(value: &str) -> anyhow::Result<SocketAddr> {
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid bind address `{value}`"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = ServerConfig::resolve(&ConfigOverrides::default(), env_from(&[])).unwrap();
        assert_eq!(config.bind_address.to_string(), DEFAULT_BIND_ADDRESS);
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.token_ttl, Duration::from_secs(3 * 60 * 60));
        assert!(config.token_secret.is_none());
    }

    #[test]
    fn file_then_env_then_flags() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keeper.json");
        std::fs::write(
            &path,
            r#"{"bind_address":"127.0.0.1:9000","database_url":"sqlite://file.db","token_ttl_secs":60,"log_level":"debug"}"#,
        )
        .unwrap();

        let overrides = ConfigOverrides {
            config_path: Some(path),
            bind: Some("127.0.0.1:9100".into()),
            ..ConfigOverrides::default()
        };
        let env = env_from(&[
            (ENV_DATABASE_URL, "sqlite://env.db"),
            (ENV_STORE, "memory"),
            (ENV_TOKEN_SECRET, "s3cret"),
        ]);
        let config = ServerConfig::resolve(&overrides, env).unwrap();

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9100");
        assert_eq!(config.database_url, "sqlite://env.db");
        assert_eq!(config.store, StoreKind::Memory);
        assert_eq!(config.token_ttl, Duration::from_secs(60));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.token_secret_bytes(), b"s3cret".to_vec());
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let overrides = ConfigOverrides {
            config_path: Some(PathBuf::from("/nonexistent/keeper.json")),
            ..ConfigOverrides::default()
        };
        let err = ServerConfig::resolve(&overrides, env_from(&[])).unwrap_err();
        assert!(format!("{err:#}").contains("failed to read config file"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let env = env_from(&[(ENV_TOKEN_TTL_SECS, "soon")]);
        assert!(ServerConfig::resolve(&ConfigOverrides::default(), env).is_err());

        let env = env_from(&[(ENV_STORE, "postgres")]);
        assert!(ServerConfig::resolve(&ConfigOverrides::default(), env).is_err());

        let env = env_from(&[(ENV_TOKEN_TTL_SECS, "0")]);
        assert!(ServerConfig::resolve(&ConfigOverrides::default(), env).is_err());
    }

    #[test]
    fn generated_secrets_are_random() {
        let config = ServerConfig::default();
        let first = config.token_secret_bytes();
        assert_eq!(first.len(), 32);
        assert_ne!(first, config.token_secret_bytes());
    }
}
