//! Configuration module for paywatch-server.
//!
//! Handles loading configuration from TOML files and CLI arguments,
//! validating watches into [`NetworkConfig`]s, and hashing the admin secret.

pub mod file;

use crate::config::file::{FileConfig, HeadSourceSetting, WatchConfig};
use argon2::{Argon2, PasswordHash, PasswordVerifier};
use paywatch_core::config::{HeadSourceKind, NetworkConfig};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("watch {name}: {source}")]
    InvalidWatch {
        name: String,
        #[source]
        source: paywatch_core::config::ConfigError,
    },

    #[error("password hashing error: {0}")]
    HashError(String),
}

/// Listener settings. Only read at startup.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: SocketAddr,
}

/// Admin API credentials.
#[derive(Debug, Clone)]
pub struct AdminSettings {
    secret_hash: String,
}

impl AdminSettings {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Check a plaintext secret against the stored argon2 hash.
    pub fn verify(&self, plaintext: &str) -> bool {
        let Ok(hash) = PasswordHash::new(&self.secret_hash) else {
            tracing::error!("Stored admin secret hash is malformed");
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &hash)
            .is_ok()
    }
}

/// Where and how transfer webhooks are delivered.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub webhook_url: Url,
    secret: Box<[u8]>,
}

impl LedgerSettings {
    pub fn new(webhook_url: Url, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            webhook_url,
            secret: secret.into().into_boxed_slice(),
        }
    }

    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerSettings,
    pub admin: AdminSettings,
    pub ledger: LedgerSettings,
    pub watches: Vec<NetworkConfig>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate every watch
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        // Validate before touching the file on disk.
        let watches = build_watches(&file_config.watches)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        Ok(LoadedConfig {
            server: ServerSettings {
                listen: file_config.server.listen,
            },
            admin: AdminSettings::new(secret_hash),
            ledger: LedgerSettings::new(
                file_config.ledger.webhook_url,
                file_config.ledger.secret.into_bytes(),
            ),
            watches,
        })
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

pub(crate) fn hash_secret(plaintext: &str) -> Result<String, ConfigError> {
    use argon2::{
        PasswordHasher,
        password_hash::{SaltString, rand_core::OsRng},
    };

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ConfigError::HashError(e.to_string()))
}

/// Validate every `[[watches]]` entry and check that names are unique.
pub fn build_watches(watches: &[WatchConfig]) -> Result<Vec<NetworkConfig>, ConfigError> {
    let mut names = HashSet::new();
    let mut configs = Vec::with_capacity(watches.len());
    for watch in watches {
        let config = build_watch(watch)?;
        if !names.insert(config.name.clone()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate watch name {}",
                config.name
            )));
        }
        configs.push(config);
    }
    Ok(configs)
}

fn build_watch(watch: &WatchConfig) -> Result<NetworkConfig, ConfigError> {
    let network = watch.network;
    let label = watch
        .name
        .clone()
        .unwrap_or_else(|| format!("{network} watch"));
    let invalid = |reason: String| ConfigError::ValidationError(format!("{label}: {reason}"));

    let base = match (&watch.token, &watch.contract) {
        (Some(_), Some(_)) => {
            return Err(invalid(
                "`token` and `contract` are mutually exclusive".to_string(),
            ));
        }
        (Some(coin), None) => {
            if watch.decimals.is_some() || watch.symbol.is_some() {
                return Err(invalid(
                    "`decimals` and `symbol` only apply to a custom `contract`".to_string(),
                ));
            }
            let preset = coin
                .contract(network)
                .ok_or_else(|| invalid(format!("no known {} contract on {network}", coin.symbol())))?;
            let name = watch_name(watch, coin.symbol());
            NetworkConfig::token(
                name.as_str(),
                network,
                watch.endpoint.clone(),
                &watch.recipient,
                coin.symbol(),
                preset.address,
                preset.decimals,
            )
            .map_err(|source| ConfigError::InvalidWatch { name, source })?
        }
        (None, Some(contract)) => {
            let decimals = watch
                .decimals
                .ok_or_else(|| invalid("`contract` requires `decimals`".to_string()))?;
            let symbol = watch
                .symbol
                .as_deref()
                .ok_or_else(|| invalid("`contract` requires `symbol`".to_string()))?;
            let name = watch_name(watch, symbol);
            NetworkConfig::token(
                name.as_str(),
                network,
                watch.endpoint.clone(),
                &watch.recipient,
                symbol,
                contract,
                decimals,
            )
            .map_err(|source| ConfigError::InvalidWatch { name, source })?
        }
        (None, None) => {
            if watch.decimals.is_some() || watch.symbol.is_some() {
                return Err(invalid(
                    "`decimals` and `symbol` only apply to a custom `contract`".to_string(),
                ));
            }
            let name = watch_name(watch, network.native_symbol());
            NetworkConfig::native(
                name.as_str(),
                network,
                watch.endpoint.clone(),
                &watch.recipient,
            )
            .map_err(|source| ConfigError::InvalidWatch { name, source })?
        }
    };

    let name = base.name.to_string();
    let wrap = |source: paywatch_core::config::ConfigError| ConfigError::InvalidWatch {
        name: name.clone(),
        source,
    };

    let mut config = base;
    if let Some(confirmations) = watch.required_confirmations {
        config = config.with_required_confirmations(confirmations).map_err(wrap)?;
    }
    if watch.poll_interval_secs.is_some() || watch.check_interval_secs.is_some() {
        let poll = watch
            .poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(config.poll_interval);
        let check = watch
            .check_interval_secs
            .map(Duration::from_secs)
            .unwrap_or(config.check_interval);
        config = config.with_intervals(poll, check).map_err(wrap)?;
    }
    if let Some(blocks) = watch.max_blocks_per_poll {
        config = config.with_max_blocks_per_poll(blocks).map_err(wrap)?;
    }

    let head_source = match (watch.head_source, &watch.ws_endpoint) {
        (HeadSourceSetting::Polling, _) => HeadSourceKind::Polling,
        (HeadSourceSetting::Subscription, Some(ws_endpoint)) => HeadSourceKind::Subscription {
            ws_endpoint: ws_endpoint.clone(),
        },
        (HeadSourceSetting::Subscription, None) => {
            return Err(invalid(
                "`head_source = \"subscription\"` requires `ws_endpoint`".to_string(),
            ));
        }
    };
    Ok(config.with_head_source(head_source))
}

fn watch_name(watch: &WatchConfig, symbol: &str) -> String {
    match &watch.name {
        Some(name) => name.clone(),
        None => format!("{}-{}", watch.network, symbol.to_lowercase()),
    }
}
