//! TOML file configuration structures.
//!
//! These structs directly map to the `paywatch.toml` file format.

use paywatch_sdk::objects::{Network, Stablecoin};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub watches: Vec<WatchConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// The crediting ledger that receives transfer webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub webhook_url: Url,
    /// Shared HMAC secret used to sign webhook bodies.
    pub secret: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadSourceSetting {
    #[default]
    Polling,
    Subscription,
}

/// One `[[watches]]` entry: a (network, asset, recipient) triple.
///
/// The asset is either a `token` preset, a custom `contract` with
/// `decimals` and `symbol`, or the native currency when neither is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Defaults to `{network}-{symbol}`, lowercased.
    pub name: Option<String>,
    pub network: Network,
    /// JSON-RPC HTTP endpoint.
    pub endpoint: Url,
    pub recipient: String,
    pub token: Option<Stablecoin>,
    pub contract: Option<String>,
    pub decimals: Option<u32>,
    pub symbol: Option<String>,
    /// Defaults to the network preset.
    pub required_confirmations: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub check_interval_secs: Option<u64>,
    pub max_blocks_per_poll: Option<u64>,
    #[serde(default)]
    pub head_source: HeadSourceSetting,
    pub ws_endpoint: Option<Url>,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[admin]
secret = "test-secret"

[ledger]
webhook_url = "https://ledger.example.com/hooks/paywatch"
secret = "ledger-secret"

[[watches]]
name = "eth-usdt"
network = "eth"
endpoint = "https://eth.example/rpc"
recipient = "0x00000000000000000000000000000000000000ab"
token = "USDT"
required_confirmations = 6
head_source = "subscription"
ws_endpoint = "wss://eth.example/ws"

[[watches]]
network = "bsc"
endpoint = "https://bsc.example/rpc"
recipient = "0x00000000000000000000000000000000000000ab"
contract = "0x55d398326f99059ff775485246999027b3197955"
decimals = 18
symbol = "USDT"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.watches.len(), 2);
        assert!(!config.is_admin_secret_hashed());

        let eth = &config.watches[0];
        assert_eq!(eth.network, Network::Ethereum);
        assert_eq!(eth.token, Some(Stablecoin::Usdt));
        assert_eq!(eth.head_source, HeadSourceSetting::Subscription);

        let bsc = &config.watches[1];
        assert!(bsc.name.is_none());
        assert_eq!(bsc.decimals, Some(18));
        assert_eq!(bsc.head_source, HeadSourceSetting::Polling);
    }

    #[test]
    fn test_server_section_is_optional() {
        let toml_str = r#"
[admin]
secret = "$argon2id$v=19$m=19456,t=2,p=1$abc123"

[ledger]
webhook_url = "https://ledger.example.com/hooks/paywatch"
secret = "ledger-secret"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert!(config.watches.is_empty());
        assert!(config.is_admin_secret_hashed());
    }

    #[test]
    fn test_unknown_network_rejected() {
        let toml_str = r#"
[admin]
secret = "s"

[ledger]
webhook_url = "https://ledger.example.com/"
secret = "s"

[[watches]]
network = "tron"
endpoint = "https://tron.example/rpc"
recipient = "0x00000000000000000000000000000000000000ab"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
