//! Validated runtime configuration for a single watch.
//!
//! File parsing lives in the server crate; this module only holds the
//! immutable, already-validated [`NetworkConfig`] every monitor is built
//! from, plus the reloadable [`ConfigStore`].

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use crate::chain::hex::{HexError, normalize_address};
use compact_str::CompactString;
use paywatch_sdk::objects::{Asset, Network};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Largest decimal precision a `rust_decimal::Decimal` can represent.
pub const MAX_TOKEN_DECIMALS: u32 = 28;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_MAX_BLOCKS_PER_POLL: u64 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: HexError,
    },
    #[error("token decimals {0} exceed the supported maximum of 28")]
    UnsupportedDecimals(u32),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// How the watch loop learns about new blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadSourceKind {
    /// Poll `eth_blockNumber` every poll interval.
    Polling,
    /// Websocket `newHeads` subscription.
    Subscription { ws_endpoint: Url },
}

/// Everything one payment monitor needs. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Unique watch name, e.g. `eth-usdt`.
    pub name: CompactString,
    pub network: Network,
    pub endpoint: Url,
    /// Native currency or a token contract (absent contract ⇒ native mode).
    pub asset: Asset,
    /// Watched recipient, lowercase.
    pub recipient: String,
    pub required_confirmations: u64,
    pub poll_interval: Duration,
    pub check_interval: Duration,
    pub max_blocks_per_poll: u64,
    pub head_source: HeadSourceKind,
}

impl NetworkConfig {
    /// Native-currency watch with network defaults.
    pub fn native(
        name: impl Into<CompactString>,
        network: Network,
        endpoint: Url,
        recipient: &str,
    ) -> Result<Self, ConfigError> {
        let asset = Asset::Native {
            symbol: network.native_symbol().into(),
        };
        Self::build(name.into(), network, endpoint, asset, recipient)
    }

    /// Token watch with network defaults.
    pub fn token(
        name: impl Into<CompactString>,
        network: Network,
        endpoint: Url,
        recipient: &str,
        symbol: impl Into<CompactString>,
        contract: &str,
        decimals: u32,
    ) -> Result<Self, ConfigError> {
        if decimals > MAX_TOKEN_DECIMALS {
            return Err(ConfigError::UnsupportedDecimals(decimals));
        }
        let asset = Asset::Token {
            symbol: symbol.into(),
            contract: checked_address(contract)?.into(),
            decimals,
        };
        Self::build(name.into(), network, endpoint, asset, recipient)
    }

    fn build(
        name: CompactString,
        network: Network,
        endpoint: Url,
        asset: Asset,
        recipient: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name,
            network,
            endpoint,
            asset,
            recipient: checked_address(recipient)?,
            required_confirmations: network.default_confirmations(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            check_interval: DEFAULT_CHECK_INTERVAL,
            max_blocks_per_poll: DEFAULT_MAX_BLOCKS_PER_POLL,
            head_source: HeadSourceKind::Polling,
        })
    }

    pub fn with_required_confirmations(mut self, confirmations: u64) -> Result<Self, ConfigError> {
        if confirmations == 0 {
            return Err(ConfigError::Zero("required_confirmations"));
        }
        self.required_confirmations = confirmations;
        Ok(self)
    }

    pub fn with_intervals(mut self, poll: Duration, check: Duration) -> Result<Self, ConfigError> {
        if poll.is_zero() {
            return Err(ConfigError::Zero("poll_interval"));
        }
        if check.is_zero() {
            return Err(ConfigError::Zero("check_interval"));
        }
        self.poll_interval = poll;
        self.check_interval = check;
        Ok(self)
    }

    pub fn with_max_blocks_per_poll(mut self, blocks: u64) -> Result<Self, ConfigError> {
        if blocks == 0 {
            return Err(ConfigError::Zero("max_blocks_per_poll"));
        }
        self.max_blocks_per_poll = blocks;
        Ok(self)
    }

    pub fn with_head_source(mut self, head_source: HeadSourceKind) -> Self {
        self.head_source = head_source;
        self
    }

    /// Token contract in token mode, `None` in native mode.
    pub fn token_contract(&self) -> Option<&str> {
        match &self.asset {
            Asset::Token { contract, .. } => Some(contract),
            Asset::Native { .. } => None,
        }
    }

    /// Decimal precision of the watched asset.
    pub fn decimals(&self) -> u32 {
        match &self.asset {
            Asset::Token { decimals, .. } => *decimals,
            Asset::Native { .. } => self.network.native_decimals(),
        }
    }
}

fn checked_address(address: &str) -> Result<String, ConfigError> {
    normalize_address(address).map_err(|source| ConfigError::InvalidAddress {
        address: address.to_string(),
        source,
    })
}
