use compact_str::CompactString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// All EVM networks Paywatch can watch.
pub enum Network {
    #[serde(rename = "eth")]
    Ethereum,
    #[serde(rename = "bsc")]
    BnbSmartChain,
    #[serde(rename = "polygon")]
    Polygon,
    #[serde(rename = "base")]
    Base,
    #[serde(rename = "arb")]
    ArbitrumOne,
    #[serde(rename = "op")]
    Optimism,
    #[serde(rename = "avaxc")]
    AvalancheC,
}

impl Network {
    /// EIP-155 chain id.
    pub fn chain_id(self) -> u64 {
        match self {
            Network::Ethereum => 1,
            Network::BnbSmartChain => 56,
            Network::Polygon => 137,
            Network::Base => 8453,
            Network::ArbitrumOne => 42161,
            Network::Optimism => 10,
            Network::AvalancheC => 43114,
        }
    }

    /// Confirmation depth used when a watch does not configure one.
    pub fn default_confirmations(self) -> u64 {
        match self {
            Network::Ethereum => 6,
            Network::BnbSmartChain => 15,
            Network::Polygon => 64,
            Network::Base | Network::ArbitrumOne | Network::Optimism | Network::AvalancheC => 12,
        }
    }

    /// Symbol of the base currency.
    pub fn native_symbol(self) -> &'static str {
        match self {
            Network::Ethereum
            | Network::Base
            | Network::ArbitrumOne
            | Network::Optimism => "ETH",
            Network::BnbSmartChain => "BNB",
            Network::Polygon => "POL",
            Network::AvalancheC => "AVAX",
        }
    }

    /// Every supported network uses 18 decimals for its base currency.
    pub fn native_decimals(self) -> u32 {
        18
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Network::Ethereum => "eth",
            Network::BnbSmartChain => "bsc",
            Network::Polygon => "polygon",
            Network::Base => "base",
            Network::ArbitrumOne => "arb",
            Network::Optimism => "op",
            Network::AvalancheC => "avaxc",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Stablecoins with a built-in contract table.
#[serde(rename_all = "UPPERCASE")]
pub enum Stablecoin {
    Usdc,
    Usdt,
    Dai,
}

/// Contract address and decimal precision of a token on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenContract {
    pub address: &'static str,
    pub decimals: u32,
}

impl Stablecoin {
    pub fn symbol(self) -> &'static str {
        match self {
            Stablecoin::Usdc => "USDC",
            Stablecoin::Usdt => "USDT",
            Stablecoin::Dai => "DAI",
        }
    }

    /// Canonical contract of this coin on `network`, if one is known.
    ///
    /// Decimals differ between deployments (BSC pegged tokens use 18).
    pub fn contract(self, network: Network) -> Option<TokenContract> {
        let (address, decimals) = match (self, network) {
            (Stablecoin::Usdt, Network::Ethereum) => ("0xdac17f958d2ee523a2206206994597c13d831ec7", 6),
            (Stablecoin::Usdt, Network::BnbSmartChain) => ("0x55d398326f99059ff775485246999027b3197955", 18),
            (Stablecoin::Usdt, Network::Polygon) => ("0xc2132d05d31c914a87c6611c10748aeb04b58e8f", 6),
            (Stablecoin::Usdt, Network::ArbitrumOne) => ("0xfd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9", 6),
            (Stablecoin::Usdt, Network::Optimism) => ("0x94b008aa00579c1307b0ef2c499ad98a8ce58e58", 6),
            (Stablecoin::Usdt, Network::AvalancheC) => ("0x9702230a8ea53601f5cd2dc00fdbc13d4df4a8c7", 6),
            (Stablecoin::Usdc, Network::Ethereum) => ("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 6),
            (Stablecoin::Usdc, Network::BnbSmartChain) => ("0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d", 18),
            (Stablecoin::Usdc, Network::Polygon) => ("0x3c499c542cef5e3811e1192ce70d8cc03d5c3359", 6),
            (Stablecoin::Usdc, Network::Base) => ("0x833589fcd6edb6e08f4c7c32d4f71b54bda02913", 6),
            (Stablecoin::Usdc, Network::ArbitrumOne) => ("0xaf88d065e77c8cc2239327c5edb3a432268e5831", 6),
            (Stablecoin::Usdc, Network::Optimism) => ("0x0b2c639c533813f4aa9d7837caf62653d097ff85", 6),
            (Stablecoin::Usdc, Network::AvalancheC) => ("0xb97ef9ef8734c71904d8002f8b6bc66dd9c48a6e", 6),
            (Stablecoin::Dai, Network::Ethereum) => ("0x6b175474e89094c44da98b954eedeac495271d0f", 18),
            _ => return None,
        };
        Some(TokenContract { address, decimals })
    }
}

/// The asset a watch tracks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Asset {
    /// The network's base currency.
    Native { symbol: CompactString },
    /// A fungible token identified by its contract address.
    Token {
        symbol: CompactString,
        contract: CompactString,
        decimals: u32,
    },
}

impl Asset {
    pub fn symbol(&self) -> &str {
        match self {
            Asset::Native { symbol } | Asset::Token { symbol, .. } => symbol,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native { .. })
    }
}
