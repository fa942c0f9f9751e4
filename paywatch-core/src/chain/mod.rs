//! Chain client adapter.
//!
//! A thin read capability over one node: current height, blocks with
//! transactions, transactions, receipts, logs and balances. Every call is
//! network I/O and may fail with a transient error; "not there yet" is
//! reported as `Ok(None)` so callers can treat it as still pending.

pub mod heads;
pub mod hex;
pub mod rpc;

use async_trait::async_trait;
use smallvec::SmallVec;
use thiserror::Error;

pub use heads::{HeadSource, PollingHeads, SubscriptionHeads, head_source};
pub use rpc::JsonRpcClient;

/// Errors that can occur while talking to a node.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Timeout, rate limit, connection reset, 5xx. Retry on the next tick.
    #[error("transient node error: {0}")]
    Transient(String),

    /// The node does not know the requested block or object yet.
    #[error("not found: {0}")]
    NotFound(String),

    /// The node answered with something we cannot decode.
    #[error("malformed node response: {0}")]
    Malformed(String),

    /// Any other JSON-RPC error object.
    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transient(_))
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChainError::Malformed(e.to_string())
        } else {
            ChainError::Transient(e.to_string())
        }
    }
}

impl From<hex::HexError> for ChainError {
    fn from(e: hex::HexError) -> Self {
        ChainError::Malformed(e.to_string())
    }
}

/// A transaction body. Hashes and addresses are lowercase `0x` hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract creation.
    pub to: Option<String>,
    /// Value in the chain's base unit (wei).
    pub value: u128,
    /// `None` while the transaction sits in the mempool.
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: String,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

/// An emitted event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: String,
    pub topics: SmallVec<[String; 4]>,
    pub data: String,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<u64>,
    /// Set by the node when the log was dropped by a reorg.
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: u64,
    /// `Some(false)` for reverted transactions. Pre-Byzantium receipts carry
    /// no status.
    pub status: Option<bool>,
    pub logs: Vec<Log>,
}

/// `eth_getLogs` filter over an inclusive block range. `None` topics are
/// wildcards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: String,
    pub topics: [Option<String>; 3],
    pub from_block: u64,
    pub to_block: u64,
}

/// Read API of one node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Height of the latest block.
    async fn current_height(&self) -> Result<u64, ChainError>;

    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, ChainError>;

    /// `None` until the transaction is mined.
    async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ChainError>;

    /// `None` when the node has not seen a block at `height` yet.
    async fn block_with_transactions(&self, height: u64) -> Result<Option<Block>, ChainError>;

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError>;

    /// Raw balance in base units; `token` is an ERC-20 contract address,
    /// `None` for the native currency.
    async fn balance_of(&self, address: &str, token: Option<&str>) -> Result<u128, ChainError>;
}
