//! In-memory chain used by unit tests.

use crate::chain::hex::address_to_topic;
use crate::chain::{Block, ChainClient, ChainError, Log, LogFilter, Receipt, Transaction};
use crate::config::NetworkConfig;
use crate::entities::{CandidateTransfer, TransferStatus};
use crate::processors::detector::TRANSFER_EVENT_TOPIC;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use paywatch_sdk::objects::{Asset, Network};
use rust_decimal::Decimal;
use smallvec::smallvec;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use time::OffsetDateTime;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

pub(crate) const WATCHED: &str = "0x00000000000000000000000000000000000000ab";
pub(crate) const SENDER: &str = "0x00000000000000000000000000000000000000cd";
pub(crate) const OTHER: &str = "0x00000000000000000000000000000000000000ef";
pub(crate) const TOKEN: &str = "0x0000000000000000000000000000000000000d01";

pub(crate) const ONE_ETHER: u128 = 1_000_000_000_000_000_000;

pub(crate) fn tx_hash(n: u64) -> String {
    format!("0x{n:064x}")
}

pub(crate) fn native_config(required: u64) -> NetworkConfig {
    NetworkConfig::native(
        "eth-native",
        Network::Ethereum,
        Url::parse("http://localhost:8545").unwrap(),
        WATCHED,
    )
    .unwrap()
    .with_required_confirmations(required)
    .unwrap()
    .with_intervals(Duration::from_millis(10), Duration::from_millis(10))
    .unwrap()
}

pub(crate) fn token_config(required: u64) -> NetworkConfig {
    NetworkConfig::token(
        "eth-usdt",
        Network::Ethereum,
        Url::parse("http://localhost:8545").unwrap(),
        WATCHED,
        "USDT",
        TOKEN,
        6,
    )
    .unwrap()
    .with_required_confirmations(required)
    .unwrap()
    .with_intervals(Duration::from_millis(10), Duration::from_millis(10))
    .unwrap()
}

pub(crate) fn sample_transfer(hash: &str, block: u64) -> CandidateTransfer {
    let now = OffsetDateTime::now_utc();
    CandidateTransfer {
        watch: "eth-native".into(),
        network: Network::Ethereum,
        asset: Asset::Native {
            symbol: "ETH".into(),
        },
        tx_hash: hash.to_string(),
        log_index: None,
        from: SENDER.to_string(),
        to: WATCHED.to_string(),
        amount: Decimal::ONE,
        observed_block: block,
        first_seen_at: now,
        last_checked_at: now,
        confirmations: 1,
        status: TransferStatus::Pending,
    }
}

/// Poll `condition` for up to two seconds.
pub(crate) async fn eventually<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(condition(), "condition not met in time");
}

/// What a fake `newHeads` endpoint does on one accepted connection.
pub(crate) enum HeadsSession {
    /// Acknowledge the subscription, push these heads, then close.
    Close(Vec<u64>),
    /// Acknowledge the subscription, push these heads, then stay open.
    Hold(Vec<u64>),
}

/// Websocket endpoint that plays one session per accepted connection.
pub(crate) async fn spawn_heads_server(sessions: Vec<HeadsSession>) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for session in sessions {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                return;
            };
            // eth_subscribe request
            let _ = ws.next().await;
            let ack = r#"{"jsonrpc":"2.0","id":1,"result":"0x9c"}"#;
            let _ = ws.send(Message::Text(ack.to_string())).await;

            let (heads, hold) = match session {
                HeadsSession::Close(heads) => (heads, false),
                HeadsSession::Hold(heads) => (heads, true),
            };
            for head in heads {
                let notification = serde_json::json!({
                    "jsonrpc": "2.0",
                    "method": "eth_subscription",
                    "params": {
                        "subscription": "0x9c",
                        "result": { "number": format!("0x{head:x}") },
                    },
                });
                let _ = ws.send(Message::Text(notification.to_string())).await;
            }
            if hold {
                tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
            } else {
                let _ = ws.close(None).await;
            }
        }
    });
    Url::parse(&format!("ws://{addr}")).unwrap()
}

#[derive(Default)]
struct ChainState {
    height: u64,
    transactions: Vec<Transaction>,
    receipts: HashMap<String, Receipt>,
    logs: Vec<Log>,
    balances: HashMap<(String, Option<String>), u128>,
    failures: u32,
}

impl ChainState {
    fn fail_if_scheduled(&mut self) -> Result<(), ChainError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ChainError::Transient("injected failure".to_string()));
        }
        Ok(())
    }

    fn is_visible(&self, block: Option<u64>) -> bool {
        block.is_some_and(|b| b <= self.height)
    }
}

/// Mutable fake node. Objects added above the current height stay invisible
/// until the height reaches them.
pub(crate) struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new(height: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                height,
                ..ChainState::default()
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_height(&self, height: u64) {
        self.state().height = height;
    }

    /// Make the next `n` calls fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.state().failures = n;
    }

    pub fn add_native_tx(&self, block: u64, hash: &str, from: &str, to: &str, value: u128) {
        let mut state = self.state();
        state.transactions.push(Transaction {
            hash: hash.to_string(),
            from: from.to_string(),
            to: Some(to.to_string()),
            value,
            block_number: Some(block),
        });
        state.receipts.insert(
            hash.to_string(),
            Receipt {
                transaction_hash: hash.to_string(),
                block_number: block,
                status: Some(true),
                logs: Vec::new(),
            },
        );
    }

    /// Add a `Transfer(from, to, value)` log emitted by `contract` in
    /// transaction `hash`, creating the transaction on first use.
    #[allow(clippy::too_many_arguments)]
    pub fn add_token_transfer(
        &self,
        block: u64,
        hash: &str,
        contract: &str,
        from: &str,
        to: &str,
        value: u128,
        log_index: u64,
    ) {
        let log = Log {
            address: contract.to_string(),
            topics: smallvec![
                TRANSFER_EVENT_TOPIC.to_string(),
                address_to_topic(from).unwrap(),
                address_to_topic(to).unwrap(),
            ],
            data: format!("0x{value:064x}"),
            block_number: Some(block),
            transaction_hash: Some(hash.to_string()),
            log_index: Some(log_index),
            removed: false,
        };

        let mut state = self.state();
        if !state.transactions.iter().any(|tx| tx.hash == hash) {
            state.transactions.push(Transaction {
                hash: hash.to_string(),
                from: from.to_string(),
                to: Some(contract.to_string()),
                value: 0,
                block_number: Some(block),
            });
        }
        state
            .receipts
            .entry(hash.to_string())
            .or_insert_with(|| Receipt {
                transaction_hash: hash.to_string(),
                block_number: block,
                status: Some(true),
                logs: Vec::new(),
            })
            .logs
            .push(log.clone());
        state.logs.push(log);
    }

    /// Drop a transaction as a reorg would.
    pub fn remove_tx(&self, hash: &str) {
        let mut state = self.state();
        state.transactions.retain(|tx| tx.hash != hash);
        state.receipts.remove(hash);
        state
            .logs
            .retain(|log| log.transaction_hash.as_deref() != Some(hash));
    }

    /// Drop only the transaction body, leaving its logs queryable.
    pub fn hide_transaction(&self, hash: &str) {
        self.state().transactions.retain(|tx| tx.hash != hash);
    }

    /// Overwrite the data word of every log emitted by `hash`.
    pub fn corrupt_log_data(&self, hash: &str, data: &str) {
        let mut state = self.state();
        for log in state.logs.iter_mut() {
            if log.transaction_hash.as_deref() == Some(hash) {
                log.data = data.to_string();
            }
        }
    }

    pub fn logs_snapshot(&self) -> Vec<Log> {
        self.state().logs.clone()
    }

    pub fn set_receipt_status(&self, hash: &str, status: Option<bool>) {
        if let Some(receipt) = self.state().receipts.get_mut(hash) {
            receipt.status = status;
        }
    }

    pub fn set_balance(&self, address: &str, token: Option<&str>, raw: u128) {
        self.state()
            .balances
            .insert((address.to_string(), token.map(str::to_string)), raw);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn current_height(&self) -> Result<u64, ChainError> {
        let mut state = self.state();
        state.fail_if_scheduled()?;
        Ok(state.height)
    }

    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, ChainError> {
        let mut state = self.state();
        state.fail_if_scheduled()?;
        Ok(state
            .transactions
            .iter()
            .find(|tx| tx.hash == hash && state.is_visible(tx.block_number))
            .cloned())
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ChainError> {
        let mut state = self.state();
        state.fail_if_scheduled()?;
        Ok(state
            .receipts
            .get(hash)
            .filter(|receipt| state.is_visible(Some(receipt.block_number)))
            .cloned())
    }

    async fn block_with_transactions(&self, height: u64) -> Result<Option<Block>, ChainError> {
        let mut state = self.state();
        state.fail_if_scheduled()?;
        if height > state.height {
            return Ok(None);
        }
        Ok(Some(Block {
            number: height,
            hash: format!("0x{height:064x}"),
            timestamp: 1_700_000_000 + height * 12,
            transactions: state
                .transactions
                .iter()
                .filter(|tx| tx.block_number == Some(height))
                .cloned()
                .collect(),
        }))
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        let mut state = self.state();
        state.fail_if_scheduled()?;
        let to_block = filter.to_block.min(state.height);
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == filter.address)
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| b >= filter.from_block && b <= to_block)
            })
            .filter(|log| {
                filter.topics.iter().enumerate().all(|(i, topic)| match topic {
                    Some(topic) => log.topics.get(i) == Some(topic),
                    None => true,
                })
            })
            .cloned()
            .collect())
    }

    async fn balance_of(&self, address: &str, token: Option<&str>) -> Result<u128, ChainError> {
        let mut state = self.state();
        state.fail_if_scheduled()?;
        Ok(state
            .balances
            .get(&(address.to_string(), token.map(str::to_string)))
            .copied()
            .unwrap_or_default())
    }
}
