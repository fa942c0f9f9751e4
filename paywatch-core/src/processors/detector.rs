//! TransferDetector processor.
//!
//! The TransferDetector is responsible for:
//! - Scanning a block range for value moving into the watched address
//! - Native mode: walking full blocks and matching `to` / `value`
//! - Token mode: querying `Transfer` logs of the configured contract with
//!   the recipient topic pinned, then making sure each parent transaction
//!   is visible
//! - Reporting how far the range was actually processed, so the caller's
//!   cursor never skips a block that was not fully seen
//!
//! Deduplication by `tx_hash` belongs to the confirmation tracker.

use crate::chain::hex::{HexError, address_to_topic, parse_word_u128, topic_to_address};
use crate::chain::{ChainClient, ChainError, Log, LogFilter};
use crate::config::NetworkConfig;
use crate::entities::{CandidateTransfer, TransferStatus};
use crate::processors::tracker::confirmations_at;
use crate::utils::units::{AmountError, to_display_amount};
use itertools::Itertools;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

/// `keccak256("Transfer(address,address,uint256)")`.
pub const TRANSFER_EVENT_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}

/// Why a log could not be turned into a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("not a Transfer event")]
    NotATransfer,
    #[error("expected 3 topics, got {0}")]
    MissingTopics(usize),
    #[error("bad indexed address: {0}")]
    Address(HexError),
    #[error("bad transfer value: {0}")]
    Value(HexError),
    #[error("log is not attached to a mined transaction")]
    Unmined,
    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// A decoded ERC-20 `Transfer` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub from: String,
    pub to: String,
    pub value: u128,
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: Option<u64>,
}

/// Decode `Transfer(address indexed from, address indexed to, uint256 value)`.
pub fn decode_transfer_log(log: &Log) -> Result<DecodedTransfer, DecodeError> {
    if log.topics.len() < 3 {
        return Err(DecodeError::MissingTopics(log.topics.len()));
    }
    if !log.topics[0].eq_ignore_ascii_case(TRANSFER_EVENT_TOPIC) {
        return Err(DecodeError::NotATransfer);
    }
    let from = topic_to_address(&log.topics[1]).map_err(DecodeError::Address)?;
    let to = topic_to_address(&log.topics[2]).map_err(DecodeError::Address)?;
    let value = parse_word_u128(&log.data).map_err(DecodeError::Value)?;
    let (Some(tx_hash), Some(block_number)) = (&log.transaction_hash, log.block_number) else {
        return Err(DecodeError::Unmined);
    };
    Ok(DecodedTransfer {
        from,
        to,
        value,
        tx_hash: tx_hash.to_ascii_lowercase(),
        block_number,
        log_index: log.log_index,
    })
}

/// Qualifying logs of one transaction folded into a single movement.
///
/// Amounts are summed; `from` and `log_index` come from the first log.
/// Logs that fail to decode, were removed by a reorg, come from another
/// contract or pay someone else are ignored.
pub(crate) fn fold_transfer_logs<'a>(
    logs: impl IntoIterator<Item = &'a Log>,
    contract: &str,
    recipient: &str,
) -> Result<Option<DecodedTransfer>, DecodeError> {
    let mut folded: Option<DecodedTransfer> = None;
    for log in logs {
        if log.removed || !log.address.eq_ignore_ascii_case(contract) {
            continue;
        }
        let decoded = match decode_transfer_log(log) {
            Ok(decoded) => decoded,
            Err(DecodeError::NotATransfer) => continue,
            Err(e) => {
                warn!(tx_hash = ?log.transaction_hash, error = %e, "Skipping malformed Transfer log");
                continue;
            }
        };
        if decoded.to != recipient {
            continue;
        }
        match folded.as_mut() {
            None => folded = Some(decoded),
            Some(total) => {
                total.value = total
                    .value
                    .checked_add(decoded.value)
                    .ok_or(AmountError::TooLarge(u128::MAX))?;
            }
        }
    }
    Ok(folded)
}

/// Result of scanning `[from, to]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    /// Candidates in block order, then transaction order.
    pub transfers: Vec<CandidateTransfer>,
    /// First height that still has to be scanned.
    pub next_height: u64,
}

pub struct TransferDetector {
    config: Arc<NetworkConfig>,
    client: Arc<dyn ChainClient>,
}

impl TransferDetector {
    pub fn new(config: Arc<NetworkConfig>, client: Arc<dyn ChainClient>) -> Self {
        Self { config, client }
    }

    /// Scan the inclusive range `[from, to]`.
    ///
    /// A block the node cannot serve yet ends the scan early. An error after
    /// some progress is logged and the partial result returned; an error
    /// before any progress is returned as `Err`.
    ///
    /// Candidates carry their depth as of the last block actually scanned.
    pub async fn scan(&self, from: u64, to: u64) -> Result<Scan, DetectError> {
        let mut scan = match self.config.token_contract() {
            None => self.scan_native(from, to).await?,
            Some(contract) => self.scan_token(contract, from, to).await?,
        };
        if let Some(scanned_to) = scan.next_height.checked_sub(1) {
            for transfer in scan.transfers.iter_mut() {
                transfer.confirmations =
                    confirmations_at(transfer.observed_block, scanned_to).max(1);
            }
        }
        Ok(scan)
    }

    async fn scan_native(&self, from: u64, to: u64) -> Result<Scan, DetectError> {
        let mut transfers = Vec::new();
        let mut next_height = from;

        for height in from..=to {
            let block = match self.client.block_with_transactions(height).await {
                Ok(Some(block)) => block,
                Ok(None) => {
                    debug!(watch = %self.config.name, height, "Block not available yet");
                    break;
                }
                Err(e) if next_height > from => {
                    warn!(watch = %self.config.name, height, error = %e, "Block fetch failed, keeping partial scan");
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            for tx in &block.transactions {
                let pays_recipient = tx
                    .to
                    .as_deref()
                    .is_some_and(|to| to.eq_ignore_ascii_case(&self.config.recipient));
                if !pays_recipient || tx.value == 0 {
                    continue;
                }
                let amount = match to_display_amount(tx.value, self.config.decimals()) {
                    Ok(amount) => amount,
                    Err(e) => {
                        warn!(watch = %self.config.name, tx_hash = %tx.hash, error = %e, "Skipping undecodable native transfer");
                        continue;
                    }
                };
                transfers.push(self.candidate(
                    tx.hash.to_ascii_lowercase(),
                    None,
                    tx.from.to_ascii_lowercase(),
                    amount,
                    block.number,
                ));
            }
            next_height = height + 1;
        }

        Ok(Scan {
            transfers,
            next_height,
        })
    }

    async fn scan_token(&self, contract: &str, from: u64, to: u64) -> Result<Scan, DetectError> {
        // An empty log response cannot tell "no transfers" from "block not
        // served yet", so never query past what this node reports as its head.
        let served = self.client.current_height().await?;
        let to = to.min(served);
        if to < from {
            debug!(watch = %self.config.name, from, served, "Node has not served the range yet");
            return Ok(Scan {
                transfers: Vec::new(),
                next_height: from,
            });
        }

        let recipient_topic = address_to_topic(&self.config.recipient).map_err(ChainError::from)?;
        let filter = LogFilter {
            address: contract.to_string(),
            topics: [
                Some(TRANSFER_EVENT_TOPIC.to_string()),
                None,
                Some(recipient_topic),
            ],
            from_block: from,
            to_block: to,
        };
        let mut logs = self.client.logs(&filter).await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut transfers: Vec<CandidateTransfer> = Vec::new();
        let mut next_height = to + 1;

        let by_tx: Vec<(String, Vec<&Log>)> = logs
            .iter()
            .filter_map(|log| {
                let hash = log.transaction_hash.as_deref()?.to_ascii_lowercase();
                Some((hash, log))
            })
            .chunk_by(|(hash, _)| hash.clone())
            .into_iter()
            .map(|(hash, group)| (hash, group.map(|(_, log)| log).collect()))
            .collect();

        for (tx_hash, group) in by_tx {
            let folded = match fold_transfer_logs(group, contract, &self.config.recipient) {
                Ok(Some(folded)) => folded,
                Ok(None) => continue,
                Err(e) => {
                    warn!(watch = %self.config.name, %tx_hash, error = %e, "Skipping undecodable token transfer");
                    continue;
                }
            };
            let amount = match to_display_amount(folded.value, self.config.decimals()) {
                Ok(amount) => amount,
                Err(e) => {
                    warn!(watch = %self.config.name, %tx_hash, error = %e, "Skipping undecodable token transfer");
                    continue;
                }
            };

            // Only emit once the parent transaction is visible; otherwise
            // rescan from its block on the next tick.
            let visible = match self.client.transaction(&tx_hash).await {
                Ok(tx) => tx.is_some_and(|tx| tx.block_number.is_some()),
                Err(e) if folded.block_number > from => {
                    warn!(watch = %self.config.name, %tx_hash, error = %e, "Transaction fetch failed, keeping partial scan");
                    false
                }
                Err(e) => return Err(e.into()),
            };
            if !visible {
                debug!(watch = %self.config.name, %tx_hash, "Parent transaction not visible yet");
                next_height = folded.block_number;
                transfers.retain(|t| t.observed_block < next_height);
                break;
            }

            transfers.push(self.candidate(
                tx_hash,
                folded.log_index,
                folded.from,
                amount,
                folded.block_number,
            ));
        }

        Ok(Scan {
            transfers,
            next_height,
        })
    }

    fn candidate(
        &self,
        tx_hash: String,
        log_index: Option<u64>,
        from: String,
        amount: rust_decimal::Decimal,
        block: u64,
    ) -> CandidateTransfer {
        let now = OffsetDateTime::now_utc();
        CandidateTransfer {
            watch: self.config.name.clone(),
            network: self.config.network,
            asset: self.config.asset.clone(),
            tx_hash,
            log_index,
            from,
            to: self.config.recipient.clone(),
            amount,
            observed_block: block,
            first_seen_at: now,
            last_checked_at: now,
            confirmations: 1,
            status: TransferStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        MockChain, ONE_ETHER, OTHER, SENDER, TOKEN, WATCHED, native_config, token_config, tx_hash,
    };
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn detector(config: NetworkConfig, chain: Arc<MockChain>) -> TransferDetector {
        TransferDetector::new(Arc::new(config), chain)
    }

    #[tokio::test]
    async fn test_native_scan_matches_recipient() {
        let chain = Arc::new(MockChain::new(102));
        chain.add_native_tx(100, &tx_hash(1), SENDER, WATCHED, 10 * ONE_ETHER);
        chain.add_native_tx(100, &tx_hash(2), SENDER, OTHER, ONE_ETHER);
        chain.add_native_tx(101, &tx_hash(3), SENDER, WATCHED, 0);
        chain.add_native_tx(
            102,
            &tx_hash(4),
            SENDER,
            &WATCHED.to_ascii_uppercase().replace("0X", "0x"),
            ONE_ETHER / 2,
        );

        let scan = detector(native_config(6), chain).scan(100, 102).await.unwrap();
        assert_eq!(scan.next_height, 103);
        let hashes: Vec<_> = scan.transfers.iter().map(|t| t.tx_hash.clone()).collect();
        assert_eq!(hashes, vec![tx_hash(1), tx_hash(4)]);
        assert_eq!(scan.transfers[0].amount, Decimal::from(10));
        assert_eq!(scan.transfers[0].observed_block, 100);
        assert_eq!(scan.transfers[1].amount, Decimal::from_str("0.5").unwrap());
    }

    #[tokio::test]
    async fn test_native_scan_stops_at_unavailable_block() {
        let chain = Arc::new(MockChain::new(100));
        chain.add_native_tx(100, &tx_hash(1), SENDER, WATCHED, ONE_ETHER);

        let scan = detector(native_config(6), chain).scan(99, 105).await.unwrap();
        assert_eq!(scan.next_height, 101);
        assert_eq!(scan.transfers.len(), 1);
    }

    #[tokio::test]
    async fn test_token_scan_waits_for_lagging_node() {
        // The head came from elsewhere; this node has only served block 10.
        let chain = Arc::new(MockChain::new(10));
        chain.add_token_transfer(11, &tx_hash(1), TOKEN, SENDER, WATCHED, 1_000_000, 0);
        let detector = detector(token_config(12), chain.clone());

        let scan = detector.scan(10, 12).await.unwrap();
        assert!(scan.transfers.is_empty());
        assert_eq!(scan.next_height, 11);

        let scan = detector.scan(11, 12).await.unwrap();
        assert!(scan.transfers.is_empty());
        assert_eq!(scan.next_height, 11);

        chain.set_height(12);
        let scan = detector.scan(11, 12).await.unwrap();
        assert_eq!(scan.next_height, 13);
        assert_eq!(scan.transfers.len(), 1);
        assert_eq!(scan.transfers[0].tx_hash, tx_hash(1));
    }

    #[tokio::test]
    async fn test_catch_up_candidates_carry_depth() {
        let chain = Arc::new(MockChain::new(110));
        chain.add_native_tx(100, &tx_hash(1), SENDER, WATCHED, ONE_ETHER);
        chain.add_native_tx(110, &tx_hash(2), SENDER, WATCHED, ONE_ETHER);

        let scan = detector(native_config(6), chain).scan(100, 110).await.unwrap();
        assert_eq!(scan.transfers[0].confirmations, 11);
        assert_eq!(scan.transfers[1].confirmations, 1);
        assert_eq!(scan.transfers[0].status, TransferStatus::Pending);

        let chain = Arc::new(MockChain::new(205));
        chain.add_token_transfer(200, &tx_hash(3), TOKEN, SENDER, WATCHED, 1_000_000, 0);
        let scan = detector(token_config(12), chain).scan(200, 205).await.unwrap();
        assert_eq!(scan.transfers[0].confirmations, 6);
    }

    #[tokio::test]
    async fn test_native_scan_error_without_progress() {
        let chain = Arc::new(MockChain::new(100));
        chain.fail_next(1);
        let result = detector(native_config(6), chain).scan(100, 100).await;
        assert!(matches!(result, Err(DetectError::Chain(ChainError::Transient(_)))));
    }

    #[tokio::test]
    async fn test_two_token_transfers_in_one_block() {
        let chain = Arc::new(MockChain::new(200));
        chain.add_token_transfer(200, &tx_hash(1), TOKEN, SENDER, WATCHED, 2_500_000, 0);
        chain.add_token_transfer(200, &tx_hash(2), TOKEN, OTHER, WATCHED, 1_000_000, 1);
        chain.add_token_transfer(200, &tx_hash(3), TOKEN, SENDER, OTHER, 9_000_000, 2);

        let scan = detector(token_config(12), chain).scan(200, 200).await.unwrap();
        assert_eq!(scan.next_height, 201);
        assert_eq!(scan.transfers.len(), 2);

        let first = &scan.transfers[0];
        assert_eq!(first.tx_hash, tx_hash(1));
        assert_eq!(first.from, SENDER);
        assert_eq!(first.amount, Decimal::from_str("2.5").unwrap());
        assert_eq!(first.log_index, Some(0));

        let second = &scan.transfers[1];
        assert_eq!(second.tx_hash, tx_hash(2));
        assert_eq!(second.from, OTHER);
        assert_eq!(second.amount, Decimal::ONE);
        assert_eq!(second.status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn test_multiple_logs_in_one_transaction_are_summed() {
        let chain = Arc::new(MockChain::new(50));
        chain.add_token_transfer(50, &tx_hash(7), TOKEN, SENDER, WATCHED, 1_000_000, 4);
        chain.add_token_transfer(50, &tx_hash(7), TOKEN, SENDER, WATCHED, 500_000, 5);

        let scan = detector(token_config(12), chain).scan(50, 50).await.unwrap();
        assert_eq!(scan.transfers.len(), 1);
        assert_eq!(scan.transfers[0].amount, Decimal::from_str("1.5").unwrap());
        assert_eq!(scan.transfers[0].log_index, Some(4));
    }

    #[tokio::test]
    async fn test_missing_parent_transaction_holds_cursor() {
        let chain = Arc::new(MockChain::new(60));
        chain.add_token_transfer(58, &tx_hash(1), TOKEN, SENDER, WATCHED, 1_000_000, 0);
        chain.add_token_transfer(59, &tx_hash(2), TOKEN, SENDER, WATCHED, 1_000_000, 0);
        chain.add_token_transfer(59, &tx_hash(3), TOKEN, SENDER, WATCHED, 1_000_000, 1);
        // The node serves the log but not its transaction yet.
        chain.hide_transaction(&tx_hash(2));

        let scan = detector(token_config(12), chain).scan(58, 60).await.unwrap();
        assert_eq!(scan.next_height, 59);
        let hashes: Vec<_> = scan.transfers.iter().map(|t| t.tx_hash.clone()).collect();
        assert_eq!(hashes, vec![tx_hash(1)]);
    }

    #[test]
    fn test_decode_rejects_malformed_logs() {
        let chain = MockChain::new(1);
        chain.add_token_transfer(1, &tx_hash(1), TOKEN, SENDER, WATCHED, 5, 0);
        let mut log = chain.logs_snapshot().remove(0);

        let decoded = decode_transfer_log(&log).unwrap();
        assert_eq!(decoded.to, WATCHED);
        assert_eq!(decoded.value, 5);

        log.data = "0x05".to_string();
        assert!(matches!(decode_transfer_log(&log), Err(DecodeError::Value(_))));

        log.topics.truncate(2);
        assert!(matches!(decode_transfer_log(&log), Err(DecodeError::MissingTopics(2))));
    }

    #[tokio::test]
    async fn test_malformed_log_is_skipped() {
        let chain = Arc::new(MockChain::new(10));
        chain.add_token_transfer(10, &tx_hash(1), TOKEN, SENDER, WATCHED, 1_000_000, 0);
        chain.add_token_transfer(10, &tx_hash(2), TOKEN, SENDER, WATCHED, 1_000_000, 1);
        chain.corrupt_log_data(&tx_hash(1), "0xzz");

        let scan = detector(token_config(12), chain).scan(10, 10).await.unwrap();
        let hashes: Vec<_> = scan.transfers.iter().map(|t| t.tx_hash.clone()).collect();
        assert_eq!(hashes, vec![tx_hash(2)]);
        assert_eq!(scan.next_height, 11);
    }
}
