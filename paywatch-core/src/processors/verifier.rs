//! ManualVerifier processor.
//!
//! On-demand, read-only lookup of one transaction hash against a watch.
//! Used for reconciliation ("I paid, where is my credit?"): it never
//! touches the tracker and never fires callbacks.

use crate::chain::hex::normalize_tx_hash;
use crate::chain::{ChainClient, ChainError};
use crate::config::NetworkConfig;
use crate::entities::{CandidateTransfer, TransferStatus};
use crate::processors::detector::fold_transfer_logs;
use crate::processors::tracker::evaluate;
use crate::utils::units::{AmountError, to_display_amount};
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("amount error: {0}")]
    Amount(#[from] AmountError),
}

/// Look up `tx_hash` on the verifier's watch.
#[derive(Debug, Clone)]
pub struct VerifyTransfer {
    pub tx_hash: String,
}

pub struct ManualVerifier {
    config: Arc<NetworkConfig>,
    client: Arc<dyn ChainClient>,
}

impl ManualVerifier {
    pub fn new(config: Arc<NetworkConfig>, client: Arc<dyn ChainClient>) -> Self {
        Self { config, client }
    }

    pub async fn verify(&self, tx_hash: &str) -> Result<Option<CandidateTransfer>, VerifyError> {
        self.process(VerifyTransfer {
            tx_hash: tx_hash.to_string(),
        })
        .await
    }

    /// `(from, raw value, log index)` of a native payment to the recipient.
    async fn native_payment(&self, hash: &str) -> Result<Option<(String, u128, Option<u64>)>, ChainError> {
        let Some(tx) = self.client.transaction(hash).await? else {
            return Ok(None);
        };
        let pays_recipient = tx
            .to
            .as_deref()
            .is_some_and(|to| to.eq_ignore_ascii_case(&self.config.recipient));
        if !pays_recipient || tx.value == 0 {
            return Ok(None);
        }
        Ok(Some((tx.from.to_ascii_lowercase(), tx.value, None)))
    }
}

impl Processor<VerifyTransfer> for ManualVerifier {
    type Output = Option<CandidateTransfer>;
    type Error = VerifyError;

    #[tracing::instrument(skip_all, err, name = "ManualVerifier", fields(watch = %self.config.name, tx_hash = %query.tx_hash))]
    async fn process(
        &self,
        query: VerifyTransfer,
    ) -> Result<Option<CandidateTransfer>, VerifyError> {
        let hash = match normalize_tx_hash(&query.tx_hash) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(error = %e, "Not a transaction hash");
                return Ok(None);
            }
        };

        let Some(receipt) = self.client.transaction_receipt(&hash).await? else {
            debug!("No receipt yet");
            return Ok(None);
        };

        let payment = match self.config.token_contract() {
            None => self.native_payment(&hash).await?,
            Some(contract) => {
                match fold_transfer_logs(&receipt.logs, contract, &self.config.recipient) {
                    Ok(folded) => folded.map(|t| (t.from, t.value, t.log_index)),
                    Err(e) => {
                        debug!(error = %e, "Transfer logs could not be summed");
                        None
                    }
                }
            }
        };
        let Some((from, raw, log_index)) = payment else {
            debug!("Transaction does not pay the watched address");
            return Ok(None);
        };
        let amount = to_display_amount(raw, self.config.decimals())?;

        let current_height = self.client.current_height().await?;
        let now = OffsetDateTime::now_utc();
        let mut transfer = CandidateTransfer {
            watch: self.config.name.clone(),
            network: self.config.network,
            asset: self.config.asset.clone(),
            tx_hash: hash,
            log_index,
            from,
            to: self.config.recipient.clone(),
            amount,
            observed_block: receipt.block_number,
            first_seen_at: now,
            last_checked_at: now,
            confirmations: 0,
            status: TransferStatus::Pending,
        };

        let outcome = evaluate(
            &transfer,
            current_height,
            true,
            self.config.required_confirmations,
        );
        transfer.confirmations = outcome.confirmations;
        transfer.status = if receipt.status == Some(false) {
            TransferStatus::Failed
        } else {
            outcome.status
        };
        Ok(Some(transfer))
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

    fn verifier(config: crate::config::NetworkConfig, chain: Arc<MockChain>) -> ManualVerifier {
        ManualVerifier::new(Arc::new(config), chain)
    }

    #[tokio::test]
    async fn test_native_payment_reaches_threshold() {
        let chain = Arc::new(MockChain::new(100));
        chain.add_native_tx(100, &tx_hash(1), SENDER, WATCHED, 10 * ONE_ETHER);
        let verifier = verifier(native_config(6), chain.clone());

        let pending = verifier.verify(&tx_hash(1)).await.unwrap().unwrap();
        assert_eq!(pending.confirmations, 1);
        assert_eq!(pending.status, TransferStatus::Pending);

        chain.set_height(105);
        let confirmed = verifier.verify(&tx_hash(1)).await.unwrap().unwrap();
        assert_eq!(confirmed.confirmations, 6);
        assert_eq!(confirmed.status, TransferStatus::Confirmed);
        assert_eq!(confirmed.amount, Decimal::from(10));
        assert_eq!(confirmed.observed_block, 100);
    }

    #[tokio::test]
    async fn test_unknown_or_foreign_hash_is_none() {
        let chain = Arc::new(MockChain::new(100));
        chain.add_native_tx(100, &tx_hash(2), SENDER, OTHER, ONE_ETHER);
        let verifier = verifier(native_config(6), chain);

        assert!(verifier.verify(&tx_hash(1)).await.unwrap().is_none());
        assert!(verifier.verify(&tx_hash(2)).await.unwrap().is_none());
        assert!(verifier.verify("0x1234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transient_error_surfaces() {
        let chain = Arc::new(MockChain::new(100));
        chain.fail_next(1);
        let verifier = verifier(native_config(6), chain);
        assert!(matches!(
            verifier.verify(&tx_hash(1)).await,
            Err(VerifyError::Chain(ChainError::Transient(_)))
        ));
    }

    #[tokio::test]
    async fn test_token_payment_from_receipt() {
        let chain = Arc::new(MockChain::new(210));
        chain.add_token_transfer(200, &tx_hash(5), TOKEN, SENDER, WATCHED, 1_250_000, 2);
        chain.add_token_transfer(200, &tx_hash(5), TOKEN, SENDER, OTHER, 7_000_000, 3);
        let verifier = verifier(token_config(12), chain);

        let transfer = verifier.verify(&tx_hash(5)).await.unwrap().unwrap();
        assert_eq!(transfer.amount, Decimal::from_str("1.25").unwrap());
        assert_eq!(transfer.log_index, Some(2));
        assert_eq!(transfer.confirmations, 11);
        assert_eq!(transfer.status, TransferStatus::Pending);
    }

    #[tokio::test]
    async fn test_reverted_transaction_is_failed() {
        let chain = Arc::new(MockChain::new(300));
        chain.add_token_transfer(290, &tx_hash(6), TOKEN, SENDER, WATCHED, 1_000_000, 0);
        chain.set_receipt_status(&tx_hash(6), Some(false));
        let verifier = verifier(token_config(12), chain);

        let transfer = verifier.verify(&tx_hash(6)).await.unwrap().unwrap();
        assert_eq!(transfer.status, TransferStatus::Failed);
    }
}
