use compact_str::CompactString;
use paywatch_sdk::objects::{Asset, Network, TransferPayload, TransferStatus};
use rust_decimal::Decimal;
use time::OffsetDateTime;

/// An observed movement of value into a watched address that has not been
/// credited yet.
///
/// `tx_hash` is the identity: one transaction is one candidate per watch,
/// even when it carries several qualifying token logs (their amounts are
/// summed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTransfer {
    pub watch: CompactString,
    pub network: Network,
    pub asset: Asset,
    /// Lowercase `0x` hash.
    pub tx_hash: String,
    /// Index of the first qualifying `Transfer` log. Token mode only.
    pub log_index: Option<u64>,
    pub from: String,
    pub to: String,
    /// Display units (wei / 10^18, or token base units / 10^decimals).
    pub amount: Decimal,
    pub observed_block: u64,
    pub first_seen_at: OffsetDateTime,
    pub last_checked_at: OffsetDateTime,
    pub confirmations: u64,
    pub status: TransferStatus,
}

impl CandidateTransfer {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn to_payload(&self, required_confirmations: u64) -> TransferPayload {
        TransferPayload {
            watch: self.watch.clone(),
            network: self.network,
            asset: self.asset.clone(),
            tx_hash: self.tx_hash.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            amount: self.amount,
            observed_block: self.observed_block,
            confirmations: self.confirmations,
            required_confirmations,
            status: self.status,
            first_seen_at: self.first_seen_at.unix_timestamp(),
            last_checked_at: self.last_checked_at.unix_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_to_payload() {
        let seen = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let transfer = CandidateTransfer {
            watch: "eth-usdt".into(),
            network: Network::Ethereum,
            asset: Asset::Token {
                symbol: "USDT".into(),
                contract: "0xdac17f958d2ee523a2206206994597c13d831ec7".into(),
                decimals: 6,
            },
            tx_hash: "0xaa".to_string(),
            log_index: Some(3),
            from: "0x01".to_string(),
            to: "0x02".to_string(),
            amount: Decimal::from_str("2.5").unwrap(),
            observed_block: 100,
            first_seen_at: seen,
            last_checked_at: seen + time::Duration::seconds(15),
            confirmations: 2,
            status: TransferStatus::Pending,
        };

        let payload = transfer.to_payload(6);
        assert_eq!(payload.required_confirmations, 6);
        assert_eq!(payload.first_seen_at, 1_700_000_000);
        assert_eq!(payload.last_checked_at, 1_700_000_015);
        assert_eq!(payload.amount, transfer.amount);
        assert!(!transfer.is_terminal());
    }
}
