//! JSON-RPC 2.0 over HTTP implementation of [`ChainClient`].

use super::hex::{
    format_quantity, normalize_address, parse_quantity, parse_quantity_u128, parse_word_u128,
};
use super::{Block, ChainClient, ChainError, Log, LogFilter, Receipt, Transaction};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};
use url::Url;

/// `balanceOf(address)` selector.
const BALANCE_OF_SELECTOR: &str = "0x70a08231";

/// Node error codes that mean "slow down" rather than "wrong request".
const LIMIT_EXCEEDED: i64 = -32005;

/// EVM node client speaking JSON-RPC over HTTP.
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a new client for `endpoint` with a 30 second request timeout.
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Perform one call; a JSON `null` result becomes `None`.
    async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(endpoint = %self.endpoint, method, id, "JSON-RPC request");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(ChainError::Transient(format!("{method}: HTTP {status}")));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ChainError::Rpc {
                code: i64::from(status.as_u16()),
                message,
            });
        }

        let envelope: RpcResponse<T> = response.json().await?;
        if let Some(error) = envelope.error {
            return Err(classify_rpc_error(error.code, error.message));
        }
        Ok(envelope.result)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ChainError> {
        self.call_optional(method, params)
            .await?
            .ok_or_else(|| ChainError::Malformed(format!("{method}: null result")))
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        let height: String = self.call("eth_blockNumber", json!([])).await?;
        Ok(parse_quantity(&height)?)
    }

    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, ChainError> {
        let raw: Option<RawTransaction> = self
            .call_optional("eth_getTransactionByHash", json!([hash]))
            .await?;
        raw.map(Transaction::try_from).transpose()
    }

    async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>, ChainError> {
        let raw: Option<RawReceipt> = self
            .call_optional("eth_getTransactionReceipt", json!([hash]))
            .await?;
        match raw {
            // Some nodes return a receipt skeleton for pending transactions.
            Some(raw) if raw.block_number.is_none() => Ok(None),
            Some(raw) => Receipt::try_from(raw).map(Some),
            None => Ok(None),
        }
    }

    async fn block_with_transactions(&self, height: u64) -> Result<Option<Block>, ChainError> {
        let raw: Option<RawBlock> = match self
            .call_optional(
                "eth_getBlockByNumber",
                json!([format_quantity(height), true]),
            )
            .await
        {
            Err(ChainError::NotFound(_)) => None,
            other => other?,
        };
        raw.map(Block::try_from).transpose()
    }

    async fn logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        let raw: Vec<Value> = self.call("eth_getLogs", json!([filter_params(filter)])).await?;
        Ok(decode_each::<RawLog, Log>(raw, "log"))
    }

    async fn balance_of(&self, address: &str, token: Option<&str>) -> Result<u128, ChainError> {
        match token {
            None => {
                let balance: String = self
                    .call("eth_getBalance", json!([address, "latest"]))
                    .await?;
                Ok(parse_quantity_u128(&balance)?)
            }
            Some(contract) => {
                let address = normalize_address(address)?;
                let data = format!("{BALANCE_OF_SELECTOR}{:0>64}", &address[2..]);
                let word: String = self
                    .call(
                        "eth_call",
                        json!([{ "to": contract, "data": data }, "latest"]),
                    )
                    .await?;
                Ok(parse_word_u128(&word)?)
            }
        }
    }
}

fn filter_params(filter: &LogFilter) -> Value {
    json!({
        "address": filter.address,
        "topics": filter.topics,
        "fromBlock": format_quantity(filter.from_block),
        "toBlock": format_quantity(filter.to_block),
    })
}

fn classify_rpc_error(code: i64, message: String) -> ChainError {
    let lower = message.to_ascii_lowercase();
    if code == LIMIT_EXCEEDED
        || lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("timeout")
    {
        ChainError::Transient(message)
    } else if lower.contains("not found") || lower.contains("unknown block") {
        ChainError::NotFound(message)
    } else {
        ChainError::Rpc { code, message }
    }
}

/// Decode every element on its own. A malformed entry is logged and
/// dropped so it cannot hide the rest of the batch.
fn decode_each<R, T>(raw: Vec<Value>, kind: &'static str) -> Vec<T>
where
    R: DeserializeOwned,
    T: TryFrom<R, Error = ChainError>,
{
    raw.into_iter()
        .filter_map(|value| {
            let decoded = serde_json::from_value::<R>(value)
                .map_err(|e| ChainError::Malformed(e.to_string()))
                .and_then(<T as TryFrom<R>>::try_from);
            match decoded {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(kind, error = %e, "Skipping malformed entry");
                    None
                }
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    value: String,
    block_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    number: Option<String>,
    hash: Option<String>,
    timestamp: String,
    #[serde(default)]
    transactions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: String,
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<Value>,
}

fn optional_quantity(value: Option<String>) -> Result<Option<u64>, ChainError> {
    value.as_deref().map(parse_quantity).transpose().map_err(Into::into)
}

impl TryFrom<RawTransaction> for Transaction {
    type Error = ChainError;

    fn try_from(raw: RawTransaction) -> Result<Self, ChainError> {
        Ok(Transaction {
            hash: raw.hash.to_ascii_lowercase(),
            from: normalize_address(&raw.from)?,
            to: raw.to.as_deref().map(normalize_address).transpose()?,
            value: parse_quantity_u128(&raw.value)?,
            block_number: optional_quantity(raw.block_number)?,
        })
    }
}

impl TryFrom<RawBlock> for Block {
    type Error = ChainError;

    fn try_from(raw: RawBlock) -> Result<Self, ChainError> {
        let number = optional_quantity(raw.number)?
            .ok_or_else(|| ChainError::Malformed("block without number".to_string()))?;
        Ok(Block {
            number,
            hash: raw.hash.unwrap_or_default().to_ascii_lowercase(),
            timestamp: parse_quantity(&raw.timestamp)?,
            transactions: decode_each::<RawTransaction, Transaction>(
                raw.transactions,
                "transaction",
            ),
        })
    }
}

impl TryFrom<RawLog> for Log {
    type Error = ChainError;

    fn try_from(raw: RawLog) -> Result<Self, ChainError> {
        Ok(Log {
            address: normalize_address(&raw.address)?,
            topics: raw
                .topics
                .into_iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            data: raw.data,
            block_number: optional_quantity(raw.block_number)?,
            transaction_hash: raw.transaction_hash.map(|h| h.to_ascii_lowercase()),
            log_index: optional_quantity(raw.log_index)?,
            removed: raw.removed,
        })
    }
}

impl TryFrom<RawReceipt> for Receipt {
    type Error = ChainError;

    fn try_from(raw: RawReceipt) -> Result<Self, ChainError> {
        let block_number = optional_quantity(raw.block_number)?
            .ok_or_else(|| ChainError::Malformed("receipt without block number".to_string()))?;
        let status = optional_quantity(raw.status)?.map(|s| s == 1);
        Ok(Receipt {
            transaction_hash: raw.transaction_hash.to_ascii_lowercase(),
            block_number,
            status,
            logs: decode_each::<RawLog, Log>(raw.logs, "log"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_decoding() {
        let json = json!({
            "number": "0x64",
            "hash": "0xAB",
            "timestamp": "0x5f5e100",
            "transactions": [{
                "hash": "0xAA",
                "from": "0x00000000000000000000000000000000000000F1",
                "to": "0x00000000000000000000000000000000000000F2",
                "value": "0x8ac7230489e80000",
                "blockNumber": "0x64"
            }, {
                "hash": "0xbb",
                "from": "0x00000000000000000000000000000000000000f1",
                "to": null,
                "value": "0x0",
                "blockNumber": "0x64"
            }]
        });
        let raw: RawBlock = serde_json::from_value(json).unwrap();
        let block = Block::try_from(raw).unwrap();
        assert_eq!(block.number, 100);
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[0].hash, "0xaa");
        assert_eq!(
            block.transactions[0].to.as_deref(),
            Some("0x00000000000000000000000000000000000000f2")
        );
        assert_eq!(block.transactions[0].value, 10_000_000_000_000_000_000);
        assert_eq!(block.transactions[1].to, None);
    }

    #[test]
    fn test_receipt_status_and_logs() {
        let json = json!({
            "transactionHash": "0xCC",
            "blockNumber": "0x10",
            "status": "0x0",
            "logs": [{
                "address": "0xdAC17F958D2ee523a2206206994597C13D831ec7",
                "topics": ["0xDDF252AD1BE2C89B69C2B068FC378DAA952BA7F163C4A11628F55A4DF523B3EF"],
                "data": "0x",
                "blockNumber": "0x10",
                "transactionHash": "0xcc",
                "logIndex": "0x3"
            }]
        });
        let raw: RawReceipt = serde_json::from_value(json).unwrap();
        let receipt = Receipt::try_from(raw).unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.status, Some(false));
        assert_eq!(receipt.logs[0].log_index, Some(3));
        assert!(receipt.logs[0].topics[0].starts_with("0xddf252ad"));
        assert!(!receipt.logs[0].removed);
    }

    #[test]
    fn test_malformed_entries_do_not_sink_the_batch() {
        let good = json!({
            "address": "0xdAC17F958D2ee523a2206206994597C13D831ec7",
            "topics": [],
            "data": "0x",
            "blockNumber": "0x10",
            "transactionHash": "0xcc",
            "logIndex": "0x0"
        });
        let bad_address = json!({
            "address": "0xzz",
            "topics": [],
            "data": "0x",
            "blockNumber": "0x10",
            "transactionHash": "0xdd",
            "logIndex": "0x1"
        });
        let missing_topics = json!({
            "address": "0xdAC17F958D2ee523a2206206994597C13D831ec7",
            "data": "0x",
            "blockNumber": "0x10"
        });
        let logs: Vec<Log> =
            decode_each::<RawLog, Log>(vec![bad_address, good, missing_topics], "log");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].transaction_hash.as_deref(), Some("0xcc"));

        let block = json!({
            "number": "0x64",
            "hash": "0xab",
            "timestamp": "0x0",
            "transactions": [{
                "hash": "0xaa",
                "from": "not an address",
                "to": null,
                "value": "0x1",
                "blockNumber": "0x64"
            }, {
                "hash": "0xbb",
                "from": "0x00000000000000000000000000000000000000f1",
                "to": "0x00000000000000000000000000000000000000f2",
                "value": "0x1",
                "blockNumber": "0x64"
            }]
        });
        let raw: RawBlock = serde_json::from_value(block).unwrap();
        let block = Block::try_from(raw).unwrap();
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].hash, "0xbb");
    }

    #[test]
    fn test_null_result_is_none() {
        let envelope: RpcResponse<RawTransaction> =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": null})).unwrap();
        assert!(envelope.result.is_none());
        assert!(envelope.error.is_none());
    }

    #[test]
    fn test_rpc_error_classification() {
        assert!(classify_rpc_error(-32005, "limit exceeded".to_string()).is_transient());
        assert!(classify_rpc_error(-32000, "Rate limit reached".to_string()).is_transient());
        assert!(matches!(
            classify_rpc_error(-32000, "header not found".to_string()),
            ChainError::NotFound(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32602, "invalid argument".to_string()),
            ChainError::Rpc { code: -32602, .. }
        ));
    }

    #[test]
    fn test_filter_params_shape() {
        let filter = LogFilter {
            address: "0x0000000000000000000000000000000000000001".to_string(),
            topics: [Some("0xaa".to_string()), None, Some("0xbb".to_string())],
            from_block: 16,
            to_block: 32,
        };
        let params = filter_params(&filter);
        assert_eq!(params["fromBlock"], "0x10");
        assert_eq!(params["toBlock"], "0x20");
        assert!(params["topics"][1].is_null());
    }
}
