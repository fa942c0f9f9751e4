//! Sources of "new head" notifications.
//!
//! The watch loop only asks for the next head height; whether that comes
//! from polling `eth_blockNumber` or from a websocket `newHeads`
//! subscription is decided by configuration.

use super::hex::parse_quantity;
use super::{ChainClient, ChainError};
use crate::config::{HeadSourceKind, NetworkConfig};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

/// Yields the chain head height whenever it may have moved.
#[async_trait]
pub trait HeadSource: Send {
    async fn next_head(&mut self) -> Result<u64, ChainError>;
}

/// Build the head source selected by `config`.
pub fn head_source(config: &NetworkConfig, client: Arc<dyn ChainClient>) -> Box<dyn HeadSource> {
    match &config.head_source {
        HeadSourceKind::Polling => Box::new(PollingHeads::new(client, config.poll_interval)),
        HeadSourceKind::Subscription { ws_endpoint } => {
            Box::new(SubscriptionHeads::new(ws_endpoint.clone()))
        }
    }
}

/// Polls `current_height()` on a fixed interval. The first call returns
/// immediately.
pub struct PollingHeads {
    client: Arc<dyn ChainClient>,
    interval: Interval,
}

impl PollingHeads {
    pub fn new(client: Arc<dyn ChainClient>, period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { client, interval }
    }
}

#[async_trait]
impl HeadSource for PollingHeads {
    async fn next_head(&mut self) -> Result<u64, ChainError> {
        self.interval.tick().await;
        self.client.current_height().await
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `eth_subscribe("newHeads")` over a websocket. A dropped socket surfaces
/// as a transient error and the next call reconnects.
pub struct SubscriptionHeads {
    endpoint: Url,
    stream: Option<WsStream>,
}

impl SubscriptionHeads {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            stream: None,
        }
    }

    async fn connect(&self) -> Result<WsStream, ChainError> {
        let (mut stream, _) = connect_async(self.endpoint.as_str())
            .await
            .map_err(|e| ChainError::Transient(format!("websocket connect: {e}")))?;

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_subscribe",
            "params": ["newHeads"],
        });
        stream
            .send(Message::Text(request.to_string()))
            .await
            .map_err(|e| ChainError::Transient(format!("websocket subscribe: {e}")))?;

        info!(endpoint = %self.endpoint, "Subscribed to newHeads");
        Ok(stream)
    }
}

#[async_trait]
impl HeadSource for SubscriptionHeads {
    async fn next_head(&mut self) -> Result<u64, ChainError> {
        loop {
            if self.stream.is_none() {
                self.stream = Some(self.connect().await?);
            }
            let Some(stream) = self.stream.as_mut() else {
                continue;
            };

            match stream.next().await {
                Some(Ok(Message::Text(text))) => match parse_head_notification(&text) {
                    Ok(Some(height)) => return Ok(height),
                    Ok(None) => continue,
                    Err(e) => {
                        self.stream = None;
                        return Err(e);
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(endpoint = %self.endpoint, ?frame, "newHeads socket closed");
                    self.stream = None;
                    return Err(ChainError::Transient("websocket closed".to_string()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(ChainError::Transient(format!("websocket: {e}")));
                }
                None => {
                    self.stream = None;
                    return Err(ChainError::Transient("websocket ended".to_string()));
                }
            }
        }
    }
}

/// Extract the block number from a `newHeads` notification. Subscription
/// acknowledgements and unrelated frames yield `None`.
fn parse_head_notification(text: &str) -> Result<Option<u64>, ChainError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ChainError::Malformed(e.to_string()))?;

    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(ChainError::Rpc { code, message });
    }

    if value.get("method").and_then(Value::as_str) != Some("eth_subscription") {
        return Ok(None);
    }

    let number = value
        .pointer("/params/result/number")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::Malformed("newHeads without number".to_string()))?;
    Ok(Some(parse_quantity(number)?))
}
