//! WebhookSender processor.
//!
//! The WebhookSender is responsible for:
//! - Receiving `TransferEvent`s from the monitor queue
//! - Building a `TransferEventPayload` with a stable event id per event
//! - Sending HTTP POST requests to the ledger with a signed body
//! - Handling retries with exponential backoff (2^0 to 2^11 seconds)
//!
//! The ledger secret and URL are read from the config store on every attempt,
//! so a SIGHUP reload applies to deliveries already in their retry schedule.

use crate::config::LedgerSettings;
use kanau::processor::Processor;
use paywatch_core::config::ConfigStore;
use paywatch_core::events::{TransferEvent, TransferEventReceiver};
use paywatch_core::utils::backoff::retry_delay;
use paywatch_sdk::objects::TransferEventPayload;
use paywatch_sdk::signature::{SIGNATURE_HEADER, SignedObject};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Attempts per event, the last one waiting 2^11 seconds after the previous.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 12;

/// Errors that can occur during webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The ledger answered with a non-2xx status
    #[error("webhook delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },

    /// Payload serialization error
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One delivery attempt of an already built payload.
#[derive(Debug, Clone)]
pub struct DeliverWebhook {
    pub payload: TransferEventPayload,
}

/// WebhookSender handles delivering transfer events to the ledger.
#[derive(Clone)]
pub struct WebhookSender {
    http_client: reqwest::Client,
    ledger: ConfigStore<LedgerSettings>,
}

impl WebhookSender {
    pub fn new(ledger: ConfigStore<LedgerSettings>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            ledger,
        }
    }

    /// Build the webhook body for `event`. The id stays the same across retries.
    pub fn payload_for(event: &TransferEvent) -> TransferEventPayload {
        TransferEventPayload {
            event_id: Uuid::now_v7(),
            event_type: event.kind,
            transfer: event.payload(),
            timestamp: time::OffsetDateTime::now_utc().unix_timestamp(),
        }
    }

    /// Run the WebhookSender until shutdown or until the event queue closes.
    pub async fn run(self, mut events: TransferEventReceiver, mut shutdown_rx: watch::Receiver<bool>) {
        info!("WebhookSender started");
        let mut deliveries = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("WebhookSender received shutdown signal");
                        break;
                    }
                }

                Some(event) = events.recv() => {
                    let payload = Self::payload_for(&event);
                    debug!(
                        event_id = %payload.event_id,
                        event_type = %payload.event_type,
                        tx_hash = %payload.transfer.tx_hash,
                        "Received TransferEvent"
                    );
                    let sender = self.clone();
                    deliveries.spawn(async move { sender.deliver_with_retry(payload).await });
                }

                Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Webhook delivery task failed");
                    }
                }

                else => {
                    info!("TransferEvent channel closed");
                    break;
                }
            }
        }

        if !deliveries.is_empty() {
            warn!(
                pending = deliveries.len(),
                "Abandoning webhook deliveries still in their retry schedule"
            );
        }
        deliveries.shutdown().await;
        info!("WebhookSender shutdown complete");
    }

    /// Deliver `payload`, retrying with exponential backoff. Returns whether
    /// the ledger accepted it.
    pub async fn deliver_with_retry(&self, payload: TransferEventPayload) -> bool {
        let event_id = payload.event_id;
        let tx_hash = payload.transfer.tx_hash.clone();
        let request = DeliverWebhook { payload };

        for attempt in 0..MAX_DELIVERY_ATTEMPTS {
            match self.process(request.clone()).await {
                Ok(()) => {
                    info!(
                        event_id = %event_id,
                        tx_hash = %tx_hash,
                        attempt,
                        "Webhook delivered successfully"
                    );
                    return true;
                }
                Err(e) if attempt + 1 < MAX_DELIVERY_ATTEMPTS => {
                    let delay = retry_delay(attempt);
                    warn!(
                        event_id = %event_id,
                        tx_hash = %tx_hash,
                        attempt,
                        retry_in_secs = delay.as_secs(),
                        error = %e,
                        "Webhook delivery failed"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        event_id = %event_id,
                        tx_hash = %tx_hash,
                        error = %e,
                        "Webhook delivery gave up after {} attempts",
                        MAX_DELIVERY_ATTEMPTS
                    );
                }
            }
        }
        false
    }
}

impl Processor<DeliverWebhook> for WebhookSender {
    type Output = ();
    type Error = WebhookError;

    #[tracing::instrument(skip_all, err, name = "WebhookSender", fields(event_id = %request.payload.event_id))]
    async fn process(&self, request: DeliverWebhook) -> Result<(), WebhookError> {
        let ledger = self.ledger.read();
        // Signed per attempt so the timestamp stays inside the freshness window.
        let signed = SignedObject::new(request.payload, ledger.secret_bytes())?;

        let response = self
            .http_client
            .post(ledger.webhook_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signed.to_header())
            .body(signed.json)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(WebhookError::DeliveryFailed {
                status: status.as_u16(),
                body,
            })
        }
    }
}
