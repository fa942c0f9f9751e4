//! Admin API client (operator tooling → Paywatch server).
//!
//! All requests carry the plaintext admin secret in the
//! `Paywatch-Admin-Authorization` header.

use reqwest::Client;
use url::Url;

use super::ClientError;
use crate::objects::admin::{AdminBalanceResponse, AdminVerifyResponse, AdminWatchResponse};
use crate::signature::ADMIN_AUTH_HEADER;

/// Typed HTTP client for the Paywatch **Admin API**.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    admin_secret: String,
}

impl AdminClient {
    /// Create a new `AdminClient`.
    ///
    /// * `base_url` : root URL of the Paywatch server.
    /// * `admin_secret` : the plaintext admin secret.
    pub fn new(base_url: Url, admin_secret: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            admin_secret: admin_secret.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `GET /api/v1/admin/watches` : status of every configured watch.
    pub async fn list_watches(&self) -> Result<Vec<AdminWatchResponse>, ClientError> {
        let url = self.base_url.join("/api/v1/admin/watches")?;
        self.get(url).await
    }

    /// `GET /api/v1/admin/watches/{watch}/balance` : balance of the watched
    /// address.
    pub async fn balance(&self, watch: &str) -> Result<AdminBalanceResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/v1/admin/watches/{watch}/balance"))?;
        self.get(url).await
    }

    /// `GET /api/v1/admin/watches/{watch}/transfers/{tx_hash}` : one-shot
    /// manual verification of a transaction.
    pub async fn verify_transfer(
        &self,
        watch: &str,
        tx_hash: &str,
    ) -> Result<AdminVerifyResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/v1/admin/watches/{watch}/transfers/{tx_hash}"))?;
        self.get(url).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let resp = self
            .http
            .get(url)
            .header(ADMIN_AUTH_HEADER, &self.admin_secret)
            .send()
            .await?;

        parse_response(resp).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Api { status, body });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
