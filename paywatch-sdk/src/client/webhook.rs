//! Webhook signature verification helper for ledger implementers.

use crate::signature::{Signature, SignatureError, SignedObject};

/// Verify and deserialize an incoming Paywatch webhook.
///
/// * `signature_header` : value of the `Paywatch-Signature` request header.
/// * `body` : raw JSON request body string.
/// * `secret` : the ledger HMAC secret shared with the Paywatch server.
///
/// # Example
///
/// ```ignore
/// use paywatch_sdk::client::verify_webhook;
/// use paywatch_sdk::objects::TransferEventPayload;
///
/// let event: TransferEventPayload = verify_webhook(signature_header, &body, ledger_secret)?;
/// ledger.credit_once(&event.transfer.tx_hash, event.transfer.amount)?;
/// ```
pub fn verify_webhook<T: Signature>(
    signature_header: &str,
    body: &str,
    secret: &[u8],
) -> Result<T, SignatureError> {
    SignedObject::<T>::from_header_and_body(signature_header, body.to_owned())?
        .verify(secret)
}
