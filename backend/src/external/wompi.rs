//! Wompi payment gateway client
//!
//! Thin wrapper over the Wompi REST API: payment link creation, transaction
//! lookup, and the two SHA-256 signatures Wompi uses (web-checkout integrity
//! and event checksums).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use shared::{event_checksum_payload, integrity_signature_payload, WompiTransactionStatus};

use crate::config::WompiConfig;
use crate::error::{AppError, AppResult};

/// Hosted checkout page for a payment link
const CHECKOUT_BASE_URL: &str = "https://checkout.wompi.co/l";

/// Wompi API client
#[derive(Clone)]
pub struct WompiClient {
    client: Client,
    base_url: String,
    private_key: String,
}

/// Request body for `POST /payment_links`
#[derive(Debug, Serialize)]
pub struct PaymentLinkRequest {
    pub name: String,
    pub description: String,
    pub single_use: bool,
    pub collect_shipping: bool,
    pub currency: String,
    pub amount_in_cents: i64,
    pub redirect_url: String,
    /// Our order reference, echoed back on the transaction
    pub sku: String,
}

/// A created payment link
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentLink {
    pub id: String,
}

impl PaymentLink {
    pub fn checkout_url(&self) -> String {
        format!("{}/{}", CHECKOUT_BASE_URL, self.id)
    }
}

/// A transaction as returned by `GET /transactions/:id` and inside events
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WompiTransaction {
    pub id: String,
    pub status: WompiTransactionStatus,
    #[serde(default)]
    pub reference: Option<String>,
    pub amount_in_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_link_id: Option<String>,
    #[serde(default)]
    pub payment_method_type: Option<String>,
}

/// Wompi wraps every payload in `{"data": ...}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Signature block of an event
#[derive(Debug, Clone, Deserialize)]
pub struct EventSignature {
    pub properties: Vec<String>,
    pub checksum: String,
}

/// An event notification posted to the webhook
#[derive(Debug, Clone, Deserialize)]
pub struct WompiEvent {
    pub event: String,
    pub data: Value,
    #[serde(default)]
    pub environment: Option<String>,
    pub signature: EventSignature,
    pub timestamp: i64,
}

impl WompiEvent {
    /// The transaction carried by a `transaction.updated` event
    pub fn transaction(&self) -> AppResult<WompiTransaction> {
        let transaction = self
            .data
            .get("transaction")
            .cloned()
            .ok_or_else(|| AppError::ValidationError("Event has no transaction".to_string()))?;
        serde_json::from_value(transaction)
            .map_err(|e| AppError::ValidationError(format!("Invalid transaction payload: {}", e)))
    }

    /// Verify the event checksum against the events secret
    pub fn verify(&self, events_secret: &str) -> AppResult<()> {
        let mut values = Vec::with_capacity(self.signature.properties.len());
        for property in &self.signature.properties {
            let value = lookup_property(&self.data, property).ok_or(AppError::InvalidSignature)?;
            values.push(value);
        }

        let expected = sha256_hex(&event_checksum_payload(&values, self.timestamp, events_secret));
        if expected.eq_ignore_ascii_case(self.signature.checksum.trim()) {
            Ok(())
        } else {
            Err(AppError::InvalidSignature)
        }
    }
}

/// Resolve a dotted property path (e.g. "transaction.amount_in_cents") inside
/// the event data and render it the way Wompi concatenates it.
fn lookup_property(data: &Value, path: &str) -> Option<String> {
    let mut current = data;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

fn sha256_hex(payload: &str) -> String {
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

/// Integrity signature the storefront passes to the Wompi widget
pub fn integrity_signature(
    reference: &str,
    amount_in_cents: i64,
    currency: &str,
    integrity_secret: &str,
) -> String {
    sha256_hex(&integrity_signature_payload(
        reference,
        amount_in_cents,
        currency,
        integrity_secret,
    ))
}

impl WompiClient {
    /// Create a new WompiClient
    pub fn new(config: &WompiConfig) -> Self {
        Self::with_base_url(config.private_key.clone(), config.base_url.clone())
    }

    /// Create a new WompiClient with custom base URL (for testing)
    pub fn with_base_url(private_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            private_key,
        }
    }

    /// Create a single-use payment link
    pub async fn create_payment_link(&self, request: &PaymentLinkRequest) -> AppResult<PaymentLink> {
        let url = format!("{}/payment_links", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.private_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Payment link request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::PaymentGateway(format!(
                "Payment link creation failed: {} - {}",
                status, body
            )));
        }

        let envelope: Envelope<PaymentLink> = response.json().await.map_err(|e| {
            AppError::PaymentGateway(format!("Failed to parse payment link response: {}", e))
        })?;

        tracing::info!(payment_link_id = %envelope.data.id, reference = %request.sku, "Payment link created");
        Ok(envelope.data)
    }

    /// Fetch a transaction by its Wompi id
    pub async fn get_transaction(&self, transaction_id: &str) -> AppResult<WompiTransaction> {
        let url = format!("{}/transactions/{}", self.base_url, transaction_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.private_key)
            .send()
            .await
            .map_err(|e| AppError::PaymentGateway(format!("Transaction request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Transaction {}", transaction_id)));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::PaymentGateway(format!(
                "Transaction lookup failed: {} - {}",
                status, body
            )));
        }

        let envelope: Envelope<WompiTransaction> = response.json().await.map_err(|e| {
            AppError::PaymentGateway(format!("Failed to parse transaction response: {}", e))
        })?;

        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test_events_secret";

    fn signed_event(status: &str) -> WompiEvent {
        let data = json!({
            "transaction": {
                "id": "1234-1610641025-49201",
                "status": status,
                "amount_in_cents": 4490000,
                "reference": "PAT-1A2B3C4D5E6F",
                "currency": "COP",
                "payment_link_id": "test_AbC123"
            }
        });
        let properties = vec![
            "transaction.id".to_string(),
            "transaction.status".to_string(),
            "transaction.amount_in_cents".to_string(),
        ];
        let values = vec![
            "1234-1610641025-49201".to_string(),
            status.to_string(),
            "4490000".to_string(),
        ];
        let checksum = sha256_hex(&event_checksum_payload(&values, 1530291411, SECRET));

        WompiEvent {
            event: "transaction.updated".to_string(),
            data,
            environment: Some("test".to_string()),
            signature: EventSignature { properties, checksum },
            timestamp: 1530291411,
        }
    }

    #[test]
    fn test_valid_checksum_is_accepted() {
        let event = signed_event("APPROVED");
        assert!(event.verify(SECRET).is_ok());
    }

    #[test]
    fn test_checksum_comparison_ignores_case() {
        let mut event = signed_event("APPROVED");
        event.signature.checksum = event.signature.checksum.to_uppercase();
        assert!(event.verify(SECRET).is_ok());
    }

    #[test]
    fn test_tampered_event_is_rejected() {
        let mut event = signed_event("DECLINED");
        event.data["transaction"]["status"] = json!("APPROVED");
        assert!(matches!(event.verify(SECRET), Err(AppError::InvalidSignature)));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let event = signed_event("APPROVED");
        assert!(event.verify("another_secret").is_err());
    }

    #[test]
    fn test_missing_property_is_rejected() {
        let mut event = signed_event("APPROVED");
        event.signature.properties.push("transaction.customer_email".to_string());
        assert!(event.verify(SECRET).is_err());
    }

    #[test]
    fn test_event_transaction_parsing() {
        let event = signed_event("APPROVED");
        let tx = event.transaction().unwrap();
        assert_eq!(tx.status, WompiTransactionStatus::Approved);
        assert_eq!(tx.payment_link_id.as_deref(), Some("test_AbC123"));
        assert_eq!(tx.amount_in_cents, 4490000);
    }

    #[test]
    fn test_integrity_signature_is_sha256_of_concatenation() {
        let signature = integrity_signature("PAT-ABC", 4_500_000, "COP", "secret");
        assert_eq!(signature.len(), 64);
        assert_eq!(signature, sha256_hex("PAT-ABC4500000COPsecret"));
        assert_ne!(signature, integrity_signature("PAT-ABC", 4_500_001, "COP", "secret"));
    }

    #[test]
    fn test_checkout_url() {
        let link = PaymentLink { id: "test_AbC123".to_string() };
        assert_eq!(link.checkout_url(), "https://checkout.wompi.co/l/test_AbC123");
    }
}
