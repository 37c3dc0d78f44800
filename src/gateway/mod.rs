//! Payment gateway integration: intent creation against the provider's REST
//! API and HMAC verification of its browser-side callbacks.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::{instrument, warn};

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("payment gateway rejected the request: {0}")]
    Rejected(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

/// Request to authorize collection of a specific amount.
#[derive(Debug, Clone, Serialize)]
pub struct CreateIntentRequest {
    pub amount: i64,
    pub currency: String,
    /// Our order id, echoed back by the provider for reconciliation.
    #[serde(rename = "orderId")]
    pub order_id: String,
}

/// Provider-side record authorizing collection, referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Hosted-checkout provider. The UI side is opaque; this trait covers only
/// the server-to-server surface.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, request: CreateIntentRequest)
        -> Result<GatewayIntent, GatewayError>;
}

/// REST client for the hosted gateway.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, key_id: String, key_secret: String) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client construction cannot fail with static options"),
            base_url,
            key_id,
            key_secret,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self), fields(order_id = %request.order_id, amount = request.amount))]
    async fn create_intent(
        &self,
        request: CreateIntentRequest,
    ) -> Result<GatewayIntent, GatewayError> {
        let url = format!("{}/v1/orders", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "gateway refused intent creation");
            return Err(GatewayError::Rejected(format!("status {}", status)));
        }

        response
            .json::<GatewayIntent>()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("malformed intent response: {}", e)))
    }
}

/// Verifies gateway callback signatures: HMAC-SHA256 over
/// `"{gateway_order_id}|{gateway_payment_id}"`, hex-encoded. The secret stays
/// server-side; a mismatch must always fail closed.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Compute the expected signature for a callback payload.
    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(format!("{}|{}", gateway_order_id, gateway_payment_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison of the provided signature against the
    /// recomputed one.
    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        let expected = self.sign(gateway_order_id, gateway_payment_id);
        constant_time_eq(&expected, signature)
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let verifier = SignatureVerifier::new("test_secret");
        let sig = verifier.sign("gw_order_1", "pay_1");
        assert_eq!(sig.len(), 64); // SHA256 = 32 bytes = 64 hex chars
        assert!(verifier.verify("gw_order_1", "pay_1", &sig));
    }

    #[test]
    fn tampered_signature_rejected() {
        let verifier = SignatureVerifier::new("test_secret");
        let sig = verifier.sign("gw_order_1", "pay_1");

        let mut tampered = sig.clone().into_bytes();
        tampered[0] = if tampered[0] == b'0' { b'1' } else { b'0' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(!verifier.verify("gw_order_1", "pay_1", &tampered));
    }

    #[test]
    fn tampered_identifiers_rejected() {
        let verifier = SignatureVerifier::new("test_secret");
        let sig = verifier.sign("gw_order_1", "pay_1");

        assert!(!verifier.verify("gw_order_2", "pay_1", &sig));
        assert!(!verifier.verify("gw_order_1", "pay_2", &sig));
    }

    #[test]
    fn wrong_secret_rejected() {
        let signer = SignatureVerifier::new("secret_a");
        let verifier = SignatureVerifier::new("secret_b");
        let sig = signer.sign("gw_order_1", "pay_1");
        assert!(!verifier.verify("gw_order_1", "pay_1", &sig));
    }

    #[test]
    fn truncated_signature_rejected() {
        let verifier = SignatureVerifier::new("test_secret");
        let sig = verifier.sign("gw_order_1", "pay_1");
        assert!(!verifier.verify("gw_order_1", "pay_1", &sig[..32]));
        assert!(!verifier.verify("gw_order_1", "pay_1", ""));
    }
}
