//! Stateless adapter over the hosted-checkout payment gateway (Xendit).
//!
//! The adapter is a thin HTTP wrapper; all invoice state lives in the
//! lifecycle. Webhook signature verification and event parsing are pure
//! functions so the unauthenticated webhook path is testable without a
//! network.

use anyhow::{anyhow, Context};
use aspree_api::types::ids::InvoiceNumber;
use aspree_common::time::TimestampMs;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default production API endpoint.
const DEFAULT_BASE_URL: &str = "https://api.xendit.co";

/// Outbound request for a hosted checkout invoice.
#[derive(Clone, Debug, Serialize)]
pub struct HostedInvoiceRequest {
    /// `<invoice_number>-<ms_epoch>`; the webhook resolves this back to the
    /// invoice.
    pub external_id: String,
    pub amount: f64,
    pub description: String,
    pub payer_email: Option<String>,
    pub success_redirect_url: Option<String>,
    pub failure_redirect_url: Option<String>,
    pub currency: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub payment_methods: Vec<String>,
}

/// The subset of the hosted-invoice response the system uses.
#[derive(Clone, Debug, Deserialize)]
pub struct HostedInvoice {
    pub id: String,
    pub invoice_url: String,
}

/// The seam the handlers talk through, so tests can swap the HTTP client
/// for a mock.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Cheap authenticated probe to validate a merchant-supplied secret.
    async fn test_connection(
        &self,
        secret: &str,
        environment: &str,
    ) -> anyhow::Result<()>;

    async fn create_hosted_invoice(
        &self,
        secret: &str,
        environment: &str,
        req: &HostedInvoiceRequest,
    ) -> anyhow::Result<HostedInvoice>;
}

/// The production client.
pub struct XenditClient {
    http: reqwest::Client,
    base_url: String,
}

impl XenditClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_owned())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

impl Default for XenditClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GatewayClient for XenditClient {
    async fn test_connection(
        &self,
        secret: &str,
        _environment: &str,
    ) -> anyhow::Result<()> {
        // Listing the account balance is the cheapest authenticated call.
        let response = self
            .http
            .get(format!("{}/balance", self.base_url))
            .basic_auth(secret, Some(""))
            .send()
            .await
            .context("Gateway is unreachable")?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!(
                "Gateway rejected the credentials: {}",
                response.status()
            ))
        }
    }

    async fn create_hosted_invoice(
        &self,
        secret: &str,
        _environment: &str,
        req: &HostedInvoiceRequest,
    ) -> anyhow::Result<HostedInvoice> {
        let response = self
            .http
            .post(format!("{}/v2/invoices", self.base_url))
            .basic_auth(secret, Some(""))
            .json(req)
            .send()
            .await
            .context("Gateway is unreachable")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Gateway refused to create invoice ({status}): {body}"
            ));
        }
        response
            .json::<HostedInvoice>()
            .await
            .context("Gateway returned an unexpected invoice shape")
    }
}

/// `<invoice_number>-<ms_epoch>`.
pub fn format_external_id(
    number: &InvoiceNumber,
    now: TimestampMs,
) -> String {
    format!("{}-{}", number, now.as_i64())
}

/// Constant-time comparison of the webhook callback token header against the
/// merchant's stored token.
pub fn verify_webhook_signature(
    header_token: &str,
    stored_token: &str,
) -> bool {
    ring::constant_time::verify_slices_are_equal(
        header_token.as_bytes(),
        stored_token.as_bytes(),
    )
    .is_ok()
}

/// A parsed webhook delivery.
#[derive(Clone, Debug)]
pub struct WebhookEvent {
    pub external_id: String,
    pub status: WebhookStatus,
    pub raw: Value,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum WebhookStatus {
    Paid,
    Expired,
    Other(String),
}

pub fn parse_webhook_event(body: &[u8]) -> anyhow::Result<WebhookEvent> {
    let raw: Value = serde_json::from_slice(body)
        .context("Webhook body is not valid JSON")?;
    let external_id = raw
        .get("external_id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Webhook body is missing external_id"))?
        .to_owned();
    let status = match raw.get("status").and_then(Value::as_str) {
        Some("PAID") | Some("SETTLED") => WebhookStatus::Paid,
        Some("EXPIRED") => WebhookStatus::Expired,
        Some(other) => WebhookStatus::Other(other.to_owned()),
        None => return Err(anyhow!("Webhook body is missing status")),
    };
    Ok(WebhookEvent {
        external_id,
        status,
        raw,
    })
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Accepts or rejects every call; records hosted-invoice requests.
    pub struct MockGateway {
        pub accept: bool,
        pub created: Mutex<Vec<HostedInvoiceRequest>>,
    }

    impl MockGateway {
        pub fn accepting() -> Self {
            Self {
                accept: true,
                created: Mutex::new(Vec::new()),
            }
        }

        pub fn rejecting() -> Self {
            Self {
                accept: false,
                created: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GatewayClient for MockGateway {
        async fn test_connection(
            &self,
            _secret: &str,
            _environment: &str,
        ) -> anyhow::Result<()> {
            if self.accept {
                Ok(())
            } else {
                Err(anyhow!("Gateway rejected the credentials: 401"))
            }
        }

        async fn create_hosted_invoice(
            &self,
            _secret: &str,
            _environment: &str,
            req: &HostedInvoiceRequest,
        ) -> anyhow::Result<HostedInvoice> {
            if !self.accept {
                return Err(anyhow!("Gateway refused to create invoice"));
            }
            self.created.lock().unwrap().push(req.clone());
            Ok(HostedInvoice {
                id: format!("hosted-{}", req.external_id),
                invoice_url: format!(
                    "https://checkout.test/{}",
                    req.external_id
                ),
            })
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn external_id_roundtrip() {
        let number = InvoiceNumber::from_str("INV-20240101-AAAA").unwrap();
        let now = TimestampMs::from_i64(1_700_000_000_000).unwrap();
        let external_id = format_external_id(&number, now);
        assert_eq!(external_id, "INV-20240101-AAAA-1700000000000");

        let back = InvoiceNumber::from_external_id(&external_id).unwrap();
        assert_eq!(back, number);
    }

    #[test]
    fn signature_verification() {
        assert!(verify_webhook_signature("tok_abc", "tok_abc"));
        assert!(!verify_webhook_signature("tok_abc", "tok_abd"));
        assert!(!verify_webhook_signature("tok_abc", "tok_abc_longer"));
        assert!(!verify_webhook_signature("", "tok_abc"));
    }

    #[test]
    fn webhook_parsing() {
        let body = br#"{
            "external_id": "INV-20240101-AAAA-1700000000000",
            "status": "PAID",
            "amount": 100000
        }"#;
        let event = parse_webhook_event(body).unwrap();
        assert_eq!(event.external_id, "INV-20240101-AAAA-1700000000000");
        assert_eq!(event.status, WebhookStatus::Paid);
        assert_eq!(event.raw["amount"], 100000);

        let expired =
            parse_webhook_event(br#"{"external_id": "x-1", "status": "EXPIRED"}"#)
                .unwrap();
        assert_eq!(expired.status, WebhookStatus::Expired);

        let other =
            parse_webhook_event(br#"{"external_id": "x-1", "status": "PENDING"}"#)
                .unwrap();
        assert_eq!(other.status, WebhookStatus::Other("PENDING".to_owned()));

        assert!(parse_webhook_event(b"not json").is_err());
        assert!(parse_webhook_event(br#"{"status": "PAID"}"#).is_err());
    }
}
