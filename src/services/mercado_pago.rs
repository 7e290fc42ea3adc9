use chrono::{DateTime, Utc};
use reqwest::Client;
use ring::hmac;
use serde::{Deserialize, Serialize};

pub const CURRENCY_ID: &str = "ARS";

/// How far a webhook `ts` may drift from our clock, either way
pub const SIGNATURE_TOLERANCE_SECS: i64 = 3600;

#[derive(thiserror::Error, Debug)]
pub enum MercadoPagoError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Mercado Pago API error: {0}")]
    ApiError(String),

    #[error("Payment {0} not found")]
    PaymentNotFound(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook signature timestamp is outside the accepted window")]
    StaleSignature,

    #[error("Invalid payment id: {0:?}")]
    InvalidPaymentId(String),
}

/// Payment ids are numeric; anything else must not reach a request path
pub fn is_payment_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 20 && id.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Serialize)]
pub struct PreferenceItem {
    pub title: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub currency_id: String,
}

#[derive(Debug, Serialize)]
pub struct PreferencePayer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct BackUrls {
    pub success: String,
    pub failure: String,
    pub pending: String,
}

/// Body of POST /checkout/preferences
#[derive(Debug, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub payer: PreferencePayer,
    pub external_reference: String,
    pub notification_url: String,
    pub back_urls: BackUrls,
    pub auto_return: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreferenceResponse {
    pub id: String,
    pub init_point: String,
    #[serde(default)]
    pub sandbox_init_point: Option<String>,
}

/// Subset of GET /v1/payments/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInfo {
    pub id: i64,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    pub transaction_amount: f64,
    #[serde(default)]
    pub date_approved: Option<DateTime<Utc>>,
}

impl PaymentInfo {
    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }

    pub fn amount_cents(&self) -> i64 {
        (self.transaction_amount * 100.0).round() as i64
    }
}

/// Converts cents to the decimal amount the API expects
pub fn cents_to_amount(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Thin client over the Mercado Pago REST API.
///
/// The access token is passed per call because tenants may connect their
/// own account.
#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    http: Client,
    api_base_url: String,
}

impl MercadoPagoClient {
    pub fn new(http: Client, api_base_url: &str) -> Self {
        Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    #[tracing::instrument(skip(self, access_token, request), fields(external_reference = %request.external_reference))]
    pub async fn create_preference(
        &self,
        access_token: &str,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, MercadoPagoError> {
        let url = format!("{}/checkout/preferences", self.api_base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status = %status, error = %error_text, "Preference creation failed");
            return Err(MercadoPagoError::ApiError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let preference: PreferenceResponse = response.json().await.map_err(|e| {
            MercadoPagoError::ApiError(format!("Failed to parse preference response: {}", e))
        })?;

        tracing::info!(preference_id = %preference.id, "Checkout preference created");

        Ok(preference)
    }

    #[tracing::instrument(skip(self, access_token))]
    pub async fn get_payment(
        &self,
        access_token: &str,
        payment_id: &str,
    ) -> Result<PaymentInfo, MercadoPagoError> {
        if !is_payment_id(payment_id) {
            return Err(MercadoPagoError::InvalidPaymentId(payment_id.to_string()));
        }
        let url = format!("{}/v1/payments/{}", self.api_base_url, payment_id);

        let response = self.http.get(&url).bearer_auth(access_token).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(MercadoPagoError::PaymentNotFound(payment_id.to_string()));
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status = %status, error = %error_text, "Payment lookup failed");
            return Err(MercadoPagoError::ApiError(format!(
                "Status {}: {}",
                status, error_text
            )));
        }

        let payment: PaymentInfo = response.json().await.map_err(|e| {
            MercadoPagoError::ApiError(format!("Failed to parse payment response: {}", e))
        })?;

        tracing::debug!(payment_id = payment.id, status = %payment.status, "Fetched payment");

        Ok(payment)
    }
}

/// Parsed `x-signature` header (`ts=<unix>,v1=<hex hmac>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub ts: String,
    pub v1: String,
}

pub fn parse_signature_header(header: &str) -> Option<SignatureHeader> {
    let mut ts = None;
    let mut v1 = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("ts", value)) => ts = Some(value.trim().to_string()),
            Some(("v1", value)) => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Some(SignatureHeader { ts: ts?, v1: v1? })
}

/// Message Mercado Pago signs for a webhook delivery
pub fn signature_manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    // Alphanumeric ids are signed in lowercase
    let data_id = if data_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        data_id.to_lowercase()
    } else {
        data_id.to_string()
    };
    format!("id:{};request-id:{};ts:{};", data_id, request_id, ts)
}

/// Signature time; `ts` is Unix seconds, millisecond stamps are accepted too
pub fn signature_timestamp(ts: &str) -> Option<DateTime<Utc>> {
    let value: i64 = ts.parse().ok()?;
    if value >= 100_000_000_000 {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// Checks the HMAC-SHA256 of a webhook delivery in constant time, then that
/// it was signed within [`SIGNATURE_TOLERANCE_SECS`] of `now`
pub fn verify_webhook_signature(
    secret: &str,
    signature_header: &str,
    request_id: &str,
    data_id: &str,
    now: DateTime<Utc>,
) -> Result<(), MercadoPagoError> {
    let header = parse_signature_header(signature_header).ok_or(MercadoPagoError::InvalidSignature)?;
    let expected = hex::decode(&header.v1).map_err(|_| MercadoPagoError::InvalidSignature)?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let manifest = signature_manifest(data_id, request_id, &header.ts);

    hmac::verify(&key, manifest.as_bytes(), &expected).map_err(|_| MercadoPagoError::InvalidSignature)?;

    let signed_at = signature_timestamp(&header.ts).ok_or(MercadoPagoError::InvalidSignature)?;
    if (now - signed_at).num_seconds().abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(MercadoPagoError::StaleSignature);
    }

    Ok(())
}

#[cfg(test)]
pub(crate) fn sign_for_tests(secret: &str, data_id: &str, request_id: &str, ts: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, signature_manifest(data_id, request_id, ts).as_bytes());
    format!("ts={},v1={}", ts, hex::encode(tag.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_signature_header() {
        assert_eq!(
            parse_signature_header("ts=1704908010, v1=abcdef"),
            Some(SignatureHeader {
                ts: "1704908010".to_string(),
                v1: "abcdef".to_string()
            })
        );
        assert_eq!(parse_signature_header("v1=abcdef"), None);
        assert_eq!(parse_signature_header("garbage"), None);
    }

    #[test]
    fn test_signature_manifest_lowercases_alphanumeric_ids() {
        assert_eq!(
            signature_manifest("ABC123", "req-1", "42"),
            "id:abc123;request-id:req-1;ts:42;"
        );
        assert_eq!(
            signature_manifest("A-1", "req-1", "42"),
            "id:A-1;request-id:req-1;ts:42;"
        );
    }

    fn at(ts: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(ts, 0).unwrap()
    }

    #[test]
    fn test_verify_webhook_signature() {
        let header = sign_for_tests("secret", "123456", "req-1", "1704908010");
        let now = at(1704908010 + 5);

        assert!(verify_webhook_signature("secret", &header, "req-1", "123456", now).is_ok());
        assert!(verify_webhook_signature("other", &header, "req-1", "123456", now).is_err());
        assert!(verify_webhook_signature("secret", &header, "req-2", "123456", now).is_err());
        assert!(verify_webhook_signature("secret", &header, "req-1", "999", now).is_err());
        assert!(verify_webhook_signature("secret", "ts=1,v1=nothex", "req-1", "123456", now).is_err());
    }

    #[test]
    fn test_replayed_signature_is_stale() {
        let header = sign_for_tests("secret", "123456", "req-1", "1704908010");

        let late = at(1704908010 + SIGNATURE_TOLERANCE_SECS + 1);
        assert!(matches!(
            verify_webhook_signature("secret", &header, "req-1", "123456", late),
            Err(MercadoPagoError::StaleSignature)
        ));

        let early = at(1704908010 - SIGNATURE_TOLERANCE_SECS - 1);
        assert!(matches!(
            verify_webhook_signature("secret", &header, "req-1", "123456", early),
            Err(MercadoPagoError::StaleSignature)
        ));
    }

    #[test]
    fn test_signature_timestamp_units() {
        assert_eq!(signature_timestamp("1704908010"), Some(at(1704908010)));
        assert_eq!(signature_timestamp("1704908010000"), Some(at(1704908010)));
        assert_eq!(signature_timestamp("soon"), None);
    }

    #[test]
    fn test_is_payment_id() {
        assert!(is_payment_id("1234567890"));
        assert!(!is_payment_id(""));
        assert!(!is_payment_id("../users/me"));
        assert!(!is_payment_id("12?x=1"));
        assert!(!is_payment_id("123456789012345678901"));
    }

    #[test]
    fn test_amount_conversions() {
        assert_eq!(cents_to_amount(150_050), 1500.5);

        let info: PaymentInfo = serde_json::from_value(serde_json::json!({
            "id": 1,
            "status": "approved",
            "transaction_amount": 1500.5,
            "date_approved": "2024-03-10T10:00:00.000-03:00"
        }))
        .unwrap();
        assert_eq!(info.amount_cents(), 150_050);
        assert!(info.is_approved());
        assert_eq!(
            info.date_approved.unwrap().to_rfc3339(),
            "2024-03-10T13:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_create_preference() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/preferences"))
            .and(header("authorization", "Bearer TEST-TOKEN"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": "pref-1",
                "init_point": "https://mp.example/checkout/pref-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MercadoPagoClient::new(Client::new(), &server.uri());
        let request = PreferenceRequest {
            items: vec![PreferenceItem {
                title: "Seña Corte".to_string(),
                quantity: 1,
                unit_price: 1000.0,
                currency_id: CURRENCY_ID.to_string(),
            }],
            payer: PreferencePayer {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
            },
            external_reference: "booking-1".to_string(),
            notification_url: "http://localhost/api/webhooks/mercadopago".to_string(),
            back_urls: BackUrls {
                success: "http://localhost/ok".to_string(),
                failure: "http://localhost/fail".to_string(),
                pending: "http://localhost/pending".to_string(),
            },
            auto_return: "approved".to_string(),
        };

        let preference = client.create_preference("TEST-TOKEN", &request).await.unwrap();
        assert_eq!(preference.id, "pref-1");
        assert_eq!(preference.init_point, "https://mp.example/checkout/pref-1");
    }

    #[tokio::test]
    async fn test_create_preference_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .mount(&server)
            .await;

        let client = MercadoPagoClient::new(Client::new(), &server.uri());
        let request = PreferenceRequest {
            items: vec![],
            payer: PreferencePayer {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
            },
            external_reference: "booking-1".to_string(),
            notification_url: String::new(),
            back_urls: BackUrls {
                success: String::new(),
                failure: String::new(),
                pending: String::new(),
            },
            auto_return: "approved".to_string(),
        };

        let err = client.create_preference("TOKEN", &request).await.unwrap_err();
        assert!(matches!(err, MercadoPagoError::ApiError(msg) if msg.contains("bad request")));
    }

    #[tokio::test]
    async fn test_get_payment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 42,
                "status": "approved",
                "status_detail": "accredited",
                "external_reference": "7f1c1f0e-0000-0000-0000-000000000000",
                "transaction_amount": 2500.0,
                "date_approved": "2024-03-10T10:00:00.000-03:00"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/payments/404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = MercadoPagoClient::new(Client::new(), &format!("{}/", server.uri()));

        let payment = client.get_payment("TOKEN", "42").await.unwrap();
        assert_eq!(payment.id, 42);
        assert_eq!(payment.status_detail.as_deref(), Some("accredited"));
        assert_eq!(payment.amount_cents(), 250_000);

        assert!(matches!(
            client.get_payment("TOKEN", "404").await,
            Err(MercadoPagoError::PaymentNotFound(id)) if id == "404"
        ));
    }

    #[tokio::test]
    async fn test_get_payment_rejects_non_numeric_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = MercadoPagoClient::new(Client::new(), &server.uri());

        assert!(matches!(
            client.get_payment("TOKEN", "../../users/me").await,
            Err(MercadoPagoError::InvalidPaymentId(_))
        ));
    }
}
