use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    audit_log::{self, AuditLog, NewAuditLog},
    booking::{Booking, BookingStatus},
    customer::Customer,
    payment::{Payment, RecordPaymentData},
    service::Service,
    tenant::Tenant,
};
use crate::services::bookings::{self, BookingError};
use crate::services::encryption::{EncryptionError, TokenCipher};
use crate::services::mercado_pago::{
    self, BackUrls, MercadoPagoClient, MercadoPagoError, PreferenceItem, PreferencePayer,
    PreferenceRequest, CURRENCY_ID,
};

#[derive(thiserror::Error, Debug)]
pub enum PaymentError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error(transparent)]
    MercadoPago(#[from] MercadoPagoError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Mercado Pago is not configured for this business")]
    NotConfigured,

    #[error("Tenant not found")]
    TenantNotFound,

    #[error("This booking does not require a deposit")]
    NoDepositRequired,

    #[error("Booking is {0}, deposits can only be paid for pending bookings")]
    BookingNotPending(String),
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::DatabaseError(e) => AppError::Database(e),
            PaymentError::Booking(e) => e.into(),
            PaymentError::MercadoPago(
                MercadoPagoError::InvalidSignature | MercadoPagoError::StaleSignature,
            ) => AppError::Unauthorized,
            PaymentError::MercadoPago(MercadoPagoError::InvalidPaymentId(id)) => {
                AppError::Validation(format!("Invalid payment id: {:?}", id))
            }
            PaymentError::MercadoPago(MercadoPagoError::PaymentNotFound(id)) => {
                AppError::NotFound(format!("Payment {} not found", id))
            }
            PaymentError::MercadoPago(e) => AppError::PaymentProvider(e.to_string()),
            PaymentError::Encryption(e) => AppError::Internal(anyhow::anyhow!(e)),
            PaymentError::TenantNotFound => AppError::NotFound(err.to_string()),
            PaymentError::NotConfigured
            | PaymentError::NoDepositRequired
            | PaymentError::BookingNotPending(_) => AppError::Validation(err.to_string()),
        }
    }
}

/// Where to send the customer to pay a deposit
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub preference_id: String,
    pub checkout_url: String,
    pub amount_cents: i64,
}

/// Outcome of a processed payment notification
#[derive(Debug, Clone, Serialize)]
pub struct NotificationOutcome {
    pub payment: Payment,
    pub booking_confirmed: bool,
}

/// Deposit payments through Mercado Pago.
///
/// Tenants may connect their own account; their token is stored sealed with
/// [`TokenCipher`]. Without one, the platform token from configuration is used.
#[derive(Debug, Clone)]
pub struct PaymentGateway {
    client: MercadoPagoClient,
    cipher: TokenCipher,
    platform_token: Option<Secret<String>>,
    webhook_secret: Option<Secret<String>>,
    base_url: String,
    frontend_url: String,
}

impl PaymentGateway {
    pub fn from_config(config: &Config, http: Client) -> Self {
        Self {
            client: MercadoPagoClient::new(http, &config.mercadopago_api_url),
            cipher: TokenCipher::new(&config.encryption_key),
            platform_token: config.mercadopago_access_token.clone(),
            webhook_secret: config.mercadopago_webhook_secret.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
        }
    }

    /// True when deposits can be charged without a tenant token
    pub fn has_platform_token(&self) -> bool {
        self.platform_token.is_some()
    }

    pub fn can_charge(&self, tenant: &Tenant) -> bool {
        tenant.mp_access_token.is_some() || self.has_platform_token()
    }

    pub fn seal_tenant_token(&self, tenant_id: Uuid, token: &str) -> Result<Vec<u8>, PaymentError> {
        Ok(self.cipher.encrypt(tenant_id, token)?)
    }

    /// Access token used to act on behalf of `tenant`
    pub fn access_token_for(&self, tenant: &Tenant) -> Result<Secret<String>, PaymentError> {
        match (&tenant.mp_access_token, &self.platform_token) {
            (Some(sealed), _) => Ok(Secret::new(self.cipher.decrypt(tenant.id, sealed)?)),
            (None, Some(platform)) => Ok(platform.clone()),
            (None, None) => Err(PaymentError::NotConfigured),
        }
    }

    pub fn notification_url(&self, tenant_id: Uuid) -> String {
        format!(
            "{}/api/webhooks/mercadopago?tenant={}",
            self.base_url, tenant_id
        )
    }

    fn back_urls(&self, tenant: &Tenant, booking_id: Uuid) -> BackUrls {
        let base = format!("{}/{}/bookings/{}", self.frontend_url, tenant.slug, booking_id);
        BackUrls {
            success: format!("{}?payment=success", base),
            failure: format!("{}?payment=failure", base),
            pending: format!("{}?payment=pending", base),
        }
    }

    /// Creates a checkout preference for a pending booking's deposit
    #[tracing::instrument(skip(self, pool, tenant, booking, service, customer), fields(tenant_id = %tenant.id, booking_id = %booking.id))]
    pub async fn start_deposit_checkout(
        &self,
        pool: &PgPool,
        tenant: &Tenant,
        booking: &Booking,
        service: &Service,
        customer: &Customer,
    ) -> Result<CheckoutSession, PaymentError> {
        if booking.deposit_cents <= 0 {
            return Err(PaymentError::NoDepositRequired);
        }
        if booking.status() != Ok(BookingStatus::Pending) {
            return Err(PaymentError::BookingNotPending(booking.status.clone()));
        }

        let token = self.access_token_for(tenant)?;

        let request = PreferenceRequest {
            items: vec![PreferenceItem {
                title: format!("Seña: {} ({})", service.name, tenant.name),
                quantity: 1,
                unit_price: mercado_pago::cents_to_amount(booking.deposit_cents),
                currency_id: CURRENCY_ID.to_string(),
            }],
            payer: PreferencePayer {
                name: customer.name.clone(),
                email: customer.email.clone(),
            },
            external_reference: booking.id.to_string(),
            notification_url: self.notification_url(tenant.id),
            back_urls: self.back_urls(tenant, booking.id),
            auto_return: "approved".to_string(),
        };

        let preference = self
            .client
            .create_preference(token.expose_secret(), &request)
            .await?;

        Payment::create_pending(
            pool,
            tenant.id,
            booking.id,
            &preference.id,
            booking.deposit_cents,
        )
        .await?;

        Ok(CheckoutSession {
            preference_id: preference.id,
            checkout_url: preference.init_point,
            amount_cents: booking.deposit_cents,
        })
    }

    /// Verifies a webhook delivery. Deliveries are accepted unchecked when
    /// no webhook secret is configured.
    pub fn verify_notification(
        &self,
        signature_header: Option<&str>,
        request_id: Option<&str>,
        data_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        let Some(secret) = &self.webhook_secret else {
            tracing::warn!("Mercado Pago webhook secret not configured, skipping signature check");
            return Ok(());
        };

        let (Some(signature), Some(request_id)) = (signature_header, request_id) else {
            return Err(MercadoPagoError::InvalidSignature.into());
        };

        mercado_pago::verify_webhook_signature(
            secret.expose_secret(),
            signature,
            request_id,
            data_id,
            now,
        )?;
        Ok(())
    }

    /// Fetches a notified payment, stores it and confirms the booking once
    /// the deposit is approved.
    ///
    /// Returns `None` for payments that do not reference a booking of the
    /// tenant; those are acknowledged and ignored.
    #[tracing::instrument(skip(self, pool))]
    pub async fn handle_payment_notification(
        &self,
        pool: &PgPool,
        tenant_id: Uuid,
        payment_id: &str,
    ) -> Result<Option<NotificationOutcome>, PaymentError> {
        let tenant = Tenant::find_by_id(pool, tenant_id)
            .await?
            .ok_or(PaymentError::TenantNotFound)?;

        let token = self.access_token_for(&tenant)?;
        let info = self.client.get_payment(token.expose_secret(), payment_id).await?;

        let Some(booking_id) = info
            .external_reference
            .as_deref()
            .and_then(|r| Uuid::parse_str(r).ok())
        else {
            tracing::warn!(payment_id, "Payment without a booking reference, ignoring");
            return Ok(None);
        };

        let Some(booking) = Booking::find_for_tenant(pool, tenant.id, booking_id).await? else {
            tracing::warn!(payment_id, %booking_id, "Payment references an unknown booking, ignoring");
            return Ok(None);
        };

        let payment = Payment::record(
            pool,
            RecordPaymentData {
                tenant_id: tenant.id,
                booking_id: booking.id,
                mp_payment_id: info.id.to_string(),
                status: info.status.clone(),
                status_detail: info.status_detail.clone(),
                amount_cents: info.amount_cents(),
                paid_at: approved_at(info.is_approved(), info.date_approved),
            },
        )
        .await?;

        let booking_confirmed = if should_confirm(&booking, info.is_approved()) {
            match bookings::change_status(pool, tenant.id, booking.id, BookingStatus::Confirmed, None)
                .await
            {
                Ok(_) => true,
                // Confirmed or cancelled in the meantime
                Err(BookingError::InvalidTransition { .. } | BookingError::ConcurrentUpdate) => false,
                Err(e) => return Err(e.into()),
            }
        } else {
            false
        };

        AuditLog::record_quietly(
            pool,
            NewAuditLog {
                tenant_id: Some(tenant.id),
                actor: "mercadopago".to_string(),
                action: audit_log::ACTION_PAYMENT_RECEIVED,
                entity_type: Some("payment"),
                entity_id: Some(payment.id.to_string()),
                metadata: Some(json!({
                    "mp_payment_id": info.id,
                    "status": info.status,
                    "booking_id": booking.id,
                    "booking_confirmed": booking_confirmed,
                })),
                ..Default::default()
            },
        )
        .await;

        tracing::info!(
            payment_id = %payment.id,
            status = %payment.status,
            booking_confirmed,
            "Payment notification processed"
        );

        Ok(Some(NotificationOutcome {
            payment,
            booking_confirmed,
        }))
    }
}

fn approved_at(approved: bool, date_approved: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    if approved {
        Some(date_approved.unwrap_or_else(Utc::now))
    } else {
        None
    }
}

/// An approved deposit confirms a booking that is still waiting for it
pub fn should_confirm(booking: &Booking, approved: bool) -> bool {
    approved && booking.status() == Ok(BookingStatus::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tenant() -> Tenant {
        Tenant {
            id: Uuid::new_v4(),
            slug: "peluqueria-ana".to_string(),
            name: "Peluquería Ana".to_string(),
            email: "ana@example.com".to_string(),
            password_hash: String::new(),
            phone: None,
            address: None,
            description: None,
            utc_offset_minutes: -180,
            slot_interval_minutes: 30,
            booking_window_days: 60,
            mp_access_token: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn booking(status: BookingStatus, deposit_cents: i64) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            service_id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            employee_id: None,
            booking_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            start_time: "09:00".to_string(),
            end_time: "09:30".to_string(),
            status: status.as_str().to_string(),
            price_cents: 500_000,
            deposit_cents,
            notes: None,
            cancellation_reason: None,
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn gateway(config: &Config) -> PaymentGateway {
        PaymentGateway::from_config(config, Client::new())
    }

    #[test]
    fn test_tenant_token_takes_precedence() {
        let mut config = Config::for_tests();
        config.mercadopago_access_token = Some(Secret::new("PLATFORM".to_string()));
        let gateway = gateway(&config);

        let mut tenant = tenant();
        assert_eq!(gateway.access_token_for(&tenant).unwrap().expose_secret(), "PLATFORM");

        tenant.mp_access_token = Some(gateway.seal_tenant_token(tenant.id, "TENANT").unwrap());
        assert_eq!(gateway.access_token_for(&tenant).unwrap().expose_secret(), "TENANT");
    }

    #[test]
    fn test_no_token_is_not_configured() {
        let gateway = gateway(&Config::for_tests());
        let tenant = tenant();
        assert!(!gateway.can_charge(&tenant));
        assert!(matches!(
            gateway.access_token_for(&tenant),
            Err(PaymentError::NotConfigured)
        ));
    }

    #[test]
    fn test_notification_url_carries_tenant() {
        let gateway = gateway(&Config::for_tests());
        let id = Uuid::nil();
        assert_eq!(
            gateway.notification_url(id),
            "http://localhost:3000/api/webhooks/mercadopago?tenant=00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_verify_notification() {
        let config = Config::for_tests();
        let gateway = gateway(&config);
        let header = mercado_pago::sign_for_tests("test-webhook-secret", "123", "req-1", "1700000000");
        let now = DateTime::from_timestamp(1700000060, 0).unwrap();

        assert!(gateway
            .verify_notification(Some(&header), Some("req-1"), "123", now)
            .is_ok());
        assert!(gateway
            .verify_notification(Some(&header), Some("req-1"), "456", now)
            .is_err());
        assert!(gateway.verify_notification(None, Some("req-1"), "123", now).is_err());

        let replayed = now + chrono::Duration::days(1);
        assert!(matches!(
            gateway
                .verify_notification(Some(&header), Some("req-1"), "123", replayed)
                .map_err(AppError::from),
            Err(AppError::Unauthorized)
        ));

        let mut unsigned = Config::for_tests();
        unsigned.mercadopago_webhook_secret = None;
        assert!(PaymentGateway::from_config(&unsigned, Client::new())
            .verify_notification(None, None, "123", now)
            .is_ok());
    }

    #[test]
    fn test_should_confirm_only_pending_bookings() {
        assert!(should_confirm(&booking(BookingStatus::Pending, 100), true));
        assert!(!should_confirm(&booking(BookingStatus::Pending, 100), false));
        assert!(!should_confirm(&booking(BookingStatus::Cancelled, 100), true));
        assert!(!should_confirm(&booking(BookingStatus::Confirmed, 100), true));
    }

    #[test]
    fn test_approved_at() {
        assert_eq!(approved_at(false, Some(Utc::now())), None);
        assert!(approved_at(true, None).is_some());
    }

    #[tokio::test]
    async fn test_checkout_requires_pending_deposit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/preferences"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut config = Config::for_tests();
        config.mercadopago_api_url = server.uri();
        config.mercadopago_access_token = Some(Secret::new("PLATFORM".to_string()));
        let gateway = gateway(&config);

        // Never reaches the database: both cases fail before any query
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let tenant = tenant();
        let customer = Customer {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            phone: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let service = Service {
            id: Uuid::new_v4(),
            tenant_id: tenant.id,
            name: "Corte".to_string(),
            description: None,
            duration_minutes: 30,
            price_cents: 500_000,
            deposit_cents: 100_000,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let result = gateway
            .start_deposit_checkout(&pool, &tenant, &booking(BookingStatus::Pending, 0), &service, &customer)
            .await;
        assert!(matches!(result, Err(PaymentError::NoDepositRequired)));

        let result = gateway
            .start_deposit_checkout(
                &pool,
                &tenant,
                &booking(BookingStatus::Confirmed, 100_000),
                &service,
                &customer,
            )
            .await;
        assert!(matches!(result, Err(PaymentError::BookingNotPending(s)) if s == "CONFIRMED"));
    }
}
