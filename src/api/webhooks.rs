use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::middleware::auth::client_ip;
use crate::api::middleware::session::AppState;
use crate::error::AppError;
use crate::models::audit_log::{self, AuditLog, NewAuditLog};
use crate::services::mercado_pago;
use crate::services::payments::PaymentError;

/// Query string of a Mercado Pago notification.
///
/// `tenant` is added by us to the notification URL; the rest comes from
/// Mercado Pago (`type`/`data.id` for webhooks, `topic`/`id` for legacy IPN).
#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    pub tenant: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub topic: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationData {
    pub id: Value,
}

/// The `(type, resource id)` a notification refers to
pub fn notification_target(
    query: &NotificationQuery,
    body: Option<&NotificationBody>,
) -> (Option<String>, Option<String>) {
    let kind = query
        .kind
        .clone()
        .or_else(|| body.and_then(|b| b.kind.clone()))
        .or_else(|| query.topic.clone());

    let body_id = body
        .and_then(|b| b.data.as_ref())
        .and_then(|d| match &d.id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    let id = query.data_id.clone().or(body_id).or_else(|| query.id.clone());

    (kind, id)
}

async fn mercadopago_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<NotificationQuery>,
    body: Option<Json<NotificationBody>>,
) -> Result<StatusCode, AppError> {
    let body = body.map(|Json(b)| b);
    let (kind, data_id) = notification_target(&query, body.as_ref());

    let (Some(tenant_id), Some(data_id)) = (query.tenant, data_id) else {
        tracing::warn!(?query, "Malformed Mercado Pago notification");
        return Err(AppError::Validation(
            "notification is missing the tenant or resource id".to_string(),
        ));
    };

    let is_payment = kind.as_deref() == Some("payment");
    if is_payment && !mercado_pago::is_payment_id(&data_id) {
        tracing::warn!(%tenant_id, ?data_id, "Payment notification with a malformed id");
        return Err(AppError::Validation(format!(
            "invalid payment id: {:?}",
            data_id
        )));
    }

    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
    let request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok());

    if let Err(e) = state
        .payments
        .verify_notification(signature, request_id, &data_id, chrono::Utc::now())
    {
        AuditLog::record_quietly(
            &state.pool,
            NewAuditLog {
                tenant_id: Some(tenant_id),
                actor: "mercadopago".to_string(),
                action: audit_log::ACTION_WEBHOOK_REJECTED,
                entity_type: Some("payment"),
                entity_id: Some(data_id.clone()),
                ip_address: client_ip(&headers),
                metadata: Some(json!({ "request_id": request_id })),
            },
        )
        .await;
        tracing::warn!(%tenant_id, %data_id, "Rejected webhook with invalid signature");
        return Err(e.into());
    }

    if !is_payment {
        tracing::debug!(?kind, %data_id, "Ignoring non-payment notification");
        return Ok(StatusCode::OK);
    }

    match state
        .payments
        .handle_payment_notification(&state.pool, tenant_id, &data_id)
        .await
    {
        Ok(_) => Ok(StatusCode::OK),
        // Acknowledge so Mercado Pago stops retrying notifications we can never process
        Err(PaymentError::TenantNotFound) => {
            tracing::warn!(%tenant_id, "Notification for unknown tenant");
            Ok(StatusCode::OK)
        }
        Err(e) => {
            tracing::error!(%tenant_id, %data_id, error = %e, "Failed to process payment notification");
            Err(e.into())
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/mercadopago", post(mercadopago_webhook))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_target_prefers_query() {
        let query = NotificationQuery {
            kind: Some("payment".to_string()),
            data_id: Some("111".to_string()),
            ..Default::default()
        };
        let body = NotificationBody {
            kind: Some("merchant_order".to_string()),
            data: Some(NotificationData { id: json!("222") }),
        };
        assert_eq!(
            notification_target(&query, Some(&body)),
            (Some("payment".to_string()), Some("111".to_string()))
        );
    }

    #[test]
    fn test_notification_target_from_body_and_legacy_ipn() {
        let body = NotificationBody {
            kind: Some("payment".to_string()),
            data: Some(NotificationData { id: json!(333) }),
        };
        assert_eq!(
            notification_target(&NotificationQuery::default(), Some(&body)),
            (Some("payment".to_string()), Some("333".to_string()))
        );

        let legacy = NotificationQuery {
            topic: Some("payment".to_string()),
            id: Some("444".to_string()),
            ..Default::default()
        };
        assert_eq!(
            notification_target(&legacy, None),
            (Some("payment".to_string()), Some("444".to_string()))
        );
    }
}
