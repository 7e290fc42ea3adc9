use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

pub const ACTION_LOGIN_SUCCEEDED: &str = "auth.login_succeeded";
pub const ACTION_LOGIN_FAILED: &str = "auth.login_failed";
pub const ACTION_TENANT_REGISTERED: &str = "tenant.registered";
pub const ACTION_TENANT_STATUS_CHANGED: &str = "admin.tenant_status_changed";
pub const ACTION_SUBSCRIPTION_CHANGED: &str = "admin.subscription_changed";
pub const ACTION_SUBSCRIPTION_ROLLED: &str = "subscription.rolled";
pub const ACTION_BOOKING_STATUS_CHANGED: &str = "booking.status_changed";
pub const ACTION_PAYMENT_RECEIVED: &str = "payment.received";
pub const ACTION_WEBHOOK_REJECTED: &str = "webhook.signature_rejected";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub actor: String, // "admin", "system", "tenant:<id>", "mercadopago"
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAuditLog {
    pub tenant_id: Option<Uuid>,
    pub actor: String,
    pub action: &'static str,
    pub entity_type: Option<&'static str>,
    pub entity_id: Option<String>,
    pub ip_address: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditLogFilter {
    pub tenant_id: Option<Uuid>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FailedLoginsByIp {
    pub ip_address: Option<String>,
    pub attempts: i64,
    pub distinct_emails: i64,
    pub last_attempt_at: DateTime<Utc>,
}

impl AuditLog {
    pub async fn record(pool: &PgPool, entry: NewAuditLog) -> Result<Self, sqlx::Error> {
        let log = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO audit_logs (tenant_id, actor, action, entity_type, entity_id, ip_address, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(entry.tenant_id)
        .bind(&entry.actor)
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.ip_address)
        .bind(&entry.metadata)
        .fetch_one(pool)
        .await?;

        Ok(log)
    }

    /// Records an entry, logging instead of failing when the insert errors.
    ///
    /// Used on paths where the audited operation has already succeeded.
    pub async fn record_quietly(pool: &PgPool, entry: NewAuditLog) {
        let action = entry.action;
        if let Err(e) = Self::record(pool, entry).await {
            tracing::error!(action, error = %e, "Failed to write audit log");
        }
    }

    pub async fn list(
        pool: &PgPool,
        filter: &AuditLogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Self>, i64), sqlx::Error> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filter(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM audit_logs");
        push_audit_filter(&mut query, filter);
        query.push(" ORDER BY created_at DESC LIMIT ");
        query.push_bind(limit);
        query.push(" OFFSET ");
        query.push_bind(offset);

        let logs = query.build_query_as::<Self>().fetch_all(pool).await?;

        Ok((logs, total))
    }

    /// Failed login attempts for an email since `since`
    pub async fn count_failed_logins(
        pool: &PgPool,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM audit_logs
            WHERE action = $1
              AND entity_id = LOWER($2)
              AND created_at >= $3
            "#,
        )
        .bind(ACTION_LOGIN_FAILED)
        .bind(email)
        .bind(since)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn failed_logins_by_ip(
        pool: &PgPool,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FailedLoginsByIp>, sqlx::Error> {
        let rows = sqlx::query_as::<_, FailedLoginsByIp>(
            r#"
            SELECT
                ip_address,
                COUNT(*) AS attempts,
                COUNT(DISTINCT entity_id) AS distinct_emails,
                MAX(created_at) AS last_attempt_at
            FROM audit_logs
            WHERE action = $1 AND created_at >= $2
            GROUP BY ip_address
            ORDER BY attempts DESC
            LIMIT $3
            "#,
        )
        .bind(ACTION_LOGIN_FAILED)
        .bind(since)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Emails with at least `threshold` failures since `since`
    pub async fn count_locked_emails(
        pool: &PgPool,
        since: DateTime<Utc>,
        threshold: i64,
    ) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM (
                SELECT entity_id FROM audit_logs
                WHERE action = $1 AND created_at >= $2
                GROUP BY entity_id
                HAVING COUNT(*) >= $3
            ) locked
            "#,
        )
        .bind(ACTION_LOGIN_FAILED)
        .bind(since)
        .bind(threshold)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }

    pub async fn count_since(
        pool: &PgPool,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM audit_logs WHERE action = $1 AND created_at >= $2
            "#,
        )
        .bind(action)
        .bind(since)
        .fetch_one(pool)
        .await?;

        Ok(count)
    }
}

fn push_audit_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &AuditLogFilter) {
    query.push(" WHERE TRUE");

    if let Some(tenant_id) = filter.tenant_id {
        query.push(" AND tenant_id = ");
        query.push_bind(tenant_id);
    }
    if let Some(action) = filter.action.as_deref().filter(|a| !a.is_empty()) {
        query.push(" AND action = ");
        query.push_bind(action.to_string());
    }
    if let Some(from) = filter.from {
        query.push(" AND created_at >= ");
        query.push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND created_at <= ");
        query.push_bind(to);
    }
}
