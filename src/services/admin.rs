use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    audit_log::{self, AuditLog, FailedLoginsByIp, NewAuditLog},
    subscription::{Plan, Subscription, SubscriptionStatus},
    tenant::Tenant,
};
use crate::services::auth::{LOCKOUT_WINDOW_MINUTES, MAX_FAILED_LOGINS};

const SECURITY_WINDOW_HOURS: i64 = 24;
const TOP_OFFENDING_IPS: i64 = 20;

#[derive(Debug, Serialize)]
pub struct SecuritySummary {
    pub window_hours: i64,
    pub failed_logins: i64,
    pub failed_logins_by_ip: Vec<FailedLoginsByIp>,
    pub locked_emails: i64,
    pub rejected_webhooks: i64,
}

pub async fn security_summary(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<SecuritySummary, sqlx::Error> {
    let since = now - Duration::hours(SECURITY_WINDOW_HOURS);
    let lockout_since = now - Duration::minutes(LOCKOUT_WINDOW_MINUTES);

    Ok(SecuritySummary {
        window_hours: SECURITY_WINDOW_HOURS,
        failed_logins: AuditLog::count_since(pool, audit_log::ACTION_LOGIN_FAILED, since).await?,
        failed_logins_by_ip: AuditLog::failed_logins_by_ip(pool, since, TOP_OFFENDING_IPS).await?,
        locked_emails: AuditLog::count_locked_emails(pool, lockout_since, MAX_FAILED_LOGINS)
            .await?,
        rejected_webhooks: AuditLog::count_since(pool, audit_log::ACTION_WEBHOOK_REJECTED, since)
            .await?,
    })
}

#[derive(Debug, Serialize)]
pub struct PlatformStats {
    pub tenants_total: i64,
    pub tenants_active: i64,
    pub tenants_by_plan: Vec<PlanCount>,
    pub bookings_this_month: i64,
    pub new_tenants_this_month: i64,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PlanCount {
    pub plan: String,
    pub tenants: i64,
}

/// First day of the month `now` falls in
pub fn month_start(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.with_day(1).unwrap_or(today)
}

pub async fn platform_stats(pool: &PgPool, now: DateTime<Utc>) -> Result<PlatformStats, sqlx::Error> {
    let first_day = month_start(now);

    let (tenants_total, tenants_active, new_tenants_this_month): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE is_active),
            COUNT(*) FILTER (WHERE created_at >= $1::date)
        FROM tenants
        "#,
    )
    .bind(first_day)
    .fetch_one(pool)
    .await?;

    let tenants_by_plan = sqlx::query_as::<_, PlanCount>(
        r#"
        SELECT plan, COUNT(*) AS tenants
        FROM subscriptions
        GROUP BY plan
        ORDER BY plan
        "#,
    )
    .fetch_all(pool)
    .await?;

    let bookings_this_month: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM bookings WHERE booking_date >= $1
        "#,
    )
    .bind(first_day)
    .fetch_one(pool)
    .await?;

    Ok(PlatformStats {
        tenants_total,
        tenants_active,
        tenants_by_plan,
        bookings_this_month,
        new_tenants_this_month,
    })
}

#[tracing::instrument(skip(pool, ip_address))]
pub async fn set_tenant_active(
    pool: &PgPool,
    tenant_id: Uuid,
    is_active: bool,
    ip_address: Option<String>,
) -> Result<Tenant, AppError> {
    let tenant = Tenant::set_active_status(pool, tenant_id, is_active)
        .await?
        .ok_or_else(|| AppError::NotFound("Tenant not found".to_string()))?;

    AuditLog::record_quietly(
        pool,
        NewAuditLog {
            tenant_id: Some(tenant_id),
            actor: "admin".to_string(),
            action: audit_log::ACTION_TENANT_STATUS_CHANGED,
            entity_type: Some("tenant"),
            entity_id: Some(tenant_id.to_string()),
            ip_address,
            metadata: Some(json!({ "is_active": is_active })),
        },
    )
    .await;

    tracing::info!(%tenant_id, is_active, "Tenant status changed by admin");

    Ok(tenant)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionChange {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
}

pub fn validate_subscription_change(change: &SubscriptionChange) -> Result<(), AppError> {
    if change.status == SubscriptionStatus::Active
        && change.plan.is_paid()
        && change.current_period_end.is_none()
    {
        return Err(AppError::Validation(
            "an active paid plan needs current_period_end".to_string(),
        ));
    }
    if change.status == SubscriptionStatus::Trialing {
        return Err(AppError::Validation(
            "trials are only started at registration".to_string(),
        ));
    }
    Ok(())
}

#[tracing::instrument(skip(pool, ip_address))]
pub async fn change_subscription(
    pool: &PgPool,
    tenant_id: Uuid,
    change: SubscriptionChange,
    ip_address: Option<String>,
) -> Result<Subscription, AppError> {
    validate_subscription_change(&change)?;

    let previous = Subscription::find_by_tenant(pool, tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

    let subscription = Subscription::update_state(
        pool,
        tenant_id,
        change.plan,
        change.status,
        change.current_period_end,
    )
    .await?
    .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

    AuditLog::record_quietly(
        pool,
        NewAuditLog {
            tenant_id: Some(tenant_id),
            actor: "admin".to_string(),
            action: audit_log::ACTION_SUBSCRIPTION_CHANGED,
            entity_type: Some("subscription"),
            entity_id: Some(subscription.id.to_string()),
            ip_address,
            metadata: Some(json!({
                "from": { "plan": previous.plan, "status": previous.status },
                "to": { "plan": change.plan, "status": change.status },
            })),
        },
    )
    .await;

    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_month_start() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 0).unwrap();
        assert_eq!(month_start(now), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[test]
    fn test_validate_subscription_change() {
        let ok = SubscriptionChange {
            plan: Plan::Pro,
            status: SubscriptionStatus::Active,
            current_period_end: Some(Utc::now()),
        };
        assert!(validate_subscription_change(&ok).is_ok());

        let free = SubscriptionChange {
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            current_period_end: None,
        };
        assert!(validate_subscription_change(&free).is_ok());

        let missing_period = SubscriptionChange {
            current_period_end: None,
            ..ok.clone()
        };
        assert!(validate_subscription_change(&missing_period).is_err());

        let trial = SubscriptionChange {
            status: SubscriptionStatus::Trialing,
            ..ok
        };
        assert!(validate_subscription_change(&trial).is_err());
    }
}
