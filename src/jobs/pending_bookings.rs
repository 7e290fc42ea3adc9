use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use sqlx::PgPool;

use crate::models::{
    audit_log::{self, AuditLog, NewAuditLog},
    booking::Booking,
};

#[derive(Debug, Default)]
pub struct ExpirationStats {
    pub cancelled: usize,
}

/// Bookings created before this instant are past their payment deadline
pub fn payment_deadline(now: DateTime<Utc>, ttl_minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(ttl_minutes.max(1))
}

/// Background job that releases slots held by unpaid deposits.
///
/// PENDING bookings older than `ttl_minutes` with no approved payment are
/// cancelled, which frees their time for other customers.
pub async fn expire_pending_bookings(
    pool: &PgPool,
    ttl_minutes: i64,
    now: DateTime<Utc>,
) -> Result<ExpirationStats, sqlx::Error> {
    let cutoff = payment_deadline(now, ttl_minutes);
    let cancelled = Booking::cancel_stale_pending(pool, cutoff).await?;

    for booking_id in &cancelled {
        AuditLog::record_quietly(
            pool,
            NewAuditLog {
                actor: "system".to_string(),
                action: audit_log::ACTION_BOOKING_STATUS_CHANGED,
                entity_type: Some("booking"),
                entity_id: Some(booking_id.to_string()),
                metadata: Some(json!({ "from": "PENDING", "to": "CANCELLED", "reason": "deposit_expired" })),
                ..Default::default()
            },
        )
        .await;
    }

    let stats = ExpirationStats {
        cancelled: cancelled.len(),
    };

    if stats.cancelled > 0 {
        tracing::info!(?stats, %cutoff, "Expired unpaid pending bookings");
    } else {
        tracing::debug!(%cutoff, "No pending bookings to expire");
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_deadline() {
        let now = Utc::now();
        assert_eq!(payment_deadline(now, 30), now - Duration::minutes(30));
        // A zero or negative TTL would cancel bookings as they are created
        assert_eq!(payment_deadline(now, 0), now - Duration::minutes(1));
    }
}
