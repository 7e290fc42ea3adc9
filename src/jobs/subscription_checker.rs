use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;

use crate::models::{
    audit_log::{self, AuditLog, NewAuditLog},
    subscription::Subscription,
};
use crate::services::subscriptions::{next_state, SubscriptionState};

#[derive(Debug, Default)]
pub struct RolloverStats {
    pub total_checked: usize,
    pub trials_expired: usize,
    pub marked_past_due: usize,
    pub downgraded: usize,
    pub errors: usize,
}

/// Background job that moves subscriptions along their lifecycle
///
/// For each subscription:
/// 1. Compute the next state at `now`
/// 2. Persist it when it differs and record an audit entry
pub async fn roll_subscriptions(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<RolloverStats, sqlx::Error> {
    let subscriptions = Subscription::list_all(pool).await?;

    let mut stats = RolloverStats {
        total_checked: subscriptions.len(),
        ..Default::default()
    };

    tracing::info!(total = stats.total_checked, "Starting subscription rollover job");

    for subscription in subscriptions {
        let current = match SubscriptionState::try_from(&subscription) {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(
                    tenant_id = %subscription.tenant_id,
                    error = %e,
                    "Unreadable subscription row"
                );
                stats.errors += 1;
                continue;
            }
        };

        let Some(next) = next_state(&current, now) else {
            continue;
        };

        if let Err(e) = Subscription::update_state(
            pool,
            subscription.tenant_id,
            next.plan,
            next.status,
            next.current_period_end,
        )
        .await
        {
            tracing::error!(
                tenant_id = %subscription.tenant_id,
                error = %e,
                "Failed to update subscription"
            );
            stats.errors += 1;
            continue;
        }

        match classify(&current, &next) {
            Rollover::TrialExpired => stats.trials_expired += 1,
            Rollover::PastDue => stats.marked_past_due += 1,
            Rollover::Downgraded => stats.downgraded += 1,
        }

        AuditLog::record_quietly(
            pool,
            NewAuditLog {
                tenant_id: Some(subscription.tenant_id),
                actor: "system".to_string(),
                action: audit_log::ACTION_SUBSCRIPTION_ROLLED,
                entity_type: Some("subscription"),
                entity_id: Some(subscription.id.to_string()),
                metadata: Some(json!({
                    "from": { "plan": current.plan, "status": current.status },
                    "to": { "plan": next.plan, "status": next.status },
                })),
                ..Default::default()
            },
        )
        .await;
    }

    tracing::info!(?stats, "Subscription rollover job completed");

    Ok(stats)
}

#[derive(Debug, PartialEq, Eq)]
enum Rollover {
    TrialExpired,
    PastDue,
    Downgraded,
}

fn classify(current: &SubscriptionState, next: &SubscriptionState) -> Rollover {
    use crate::models::subscription::SubscriptionStatus::*;

    match (current.status, next.status) {
        (Trialing, _) => Rollover::TrialExpired,
        (_, PastDue) => Rollover::PastDue,
        _ => Rollover::Downgraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subscription::{Plan, SubscriptionStatus};
    use chrono::Duration;

    #[test]
    fn test_classify_follows_next_state() {
        let now = Utc::now();
        let trial = SubscriptionState {
            plan: Plan::Starter,
            status: SubscriptionStatus::Trialing,
            trial_ends_at: Some(now - Duration::days(1)),
            current_period_end: None,
        };
        let next = next_state(&trial, now).unwrap();
        assert_eq!(classify(&trial, &next), Rollover::TrialExpired);

        let active = SubscriptionState {
            plan: Plan::Pro,
            status: SubscriptionStatus::Active,
            trial_ends_at: None,
            current_period_end: Some(now - Duration::days(1)),
        };
        let past_due = next_state(&active, now).unwrap();
        assert_eq!(classify(&active, &past_due), Rollover::PastDue);

        let later = now + Duration::days(30);
        let downgraded = next_state(&past_due, later).unwrap();
        assert_eq!(classify(&past_due, &downgraded), Rollover::Downgraded);
    }
}
