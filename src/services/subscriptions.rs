use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    employee::Employee,
    service::Service,
    subscription::{Plan, Subscription, SubscriptionStatus},
};

pub const TRIAL_DAYS: i64 = 14;
pub const TRIAL_PLAN: Plan = Plan::Starter;
pub const PAST_DUE_GRACE_DAYS: i64 = 7;

/// Resource caps of a plan; `None` means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub max_employees: Option<i64>,
    pub max_services: Option<i64>,
}

pub fn limits(plan: Plan) -> PlanLimits {
    match plan {
        Plan::Free => PlanLimits {
            max_employees: Some(1),
            max_services: Some(3),
        },
        Plan::Starter => PlanLimits {
            max_employees: Some(5),
            max_services: Some(20),
        },
        Plan::Pro => PlanLimits {
            max_employees: None,
            max_services: None,
        },
    }
}

/// The fields of a subscription that drive its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionState {
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl TryFrom<&Subscription> for SubscriptionState {
    type Error = String;

    fn try_from(subscription: &Subscription) -> Result<Self, Self::Error> {
        Ok(Self {
            plan: subscription.plan()?,
            status: subscription.status()?,
            trial_ends_at: subscription.trial_ends_at,
            current_period_end: subscription.current_period_end,
        })
    }
}

impl SubscriptionState {
    fn downgraded() -> Self {
        Self {
            plan: Plan::Free,
            status: SubscriptionStatus::Active,
            trial_ends_at: None,
            current_period_end: None,
        }
    }
}

/// Next lifecycle state at `now`, or `None` when nothing changes.
///
/// - an expired trial falls back to FREE
/// - an active paid plan past its period end becomes PAST_DUE
/// - PAST_DUE longer than the grace period falls back to FREE
/// - a cancelled paid plan keeps its features until the period ends
pub fn next_state(state: &SubscriptionState, now: DateTime<Utc>) -> Option<SubscriptionState> {
    let expired = |at: Option<DateTime<Utc>>| at.is_some_and(|at| at <= now);

    match state.status {
        SubscriptionStatus::Trialing if expired(state.trial_ends_at) => {
            Some(SubscriptionState::downgraded())
        }
        SubscriptionStatus::Active if state.plan.is_paid() && expired(state.current_period_end) => {
            Some(SubscriptionState {
                status: SubscriptionStatus::PastDue,
                ..*state
            })
        }
        SubscriptionStatus::PastDue
            if expired(
                state
                    .current_period_end
                    .map(|end| end + Duration::days(PAST_DUE_GRACE_DAYS)),
            ) =>
        {
            Some(SubscriptionState::downgraded())
        }
        SubscriptionStatus::Cancelled if state.plan.is_paid() && expired(state.current_period_end) => {
            Some(SubscriptionState {
                plan: Plan::Free,
                current_period_end: None,
                ..*state
            })
        }
        _ => None,
    }
}

/// Plan whose limits apply right now
pub fn effective_plan(subscription: Option<&Subscription>) -> Plan {
    subscription
        .and_then(|s| s.plan().ok())
        .unwrap_or(Plan::Free)
}

/// Fails when `current` already reaches `limit`
pub fn check_limit(limit: Option<i64>, current: i64, what: &str, plan: Plan) -> Result<(), AppError> {
    match limit {
        Some(max) if current >= max => Err(AppError::Forbidden(format!(
            "The {} plan allows at most {} {}; upgrade to add more",
            plan, max, what
        ))),
        _ => Ok(()),
    }
}

async fn plan_for(pool: &PgPool, tenant_id: Uuid) -> Result<Plan, sqlx::Error> {
    let subscription = Subscription::find_by_tenant(pool, tenant_id).await?;
    Ok(effective_plan(subscription.as_ref()))
}

pub async fn ensure_can_add_employee(pool: &PgPool, tenant_id: Uuid) -> Result<(), AppError> {
    let plan = plan_for(pool, tenant_id).await?;
    let current = Employee::count_active(pool, tenant_id).await?;
    check_limit(limits(plan).max_employees, current, "employees", plan)
}

pub async fn ensure_can_add_service(pool: &PgPool, tenant_id: Uuid) -> Result<(), AppError> {
    let plan = plan_for(pool, tenant_id).await?;
    let current = Service::count_active(pool, tenant_id).await?;
    check_limit(limits(plan).max_services, current, "services", plan)
}

/// Subscription with its limits, as shown on the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub plan: Plan,
    pub status: Option<SubscriptionStatus>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub limits: PlanLimits,
    pub employees_used: i64,
    pub services_used: i64,
}

pub async fn overview(pool: &PgPool, tenant_id: Uuid) -> Result<SubscriptionOverview, sqlx::Error> {
    let subscription = Subscription::find_by_tenant(pool, tenant_id).await?;
    let plan = effective_plan(subscription.as_ref());

    Ok(SubscriptionOverview {
        plan,
        status: subscription.as_ref().and_then(|s| s.status().ok()),
        trial_ends_at: subscription.as_ref().and_then(|s| s.trial_ends_at),
        current_period_end: subscription.as_ref().and_then(|s| s.current_period_end),
        limits: limits(plan),
        employees_used: Employee::count_active(pool, tenant_id).await?,
        services_used: Service::count_active(pool, tenant_id).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(plan: Plan, status: SubscriptionStatus) -> SubscriptionState {
        SubscriptionState {
            plan,
            status,
            trial_ends_at: None,
            current_period_end: None,
        }
    }

    #[test]
    fn test_expired_trial_downgrades_to_free() {
        let now = Utc::now();
        let mut trial = state(Plan::Starter, SubscriptionStatus::Trialing);

        trial.trial_ends_at = Some(now + Duration::days(1));
        assert_eq!(next_state(&trial, now), None);

        trial.trial_ends_at = Some(now - Duration::seconds(1));
        let next = next_state(&trial, now).unwrap();
        assert_eq!(next.plan, Plan::Free);
        assert_eq!(next.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_unpaid_period_goes_past_due_then_free() {
        let now = Utc::now();
        let mut active = state(Plan::Pro, SubscriptionStatus::Active);
        active.current_period_end = Some(now - Duration::days(1));

        let past_due = next_state(&active, now).unwrap();
        assert_eq!(past_due.status, SubscriptionStatus::PastDue);
        assert_eq!(past_due.plan, Plan::Pro);

        // Still inside the grace period
        assert_eq!(next_state(&past_due, now), None);

        let later = now + Duration::days(PAST_DUE_GRACE_DAYS);
        let downgraded = next_state(&past_due, later).unwrap();
        assert_eq!(downgraded.plan, Plan::Free);
        assert_eq!(downgraded.status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_free_plan_is_stable() {
        let now = Utc::now();
        let mut free = state(Plan::Free, SubscriptionStatus::Active);
        free.current_period_end = Some(now - Duration::days(30));
        assert_eq!(next_state(&free, now), None);
    }

    #[test]
    fn test_cancelled_paid_plan_runs_until_period_end() {
        let now = Utc::now();
        let mut cancelled = state(Plan::Starter, SubscriptionStatus::Cancelled);
        cancelled.current_period_end = Some(now + Duration::days(3));
        assert_eq!(next_state(&cancelled, now), None);

        let next = next_state(&cancelled, now + Duration::days(3)).unwrap();
        assert_eq!(next.plan, Plan::Free);
        assert_eq!(next.status, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn test_limits() {
        assert_eq!(limits(Plan::Free).max_employees, Some(1));
        assert_eq!(limits(Plan::Starter).max_services, Some(20));
        assert_eq!(limits(Plan::Pro).max_services, None);
        assert_eq!(effective_plan(None), Plan::Free);
    }

    #[test]
    fn test_check_limit() {
        assert!(check_limit(Some(3), 2, "services", Plan::Free).is_ok());
        assert!(matches!(
            check_limit(Some(3), 3, "services", Plan::Free),
            Err(AppError::Forbidden(msg)) if msg.contains("FREE")
        ));
        assert!(check_limit(None, 10_000, "services", Plan::Pro).is_ok());
    }
}
