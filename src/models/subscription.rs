use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Plan {
    Free,
    Starter,
    Pro,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "FREE",
            Plan::Starter => "STARTER",
            Plan::Pro => "PRO",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FREE" => Ok(Plan::Free),
            "STARTER" => Ok(Plan::Starter),
            "PRO" => Ok(Plan::Pro),
            other => Err(format!("Unknown plan: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "TRIALING",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::PastDue => "PAST_DUE",
            SubscriptionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRIALING" => Ok(SubscriptionStatus::Trialing),
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "PAST_DUE" => Ok(SubscriptionStatus::PastDue),
            "CANCELLED" => Ok(SubscriptionStatus::Cancelled),
            other => Err(format!("Unknown subscription status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan: String,   // see Plan
    pub status: String, // see SubscriptionStatus
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn plan(&self) -> Result<Plan, String> {
        self.plan.parse()
    }

    pub fn status(&self) -> Result<SubscriptionStatus, String> {
        self.status.parse()
    }
}

impl Subscription {
    pub async fn create<'e, E>(
        executor: E,
        tenant_id: Uuid,
        plan: Plan,
        status: SubscriptionStatus,
        trial_ends_at: Option<DateTime<Utc>>,
    ) -> Result<Self, sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO subscriptions (tenant_id, plan, status, trial_ends_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(plan.as_str())
        .bind(status.as_str())
        .bind(trial_ends_at)
        .fetch_one(executor)
        .await?;

        Ok(subscription)
    }

    pub async fn find_by_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM subscriptions WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await?;

        Ok(subscription)
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let subscriptions = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM subscriptions ORDER BY created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(subscriptions)
    }

    pub async fn update_state(
        pool: &PgPool,
        tenant_id: Uuid,
        plan: Plan,
        status: SubscriptionStatus,
        current_period_end: Option<DateTime<Utc>>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let subscription = sqlx::query_as::<_, Self>(
            r#"
            UPDATE subscriptions
            SET plan = $2, status = $3, current_period_end = $4, updated_at = NOW()
            WHERE tenant_id = $1
            RETURNING *
            "#,
        )
        .bind(tenant_id)
        .bind(plan.as_str())
        .bind(status.as_str())
        .bind(current_period_end)
        .fetch_optional(pool)
        .await?;

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_and_status_parsing() {
        assert_eq!("pro".parse::<Plan>(), Ok(Plan::Pro));
        assert_eq!("PAST_DUE".parse::<SubscriptionStatus>(), Ok(SubscriptionStatus::PastDue));
        assert!("ENTERPRISE".parse::<Plan>().is_err());
        assert_eq!(
            serde_json::to_string(&SubscriptionStatus::PastDue).unwrap(),
            "\"PAST_DUE\""
        );
    }
}
