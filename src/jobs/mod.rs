// Jobs module - Scheduled background work

pub mod pending_bookings;
pub mod subscription_checker;

use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Every five minutes (sec min hour day month weekday)
pub const PENDING_BOOKINGS_SCHEDULE: &str = "0 */5 * * * *";
/// Hourly, at minute 7
pub const SUBSCRIPTIONS_SCHEDULE: &str = "0 7 * * * *";

/// Registers and starts the background jobs
pub async fn start_scheduler(
    pool: PgPool,
    pending_booking_ttl_minutes: i64,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let expire_pool = pool.clone();
    scheduler
        .add(Job::new_async(PENDING_BOOKINGS_SCHEDULE, move |_id, _scheduler| {
            let pool = expire_pool.clone();
            Box::pin(async move {
                if let Err(e) = pending_bookings::expire_pending_bookings(
                    &pool,
                    pending_booking_ttl_minutes,
                    Utc::now(),
                )
                .await
                {
                    tracing::error!(error = %e, "Pending booking expiration failed");
                }
            })
        })?)
        .await?;

    scheduler
        .add(Job::new_async(SUBSCRIPTIONS_SCHEDULE, move |_id, _scheduler| {
            let pool = pool.clone();
            Box::pin(async move {
                if let Err(e) = subscription_checker::roll_subscriptions(&pool, Utc::now()).await {
                    tracing::error!(error = %e, "Subscription rollover failed");
                }
            })
        })?)
        .await?;

    scheduler.start().await?;

    tracing::info!(
        pending_bookings = PENDING_BOOKINGS_SCHEDULE,
        subscriptions = SUBSCRIPTIONS_SCHEDULE,
        "Background jobs scheduled"
    );

    Ok(scheduler)
}
