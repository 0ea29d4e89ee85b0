//! Diagnostics Read Model (§4.H) — aggregates quota, failure, and health
//! counters for operators. Pure reads; the quota upsert itself lives in
//! `repository::quota` and is called from G, F, and the bootstrap RPC after
//! each Platform API call, not from here.

use entity::{api_quota_usage, processed_video, webhook_event};
use jiff::{SignedDuration, Timestamp};
use sea_orm::DatabaseConnection;
use serde::Serialize;

use crate::repository::{
    processed_videos::ProcessedVideos, quota::Quota, subscriptions::Subscriptions,
    webhook_events::WebhookEvents,
};

const SEVEN_DAYS: SignedDuration = SignedDuration::from_secs(7 * 24 * 60 * 60);
const TWENTY_FOUR_HOURS: SignedDuration = SignedDuration::from_secs(24 * 60 * 60);

#[derive(Debug, Serialize)]
pub struct Summary {
    pub active_subscriptions: u64,
    pub websub_subscribed: u64,
    pub failed_jobs_last_24h: u64,
    pub unprocessed_events_last_24h: u64,
    pub processed_last_7d: u64,
    pub success_rate_last_7d: f64,
    pub webhook_events_received_last_24h: u64,
}

pub async fn summary(db: &DatabaseConnection, now: Timestamp) -> Result<Summary, sea_orm::DbErr> {
    let active_subscriptions = Subscriptions::count_active(db).await?;
    let websub_subscribed = Subscriptions::count_websub_active(db, now).await?;
    let failed_jobs_last_24h = ProcessedVideos::count_failed_since(db, now - TWENTY_FOUR_HOURS).await?;
    let unprocessed_events_last_24h =
        WebhookEvents::count_unprocessed_since(db, now - TWENTY_FOUR_HOURS).await?;
    let processed_last_7d = ProcessedVideos::count_processed_since(db, now - SEVEN_DAYS).await?;
    let succeeded_last_7d = ProcessedVideos::count_succeeded_since(db, now - SEVEN_DAYS).await?;
    let webhook_events_received_last_24h =
        WebhookEvents::count_received_since(db, now - TWENTY_FOUR_HOURS).await?;

    let success_rate_last_7d = if processed_last_7d == 0 {
        1.0
    } else {
        succeeded_last_7d as f64 / processed_last_7d as f64
    };

    Ok(Summary {
        active_subscriptions,
        websub_subscribed,
        failed_jobs_last_24h,
        unprocessed_events_last_24h,
        processed_last_7d,
        success_rate_last_7d,
        webhook_events_received_last_24h,
    })
}

pub async fn quota_usage(
    db: &DatabaseConnection,
    since_date: &str,
) -> Result<Vec<api_quota_usage::Model>, sea_orm::DbErr> {
    Quota::usage_over_days(db, since_date).await
}

pub async fn failed_jobs(
    db: &DatabaseConnection,
    since: Timestamp,
) -> Result<Vec<processed_video::Model>, sea_orm::DbErr> {
    ProcessedVideos::failed_jobs_since(db, since).await
}

pub async fn unprocessed_events(
    db: &DatabaseConnection,
    since: Timestamp,
) -> Result<Vec<webhook_event::Model>, sea_orm::DbErr> {
    WebhookEvents::unprocessed_since(db, since).await
}

#[cfg(test)]
mod test {
    use super::*;

    async fn memory_db() -> DatabaseConnection {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn empty_database_reports_perfect_success_rate() {
        let db = memory_db().await;
        let summary = summary(&db, Timestamp::now()).await.unwrap();
        assert_eq!(summary.processed_last_7d, 0);
        assert_eq!(summary.success_rate_last_7d, 1.0);
    }
}
