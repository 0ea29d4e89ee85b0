//! Diagnostics JSON surface (§4.H, §6) — reuses the webhook receiver's HTTP
//! server, gated by the same header-based operator-auth middleware pattern
//! the reference deployment uses for its own admin routes.

use axum::{Json, extract::State};
use jiff::{SignedDuration, Timestamp};
use reqwest::StatusCode;
use sea_orm::DatabaseConnection;

use crate::{diagnostics, repository::quota::Quota};

const THIRTY_DAYS: SignedDuration = SignedDuration::from_secs(30 * 24 * 60 * 60);
const SEVEN_DAYS: SignedDuration = SignedDuration::from_secs(7 * 24 * 60 * 60);
const TWENTY_FOUR_HOURS: SignedDuration = SignedDuration::from_secs(24 * 60 * 60);

pub async fn summary(
    State(db): State<DatabaseConnection>,
) -> Result<Json<diagnostics::Summary>, StatusCode> {
    diagnostics::summary(&db, Timestamp::now())
        .await
        .map(Json)
        .map_err(|error| {
            tracing::error!(%error, "diagnostics summary query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub async fn quota(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Vec<entity::api_quota_usage::Model>>, StatusCode> {
    let since = Quota::today(Timestamp::now() - THIRTY_DAYS);
    diagnostics::quota_usage(&db, &since)
        .await
        .map(Json)
        .map_err(|error| {
            tracing::error!(%error, "diagnostics quota query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub async fn failed_jobs(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Vec<entity::processed_video::Model>>, StatusCode> {
    diagnostics::failed_jobs(&db, Timestamp::now() - SEVEN_DAYS)
        .await
        .map(Json)
        .map_err(|error| {
            tracing::error!(%error, "diagnostics failed-jobs query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

pub async fn unprocessed_events(
    State(db): State<DatabaseConnection>,
) -> Result<Json<Vec<entity::webhook_event::Model>>, StatusCode> {
    diagnostics::unprocessed_events(&db, Timestamp::now() - TWENTY_FOUR_HOURS)
        .await
        .map(Json)
        .map_err(|error| {
            tracing::error!(%error, "diagnostics unprocessed-events query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
