use entity::api_quota_usage;
use jiff::Timestamp;
use jiff_sea_orm_compat::JiffTimestampMilliseconds;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder,
};

/// Service name under which every YouTube Data API v3 call (search, playlist
/// create, playlist-item insert, subscription list) is tracked — they share
/// one project-wide daily quota pool on the real API.
pub const YOUTUBE_SERVICE: &str = "youtube-data-v3";

/// Default daily budget for a YouTube Data API v3 project: 10,000 cost
/// units/day. `requests_used`/`quota_limit` track plain call counts
/// separately, since a project can also be capped on raw request volume.
pub const DAILY_REQUEST_LIMIT: i32 = 1_000_000;
pub const DAILY_COST_UNIT_LIMIT: i32 = 10_000;

/// Published per-call costs, in quota units, for the calls this pipeline makes.
pub const COST_SEARCH_LIST: i32 = 100;
pub const COST_PLAYLIST_ITEMS_INSERT: i32 = 50;
pub const COST_PLAYLISTS_INSERT: i32 = 50;
pub const COST_SUBSCRIPTIONS_LIST: i32 = 1;

pub struct Quota;

impl Quota {
    /// `YYYY-MM-DD`, matching the `date` column's format — callers must use
    /// this (not `Timestamp::to_string`) so that string-range comparisons in
    /// [`Self::usage_over_days`] stay correct against a same-width column.
    pub fn today(now: Timestamp) -> String {
        now.to_zoned(jiff::tz::TimeZone::UTC).date().to_string()
    }

    /// Idempotent upsert for (date, service) (§4.H): increments the running
    /// counters if today's row already exists, otherwise creates it seeded
    /// with the given limits.
    pub async fn record_usage(
        db: &DatabaseConnection,
        date: &str,
        service_name: &str,
        requests_delta: i32,
        cost_units_delta: i32,
        quota_limit: i32,
        cost_unit_limit: i32,
        now: Timestamp,
    ) -> Result<(), DbErr> {
        let existing = api_quota_usage::Entity::find()
            .filter(api_quota_usage::Column::Date.eq(date))
            .filter(api_quota_usage::Column::ServiceName.eq(service_name))
            .one(db)
            .await?;

        match existing {
            Some(row) => {
                api_quota_usage::ActiveModel {
                    id: ActiveValue::Unchanged(row.id),
                    requests_used: ActiveValue::Set(row.requests_used + requests_delta),
                    cost_units_used: ActiveValue::Set(row.cost_units_used + cost_units_delta),
                    last_updated: ActiveValue::Set(JiffTimestampMilliseconds(now)),
                    ..Default::default()
                }
                .update(db)
                .await?;
            }
            None => {
                api_quota_usage::ActiveModel {
                    id: ActiveValue::NotSet,
                    date: ActiveValue::Set(date.to_owned()),
                    service_name: ActiveValue::Set(service_name.to_owned()),
                    requests_used: ActiveValue::Set(requests_delta),
                    quota_limit: ActiveValue::Set(quota_limit),
                    cost_units_used: ActiveValue::Set(cost_units_delta),
                    cost_unit_limit: ActiveValue::Set(cost_unit_limit),
                    last_updated: ActiveValue::Set(JiffTimestampMilliseconds(now)),
                }
                .insert(db)
                .await?;
            }
        }

        Ok(())
    }

    pub async fn usage_over_days(
        db: &DatabaseConnection,
        since_date: &str,
    ) -> Result<Vec<api_quota_usage::Model>, DbErr> {
        api_quota_usage::Entity::find()
            .filter(api_quota_usage::Column::Date.gte(since_date))
            .order_by_desc(api_quota_usage::Column::Date)
            .all(db)
            .await
    }
}
