use entity::processed_video;
use entity_types::Source;
use jiff::Timestamp;
use jiff_sea_orm_compat::JiffTimestampMilliseconds;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};

pub struct ProcessedVideos;

fn is_unique_violation(error: &DbErr) -> bool {
    let message = error.to_string().to_lowercase();
    message.contains("unique") || message.contains("duplicate key")
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub user_id: i64,
    pub video_id: String,
    pub channel_id: String,
    pub title: Option<String>,
    pub added_to_playlist: bool,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub source: Source,
}

impl ProcessedVideos {
    /// The exactly-once gate (§4.G step 2a / §8): the presence of ANY row
    /// for (user, video) means "already attempted", whether or not it
    /// succeeded.
    pub async fn exists_for_user_video(
        db: &DatabaseConnection,
        user_id: i64,
        video_id: &str,
    ) -> Result<bool, DbErr> {
        processed_video::Entity::find()
            .filter(processed_video::Column::UserId.eq(user_id))
            .filter(processed_video::Column::VideoId.eq(video_id))
            .one(db)
            .await
            .map(|row| row.is_some())
    }

    /// Duplicate-key violations are caught and swallowed as "already done"
    /// (§5) — a second writer racing this same (user, video) pair loses
    /// gracefully rather than erroring the whole fan-out tick.
    pub async fn record(
        db: &DatabaseConnection,
        outcome: Outcome,
        processed_at: Timestamp,
    ) -> Result<(), DbErr> {
        let result = processed_video::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(outcome.user_id),
            video_id: ActiveValue::Set(outcome.video_id),
            channel_id: ActiveValue::Set(outcome.channel_id),
            title: ActiveValue::Set(outcome.title),
            processed_at: ActiveValue::Set(JiffTimestampMilliseconds(processed_at)),
            added_to_playlist: ActiveValue::Set(outcome.added_to_playlist),
            error_message: ActiveValue::Set(outcome.error_message),
            retry_count: ActiveValue::Set(outcome.retry_count),
            source: ActiveValue::Set(outcome.source),
        }
        .insert(db)
        .await;

        match result {
            Ok(_) => Ok(()),
            // Optimistic read-then-write (§5): a racing writer can still
            // beat us to the unique (user_id, video_id) index between the
            // existence check and this insert. Swallow that as "already
            // done" rather than erroring the whole fan-out tick.
            Err(error) if is_unique_violation(&error) => Ok(()),
            Err(other) => Err(other),
        }
    }

    pub async fn count_failed_since(
        db: &DatabaseConnection,
        since: Timestamp,
    ) -> Result<u64, DbErr> {
        processed_video::Entity::find()
            .filter(processed_video::Column::AddedToPlaylist.eq(false))
            .filter(processed_video::Column::ProcessedAt.gte(JiffTimestampMilliseconds(since)))
            .count(db)
            .await
    }

    pub async fn count_processed_since(
        db: &DatabaseConnection,
        since: Timestamp,
    ) -> Result<u64, DbErr> {
        processed_video::Entity::find()
            .filter(processed_video::Column::ProcessedAt.gte(JiffTimestampMilliseconds(since)))
            .count(db)
            .await
    }

    pub async fn count_succeeded_since(
        db: &DatabaseConnection,
        since: Timestamp,
    ) -> Result<u64, DbErr> {
        processed_video::Entity::find()
            .filter(processed_video::Column::AddedToPlaylist.eq(true))
            .filter(processed_video::Column::ProcessedAt.gte(JiffTimestampMilliseconds(since)))
            .count(db)
            .await
    }

    pub async fn failed_jobs_since(
        db: &DatabaseConnection,
        since: Timestamp,
    ) -> Result<Vec<processed_video::Model>, DbErr> {
        processed_video::Entity::find()
            .filter(processed_video::Column::AddedToPlaylist.eq(false))
            .filter(processed_video::Column::ProcessedAt.gte(JiffTimestampMilliseconds(since)))
            .order_by_desc(processed_video::Column::ProcessedAt)
            .all(db)
            .await
    }
}
