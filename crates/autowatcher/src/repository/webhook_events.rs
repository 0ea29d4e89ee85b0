use entity::webhook_event;
use entity_types::Source;
use jiff::Timestamp;
use jiff_sea_orm_compat::{JiffTimestampMilliseconds, JiffTimestampMillisecondsOpt};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};

pub struct WebhookEvents;

impl WebhookEvents {
    /// Raw insert used by both the webhook receiver (E) and the fallback
    /// poller (F) — duplicates are expected and welcome here; exactly-once
    /// is enforced downstream by G, not by this insert.
    pub async fn enqueue(
        db: &DatabaseConnection,
        channel_id: String,
        video_id: String,
        title: Option<String>,
        raw_payload: String,
        source: Source,
        received_at: Timestamp,
    ) -> Result<webhook_event::Model, DbErr> {
        webhook_event::ActiveModel {
            id: ActiveValue::NotSet,
            channel_id: ActiveValue::Set(channel_id),
            video_id: ActiveValue::Set(video_id),
            title: ActiveValue::Set(title),
            received_at: ActiveValue::Set(JiffTimestampMilliseconds(received_at)),
            processed: ActiveValue::Set(false),
            processed_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            raw_payload: ActiveValue::Set(raw_payload),
            source: ActiveValue::Set(source),
        }
        .insert(db)
        .await
    }

    /// §4.F: "if no WebhookEvent for (channel, video) already exists" —
    /// dedupes the poller against both prior polls and prior webhook
    /// deliveries of the same video.
    pub async fn exists_for_channel_video(
        db: &DatabaseConnection,
        channel_id: &str,
        video_id: &str,
    ) -> Result<bool, DbErr> {
        webhook_event::Entity::find()
            .filter(webhook_event::Column::ChannelId.eq(channel_id))
            .filter(webhook_event::Column::VideoId.eq(video_id))
            .one(db)
            .await
            .map(|row| row.is_some())
    }

    /// G selects in `received_at` order so per-channel delivery order is
    /// preserved (§5).
    pub async fn unprocessed_in_order(
        db: &DatabaseConnection,
    ) -> Result<Vec<webhook_event::Model>, DbErr> {
        webhook_event::Entity::find()
            .filter(webhook_event::Column::Processed.eq(false))
            .order_by_asc(webhook_event::Column::ReceivedAt)
            .all(db)
            .await
    }

    pub async fn mark_processed(
        db: &DatabaseConnection,
        id: i64,
        now: Timestamp,
    ) -> Result<(), DbErr> {
        webhook_event::ActiveModel {
            id: ActiveValue::Unchanged(id),
            processed: ActiveValue::Set(true),
            processed_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(now))),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    pub async fn count_unprocessed_since(
        db: &DatabaseConnection,
        since: Timestamp,
    ) -> Result<u64, DbErr> {
        webhook_event::Entity::find()
            .filter(webhook_event::Column::Processed.eq(false))
            .filter(webhook_event::Column::ReceivedAt.gte(JiffTimestampMilliseconds(since)))
            .count(db)
            .await
    }

    /// §4.H "unprocessed events over last N hours" listing — the counter
    /// above answers "how many", this answers "which ones" for the failed-
    /// job-adjacent diagnostics view.
    pub async fn unprocessed_since(
        db: &DatabaseConnection,
        since: Timestamp,
    ) -> Result<Vec<webhook_event::Model>, DbErr> {
        webhook_event::Entity::find()
            .filter(webhook_event::Column::Processed.eq(false))
            .filter(webhook_event::Column::ReceivedAt.gte(JiffTimestampMilliseconds(since)))
            .order_by_asc(webhook_event::Column::ReceivedAt)
            .all(db)
            .await
    }

    pub async fn count_received_since(
        db: &DatabaseConnection,
        since: Timestamp,
    ) -> Result<u64, DbErr> {
        webhook_event::Entity::find()
            .filter(webhook_event::Column::ReceivedAt.gte(JiffTimestampMilliseconds(since)))
            .count(db)
            .await
    }
}
