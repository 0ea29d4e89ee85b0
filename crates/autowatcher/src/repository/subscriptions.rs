use entity::{subscription, user};
use jiff::{SignedDuration, Timestamp};
use jiff_sea_orm_compat::{JiffTimestampMilliseconds, JiffTimestampMillisecondsOpt};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait,
    JoinType, PaginatorTrait, QueryFilter, QuerySelect, RelationTrait,
};

use platform_client::ChannelSubscription;

pub struct Subscriptions;

impl Subscriptions {
    /// Union of the three WebSub subscribe/renew selection criteria (§4.D),
    /// narrowed in SQL to `included` rows below the attempt ceiling, then
    /// filtered precisely in-app since the backoff/renewal windows involve
    /// an `OR` across nullable timestamp columns that reads far more clearly
    /// as the `Model` helper than as a single query predicate.
    pub async fn needing_websub_attention(
        db: &DatabaseConnection,
        now: Timestamp,
        renew_window: SignedDuration,
    ) -> Result<Vec<subscription::Model>, DbErr> {
        let candidates = subscription::Entity::find()
            .filter(subscription::Column::Included.eq(true))
            .filter(subscription::Column::WebsubAttemptCount.lt(subscription::MAX_WEBSUB_ATTEMPTS))
            .all(db)
            .await?;

        Ok(candidates
            .into_iter()
            .filter(|sub| sub.needs_websub_attention(now, renew_window))
            .collect())
    }

    /// The symmetric unsubscribe selection (§4.D): channels that were opted
    /// out or removed after having successfully subscribed.
    pub async fn needing_websub_unsubscribe(
        db: &DatabaseConnection,
    ) -> Result<Vec<subscription::Model>, DbErr> {
        let candidates = subscription::Entity::find()
            .filter(subscription::Column::Included.eq(false))
            .filter(subscription::Column::WebsubSubscribed.eq(true))
            .all(db)
            .await?;

        Ok(candidates
            .into_iter()
            .filter(subscription::Model::needs_websub_unsubscribe)
            .collect())
    }

    pub async fn record_websub_attempt(
        db: &DatabaseConnection,
        id: i64,
        attempt_count: i32,
        now: Timestamp,
    ) -> Result<(), DbErr> {
        subscription::ActiveModel {
            id: ActiveValue::Unchanged(id),
            websub_attempt_count: ActiveValue::Set(attempt_count + 1),
            websub_last_attempt_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(now))),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    /// `432000s − 1h` safety margin per §4.D, attempt count reset to 0 per
    /// the Subscription invariant in §3.
    pub async fn mark_websub_subscribed(
        db: &DatabaseConnection,
        id: i64,
        lease_expires_at: Timestamp,
    ) -> Result<(), DbErr> {
        subscription::ActiveModel {
            id: ActiveValue::Unchanged(id),
            websub_subscribed: ActiveValue::Set(true),
            websub_lease_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(
                lease_expires_at,
            ))),
            websub_attempt_count: ActiveValue::Set(0),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    /// Hub replied 410 Gone to a subscribe POST: reset all the way back to
    /// NEW rather than just leaving the incremented attempt count in place.
    pub async fn reset_to_new(db: &DatabaseConnection, id: i64) -> Result<(), DbErr> {
        subscription::ActiveModel {
            id: ActiveValue::Unchanged(id),
            websub_subscribed: ActiveValue::Set(false),
            websub_lease_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            websub_attempt_count: ActiveValue::Set(0),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    pub async fn mark_websub_unsubscribed(db: &DatabaseConnection, id: i64) -> Result<(), DbErr> {
        subscription::ActiveModel {
            id: ActiveValue::Unchanged(id),
            websub_subscribed: ActiveValue::Set(false),
            websub_lease_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    pub async fn delete(db: &DatabaseConnection, id: i64) -> Result<(), DbErr> {
        subscription::Entity::delete_by_id(id).exec(db).await?;
        Ok(())
    }

    /// Poll candidates (§4.F), joined with the owning user so "has an
    /// access token" can be checked without a follow-up round trip.
    pub async fn needing_polling(
        db: &DatabaseConnection,
        now: Timestamp,
        interval: SignedDuration,
    ) -> Result<Vec<(subscription::Model, user::Model)>, DbErr> {
        let rows = subscription::Entity::find()
            .filter(subscription::Column::Included.eq(true))
            .filter(subscription::Column::PollingEnabled.eq(true))
            .join(JoinType::InnerJoin, subscription::Relation::User.def())
            .filter(user::Column::EncryptedAccessToken.is_not_null())
            .find_also_related(user::Entity)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(sub, owner)| owner.map(|owner| (sub, owner)))
            .filter(|(sub, _)| sub.needs_polling(now, interval))
            .collect())
    }

    pub async fn record_poll(
        db: &DatabaseConnection,
        id: i64,
        last_polled_video_id: Option<String>,
        now: Timestamp,
    ) -> Result<(), DbErr> {
        subscription::ActiveModel {
            id: ActiveValue::Unchanged(id),
            last_polled_video_id: ActiveValue::Set(last_polled_video_id),
            last_polled_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(now))),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    /// The fan-out join (§4.G step 1): one query returning every user
    /// eligible to receive a video from this channel, instead of a
    /// per-subscription follow-up lookup.
    pub async fn find_subscribers_for_channel(
        db: &DatabaseConnection,
        channel_id: &str,
    ) -> Result<Vec<(subscription::Model, user::Model)>, DbErr> {
        let rows = subscription::Entity::find()
            .filter(subscription::Column::ChannelId.eq(channel_id))
            .filter(subscription::Column::Included.eq(true))
            .join(JoinType::InnerJoin, subscription::Relation::User.def())
            .filter(user::Column::AutomationDisabled.eq(false))
            .filter(user::Column::PlaylistId.is_not_null())
            .filter(user::Column::EncryptedAccessToken.is_not_null())
            .find_also_related(user::Entity)
            .all(db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(sub, owner)| owner.map(|owner| (sub, owner)))
            .collect())
    }

    /// §4.H summary counter: channels a user has opted into, regardless of
    /// WebSub/polling state.
    pub async fn count_active(db: &DatabaseConnection) -> Result<u64, DbErr> {
        subscription::Entity::find()
            .filter(subscription::Column::Included.eq(true))
            .count(db)
            .await
    }

    /// §4.H summary counter: subscriptions whose hub lease is still live.
    pub async fn count_websub_active(db: &DatabaseConnection, now: Timestamp) -> Result<u64, DbErr> {
        subscription::Entity::find()
            .filter(subscription::Column::WebsubSubscribed.eq(true))
            .filter(subscription::Column::WebsubLeaseExpiresAt.gt(JiffTimestampMilliseconds(now)))
            .count(db)
            .await
    }

    pub async fn for_user(
        db: &DatabaseConnection,
        user_id: i64,
    ) -> Result<Vec<subscription::Model>, DbErr> {
        subscription::Entity::find()
            .filter(subscription::Column::UserId.eq(user_id))
            .all(db)
            .await
    }

    /// Bootstrap/resync (§6): upserts `Subscription` rows from the
    /// Platform's current list while preserving `included` and the WebSub
    /// and polling facets for channels already known, per the
    /// "upsert-preserving-facets-plus-prune" resolution of §9's wipe-and-
    /// refill open question.
    ///
    /// - Channels newly appearing on the Platform are inserted as NEW.
    /// - Channels already known keep every facet untouched (only the title
    ///   is refreshed, in case the channel renamed).
    /// - Channels no longer on the Platform are opted out (`included =
    ///   false`) so D unsubscribes them from the hub on its next tick; once
    ///   a row is both excluded and already unsubscribed it is pruned here.
    pub async fn sync_with_platform(
        db: &DatabaseConnection,
        user_id: i64,
        current: &[ChannelSubscription],
        now: Timestamp,
    ) -> Result<(), DbErr> {
        let existing = Self::for_user(db, user_id).await?;

        let current_ids: std::collections::HashSet<&str> =
            current.iter().map(|c| c.channel_id.as_str()).collect();

        for channel in current {
            if !existing.iter().any(|sub| sub.channel_id == channel.channel_id) {
                subscription::ActiveModel {
                    id: ActiveValue::NotSet,
                    user_id: ActiveValue::Set(user_id),
                    channel_id: ActiveValue::Set(channel.channel_id.clone()),
                    channel_title: ActiveValue::Set(channel.title.clone()),
                    included: ActiveValue::Set(true),
                    created_at: ActiveValue::Set(JiffTimestampMilliseconds(now)),
                    websub_subscribed: ActiveValue::Set(false),
                    websub_lease_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
                    websub_attempt_count: ActiveValue::Set(0),
                    websub_last_attempt_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
                    polling_enabled: ActiveValue::Set(true),
                    last_polled_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
                    last_polled_video_id: ActiveValue::Set(None),
                }
                .insert(db)
                .await?;
            } else if let Some(existing_row) = existing
                .iter()
                .find(|sub| sub.channel_id == channel.channel_id)
            {
                if existing_row.channel_title != channel.title {
                    subscription::ActiveModel {
                        id: ActiveValue::Unchanged(existing_row.id),
                        channel_title: ActiveValue::Set(channel.title.clone()),
                        ..Default::default()
                    }
                    .update(db)
                    .await?;
                }
            }
        }

        for stale in existing
            .iter()
            .filter(|sub| !current_ids.contains(sub.channel_id.as_str()))
        {
            if !stale.included && !stale.websub_subscribed {
                Self::delete(db, stale.id).await?;
            } else if stale.included {
                subscription::ActiveModel {
                    id: ActiveValue::Unchanged(stale.id),
                    included: ActiveValue::Set(false),
                    ..Default::default()
                }
                .update(db)
                .await?;
            }
        }

        Ok(())
    }
}
