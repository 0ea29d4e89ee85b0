//! Fallback Poller (§4.F) — for channels whose push feed is missing, stale,
//! or dead, searches the Platform for recent uploads directly and writes
//! into the same event queue the webhook receiver feeds, so the fan-out
//! processor can't tell the difference.

use std::{sync::Arc, time::Duration};

use entity_types::Source;
use jiff::{SignedDuration, Timestamp};
use sea_orm::DatabaseConnection;
use token_vault::TokenVault;
use tokio_util::sync::CancellationToken;

use platform_client::PlatformClient;

use crate::repository::{
    quota::{self, Quota},
    subscriptions::Subscriptions,
    webhook_events::WebhookEvents,
};

/// `since = now − 7 days` per §4.F.
const SEARCH_WINDOW: SignedDuration = SignedDuration::from_secs(7 * 24 * 60 * 60);
/// Sleep between channels to spread load and act as an informal rate limiter (§5).
const INTER_CHANNEL_SLEEP: Duration = Duration::from_secs(1);

pub async fn run(
    shutdown: CancellationToken,
    db: DatabaseConnection,
    client: PlatformClient,
    vault: Arc<TokenVault>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {},
        }

        if let Err(error) = tick(&db, &client, &vault, interval, &shutdown).await {
            tracing::error!(%error, "fallback poller tick failed");
        }
    }

    tracing::info!("fallback poller shutting down");
}

async fn tick(
    db: &DatabaseConnection,
    client: &PlatformClient,
    vault: &TokenVault,
    interval: Duration,
    shutdown: &CancellationToken,
) -> Result<(), sea_orm::DbErr> {
    let now = Timestamp::now();
    let poll_interval = SignedDuration::new(interval.as_secs() as i64, interval.subsec_nanos() as i32);

    let candidates = Subscriptions::needing_polling(db, now, poll_interval).await?;

    for (sub, owner) in candidates {
        if shutdown.is_cancelled() {
            break;
        }

        let Some(encrypted_access_token) = owner.encrypted_access_token.as_deref() else {
            continue;
        };

        let access_token = match vault.decrypt(encrypted_access_token) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(error) => {
                tracing::warn!(user_id = owner.id, %error, "access token undecryptable, skipping poll");
                continue;
            }
        };

        let since = now - SEARCH_WINDOW;
        let recent = client
            .search_channel_recent(&access_token, &sub.channel_id, since)
            .await;

        if let Err(error) = Quota::record_usage(
            db,
            &Quota::today(now),
            quota::YOUTUBE_SERVICE,
            1,
            quota::COST_SEARCH_LIST,
            quota::DAILY_REQUEST_LIMIT,
            quota::DAILY_COST_UNIT_LIMIT,
            now,
        )
        .await
        {
            tracing::warn!(%error, "failed to record quota usage for search.list");
        }

        let recent = match recent {
            Ok(videos) => videos,
            Err(error) => {
                tracing::warn!(
                    subscription_id = sub.id,
                    channel_id = sub.channel_id,
                    %error,
                    "search_channel_recent failed"
                );
                tokio::time::sleep(INTER_CHANNEL_SLEEP).await;
                continue;
            }
        };

        // Walk oldest-first, stopping at the last video already seen.
        let unseen: Vec<_> = match sub.last_polled_video_id.as_deref() {
            Some(last_seen) => {
                let boundary = recent.iter().position(|video| video.video_id == last_seen);
                match boundary {
                    Some(index) => recent[index + 1..].to_vec(),
                    None => recent.clone(),
                }
            }
            None => recent.clone(),
        };

        for video in &unseen {
            if WebhookEvents::exists_for_channel_video(db, &sub.channel_id, &video.video_id).await?
            {
                continue;
            }

            WebhookEvents::enqueue(
                db,
                sub.channel_id.clone(),
                video.video_id.clone(),
                Some(video.title.clone()),
                format!(
                    "polled: channel={} video={} published_at={}",
                    sub.channel_id, video.video_id, video.published_at
                ),
                Source::Polling,
                now,
            )
            .await?;
        }

        let latest_seen = recent
            .last()
            .map(|video| video.video_id.clone())
            .or_else(|| sub.last_polled_video_id.clone());
        Subscriptions::record_poll(db, sub.id, latest_seen, now).await?;

        tokio::time::sleep(INTER_CHANNEL_SLEEP).await;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use entity::{subscription, user};
    use jiff_sea_orm_compat::{JiffTimestampMilliseconds, JiffTimestampMillisecondsOpt};
    use sea_orm::{ActiveValue, Database, EntityTrait};

    use super::*;

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn insert_user_and_subscription(
        db: &DatabaseConnection,
        vault: &TokenVault,
        last_polled_video_id: Option<&str>,
    ) -> (i64, i64) {
        let user = user::ActiveModel {
            id: ActiveValue::NotSet,
            encrypted_access_token: ActiveValue::Set(Some(vault.encrypt(b"access").unwrap())),
            encrypted_refresh_token: ActiveValue::Set(Some(vault.encrypt(b"refresh").unwrap())),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            playlist_id: ActiveValue::Set(Some("PL1".into())),
            automation_disabled: ActiveValue::Set(false),
            is_admin: ActiveValue::Set(false),
        }
        .insert(db)
        .await
        .unwrap();

        let sub = subscription::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(user.id),
            channel_id: ActiveValue::Set("CH1".into()),
            channel_title: ActiveValue::Set("Channel".into()),
            included: ActiveValue::Set(true),
            created_at: ActiveValue::Set(JiffTimestampMilliseconds(Timestamp::now())),
            websub_subscribed: ActiveValue::Set(false),
            websub_lease_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            websub_attempt_count: ActiveValue::Set(0),
            websub_last_attempt_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            polling_enabled: ActiveValue::Set(true),
            last_polled_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            last_polled_video_id: ActiveValue::Set(last_polled_video_id.map(str::to_owned)),
        }
        .insert(db)
        .await
        .unwrap();

        (user.id, sub.id)
    }

    #[tokio::test]
    async fn selects_subscription_never_polled() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let (_, sub_id) = insert_user_and_subscription(&db, &vault, None).await;

        let now = Timestamp::now();
        let candidates = Subscriptions::needing_polling(&db, now, SignedDuration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].0.id, sub_id);
    }

    #[tokio::test]
    async fn recently_polled_and_push_healthy_is_skipped() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let (_, sub_id) = insert_user_and_subscription(&db, &vault, Some("VID_OLD")).await;

        let now = Timestamp::now();
        subscription::ActiveModel {
            id: ActiveValue::Unchanged(sub_id),
            websub_subscribed: ActiveValue::Set(true),
            websub_lease_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(
                now + SignedDuration::from_hours(48),
            ))),
            last_polled_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(now))),
            ..Default::default()
        }
        .update(&db)
        .await
        .unwrap();

        let candidates = Subscriptions::needing_polling(&db, now, SignedDuration::from_secs(3600))
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }
}
