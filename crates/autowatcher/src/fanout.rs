//! Fan-Out Processor (§4.G) — drains the event queue, joins each event to
//! its subscribing users in one query, enforces per-(user, video)
//! exactly-once, and records the outcome of every insert attempt.

use std::{sync::Arc, time::Duration};

use entity::webhook_event;
use jiff::Timestamp;
use sea_orm::DatabaseConnection;
use token_vault::TokenVault;
use tokio_util::sync::CancellationToken;

use platform_client::{PlatformClient, PlatformError};

use crate::repository::{
    processed_videos::{Outcome, ProcessedVideos},
    quota::{self, Quota},
    subscriptions::Subscriptions,
    webhook_events::WebhookEvents,
};

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

        if let Err(error) = tick(&db, &client, &vault, &shutdown).await {
            tracing::error!(%error, "fan-out tick failed");
        }
    }

    tracing::info!("fan-out processor shutting down");
}

async fn tick(
    db: &DatabaseConnection,
    client: &PlatformClient,
    vault: &TokenVault,
    shutdown: &CancellationToken,
) -> Result<(), sea_orm::DbErr> {
    let events = WebhookEvents::unprocessed_in_order(db).await?;

    for event in events {
        if shutdown.is_cancelled() {
            break;
        }

        process_event(db, client, vault, &event).await?;
    }

    Ok(())
}

/// One event, step 1-3 of §4.G: join to subscribers, attempt-and-record per
/// user, then mark the event processed regardless of per-user outcome.
async fn process_event(
    db: &DatabaseConnection,
    client: &PlatformClient,
    vault: &TokenVault,
    event: &webhook_event::Model,
) -> Result<(), sea_orm::DbErr> {
    let subscribers = Subscriptions::find_subscribers_for_channel(db, &event.channel_id).await?;

    for (_sub, owner) in subscribers {
        if ProcessedVideos::exists_for_user_video(db, owner.id, &event.video_id).await? {
            continue;
        }

        let Some(encrypted_access_token) = owner.encrypted_access_token.as_deref() else {
            continue;
        };
        let Some(playlist_id) = owner.playlist_id.as_deref() else {
            continue;
        };

        let access_token = match vault.decrypt(encrypted_access_token) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(error) => {
                tracing::warn!(user_id = owner.id, %error, "access token undecryptable, disabling automation");
                crate::repository::users::Users::disable_automation(db, owner.id).await?;
                continue;
            }
        };

        let (result, attempts) = client
            .insert_playlist_item_with_retry(&access_token, playlist_id, &event.video_id)
            .await;

        let now = Timestamp::now();
        if let Err(error) = Quota::record_usage(
            db,
            &Quota::today(now),
            quota::YOUTUBE_SERVICE,
            attempts as i32,
            quota::COST_PLAYLIST_ITEMS_INSERT * attempts as i32,
            quota::DAILY_REQUEST_LIMIT,
            quota::DAILY_COST_UNIT_LIMIT,
            now,
        )
        .await
        {
            tracing::warn!(%error, "failed to record quota usage for playlistItems.insert");
        }

        let (added_to_playlist, error_message) = match result {
            Ok(()) => (true, None),
            Err(PlatformError::QuotaExceeded) => {
                // §7: recorded, not retried — the next day's poller re-discovers it.
                tracing::warn!(user_id = owner.id, video_id = event.video_id, "quota exceeded");
                (false, Some(PlatformError::QuotaExceeded.to_string()))
            }
            Err(PlatformError::Unauthorized) => {
                // §4.G: G does not itself trigger a refresh; C's next tick will.
                (false, Some(PlatformError::Unauthorized.to_string()))
            }
            Err(error) => (false, Some(error.to_string())),
        };

        ProcessedVideos::record(
            db,
            Outcome {
                user_id: owner.id,
                video_id: event.video_id.clone(),
                channel_id: event.channel_id.clone(),
                title: event.title.clone(),
                added_to_playlist,
                error_message,
                retry_count: attempts as i32,
                source: event.source,
            },
            Timestamp::now(),
        )
        .await?;
    }

    WebhookEvents::mark_processed(db, event.id, Timestamp::now()).await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use entity::{processed_video, subscription, user};
    use entity_types::Source;
    use jiff_sea_orm_compat::{JiffTimestampMilliseconds, JiffTimestampMillisecondsOpt};
    use sea_orm::{ActiveValue, ColumnTrait, Database, EntityTrait, QueryFilter};
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn insert_subscribed_user(
        db: &DatabaseConnection,
        vault: &TokenVault,
        channel_id: &str,
        included: bool,
        automation_disabled: bool,
    ) -> i64 {
        let user = user::ActiveModel {
            id: ActiveValue::NotSet,
            encrypted_access_token: ActiveValue::Set(Some(vault.encrypt(b"access").unwrap())),
            encrypted_refresh_token: ActiveValue::Set(Some(vault.encrypt(b"refresh").unwrap())),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            playlist_id: ActiveValue::Set(Some("PL1".into())),
            automation_disabled: ActiveValue::Set(automation_disabled),
            is_admin: ActiveValue::Set(false),
        }
        .insert(db)
        .await
        .unwrap();

        subscription::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(user.id),
            channel_id: ActiveValue::Set(channel_id.into()),
            channel_title: ActiveValue::Set("Channel".into()),
            included: ActiveValue::Set(included),
            created_at: ActiveValue::Set(JiffTimestampMilliseconds(Timestamp::now())),
            websub_subscribed: ActiveValue::Set(false),
            websub_lease_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            websub_attempt_count: ActiveValue::Set(0),
            websub_last_attempt_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            polling_enabled: ActiveValue::Set(true),
            last_polled_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            last_polled_video_id: ActiveValue::Set(None),
        }
        .insert(db)
        .await
        .unwrap();

        user.id
    }

    async fn enqueue(db: &DatabaseConnection, channel_id: &str, video_id: &str) -> webhook_event::Model {
        WebhookEvents::enqueue(
            db,
            channel_id.into(),
            video_id.into(),
            Some("Title".into()),
            "<feed/>".into(),
            Source::Webhook,
            Timestamp::now(),
        )
        .await
        .unwrap()
    }

    fn mock_client() -> PlatformClient {
        // Points at an address nothing listens on: every call resolves to a
        // transient reqwest error. Fine for the tests below that never
        // reach a Platform call at all (excluded/disabled/no-subscriber).
        PlatformClient::new(reqwest::Client::new(), "id".into(), "secret".into())
    }

    /// An in-process `playlistItems.insert` double that always replies 200,
    /// for tests that need to observe a *successful* insert and count how
    /// many times it was actually called.
    async fn mock_playlist_insert_server(expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/youtube/v3/playlistItems"))
            .respond_with(ResponseTemplate::new(200))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn client_against(server: &MockServer) -> PlatformClient {
        PlatformClient::new(reqwest::Client::new(), "id".into(), "secret".into())
            .with_api_base(format!("{}/youtube/v3", server.uri()), format!("{}/token", server.uri()))
    }

    #[tokio::test]
    async fn excluded_subscription_is_never_attempted() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let user_id = insert_subscribed_user(&db, &vault, "CH1", false, false).await;
        let event = enqueue(&db, "CH1", "VID1").await;

        process_event(&db, &mock_client(), &vault, &event).await.unwrap();

        assert!(
            !ProcessedVideos::exists_for_user_video(&db, user_id, "VID1")
                .await
                .unwrap()
        );
        let reloaded = webhook_event::Entity::find_by_id(event.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.processed);
    }

    #[tokio::test]
    async fn disabled_user_is_never_attempted() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let user_id = insert_subscribed_user(&db, &vault, "CH1", true, true).await;
        let event = enqueue(&db, "CH1", "VID1").await;

        process_event(&db, &mock_client(), &vault, &event).await.unwrap();

        assert!(
            !ProcessedVideos::exists_for_user_video(&db, user_id, "VID1")
                .await
                .unwrap()
        );
    }

    /// Scenario 1 (§8 happy webhook path): one event, one subscriber, a
    /// Platform double that actually succeeds — the insert happens exactly
    /// once and the recorded outcome is `added=true, source="Webhook"`.
    #[tokio::test]
    async fn happy_webhook_path_inserts_once_and_records_success() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let user_id = insert_subscribed_user(&db, &vault, "CH1", true, false).await;
        let event = enqueue(&db, "CH1", "VID1").await;

        let server = mock_playlist_insert_server(1).await;
        process_event(&db, &client_against(&server), &vault, &event)
            .await
            .unwrap();
        server.verify().await;

        let row = processed_video::Entity::find()
            .filter(processed_video::Column::UserId.eq(user_id))
            .filter(processed_video::Column::VideoId.eq("VID1"))
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(row.added_to_playlist);
        assert_eq!(row.source, Source::Webhook);

        let reloaded_event = webhook_event::Entity::find_by_id(event.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded_event.processed);
    }

    /// Scenario 2 (§8 duplicate delivery / exactly-once insertion): two
    /// WebhookEvent rows for the same (channel, video), against a Platform
    /// double that would succeed every time it's called — the `expect(1)`
    /// on the mock proves `insert_playlist_item` is invoked at most once
    /// across the run, not merely that the second attempt's outcome was
    /// recorded as a no-op.
    #[tokio::test]
    async fn duplicate_event_for_same_video_is_attempted_at_most_once() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let user_id = insert_subscribed_user(&db, &vault, "CH1", true, false).await;

        let first = enqueue(&db, "CH1", "VID1").await;
        let second = enqueue(&db, "CH1", "VID1").await;

        let server = mock_playlist_insert_server(1).await;
        let client = client_against(&server);
        process_event(&db, &client, &vault, &first).await.unwrap();
        process_event(&db, &client, &vault, &second).await.unwrap();
        server.verify().await;

        let matching = processed_video::Entity::find()
            .filter(processed_video::Column::UserId.eq(user_id))
            .filter(processed_video::Column::VideoId.eq("VID1"))
            .all(&db)
            .await
            .unwrap();
        assert_eq!(matching.len(), 1, "exactly one ProcessedVideo row for (user, video)");
        assert!(matching[0].added_to_playlist);

        let reloaded_second = webhook_event::Entity::find_by_id(second.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded_second.processed);
    }

    #[tokio::test]
    async fn no_subscriber_leaves_no_processed_video_row() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let event = enqueue(&db, "CHX", "VID1").await;

        process_event(&db, &mock_client(), &vault, &event).await.unwrap();

        let reloaded = webhook_event::Entity::find_by_id(event.id)
            .one(&db)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.processed);
    }
}
