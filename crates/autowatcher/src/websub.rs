//! WebSub Subscription Manager (§4.D) — subscribes, renews, and
//! unsubscribes channel push-feeds at the hub with exponential-backoff
//! retry, mirroring the reference deployment's `pubsubhubbub` actor but
//! driven off per-subscription selection queries instead of a queue table.

use std::{sync::Arc, time::Duration};

use jiff::{SignedDuration, Timestamp};
use reqwest::Client;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::repository::subscriptions::Subscriptions;

const HUB_ENDPOINT: &str = "https://pubsubhubbub.appspot.com/subscribe";
/// 5 days, per the glossary's "lease" definition.
const LEASE_SECONDS: i64 = 432_000;
/// `lease-expiry ≤ now + 24h` triggers renewal.
const RENEW_WINDOW: SignedDuration = SignedDuration::from_secs(24 * 60 * 60);
/// Safety margin subtracted from the hub's own lease when recording it.
const LEASE_SAFETY_MARGIN: SignedDuration = SignedDuration::from_secs(60 * 60);

#[derive(Debug, Serialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Serialize)]
struct HubRequest<'s> {
    #[serde(rename = "hub.callback")]
    callback: &'s str,
    #[serde(rename = "hub.topic")]
    topic: String,
    #[serde(rename = "hub.mode")]
    mode: Mode,
    #[serde(rename = "hub.lease_seconds")]
    lease_seconds: i64,
    /// The hub performs its challenge round-trip synchronously inside this
    /// request, so the response status alone tells us whether the
    /// subscription took (§4.D implementation note).
    #[serde(rename = "hub.verify")]
    verify: &'static str,
}

fn channel_feed_url(channel_id: &str) -> String {
    format!("https://www.youtube.com/xml/feeds/videos.xml?channel_id={channel_id}")
}

pub struct WebSubManager {
    http: Client,
    callback_url: String,
}

impl WebSubManager {
    pub fn new(http: Client, callback_url: String) -> Self {
        Self { http, callback_url }
    }

    async fn post(&self, topic: String, mode: Mode) -> reqwest::Result<reqwest::StatusCode> {
        let response = self
            .http
            .post(HUB_ENDPOINT)
            .form(&HubRequest {
                callback: &self.callback_url,
                topic,
                mode,
                lease_seconds: LEASE_SECONDS,
                verify: "sync",
            })
            .send()
            .await?;
        Ok(response.status())
    }
}

pub async fn run(
    shutdown: CancellationToken,
    db: DatabaseConnection,
    manager: WebSubManager,
    notify: Arc<Notify>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {},
            _ = notify.notified() => {},
        }

        if let Err(error) = tick(&db, &manager, &shutdown, Timestamp::now()).await {
            tracing::error!(%error, "websub manager tick failed");
        }
    }

    tracing::info!("websub manager shutting down");
}

/// `now` is threaded through explicitly (rather than read internally) so
/// tests can drive simulated time across ticks instead of racing the
/// backoff windows against the real clock.
async fn tick(
    db: &DatabaseConnection,
    manager: &WebSubManager,
    shutdown: &CancellationToken,
    now: Timestamp,
) -> Result<(), sea_orm::DbErr> {
    let attention = Subscriptions::needing_websub_attention(db, now, RENEW_WINDOW).await?;
    for sub in attention {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        Subscriptions::record_websub_attempt(db, sub.id, sub.websub_attempt_count, now).await?;

        let topic = channel_feed_url(&sub.channel_id);
        match manager.post(topic, Mode::Subscribe).await {
            Ok(status) if status.is_success() => {
                let lease_expires_at =
                    now + SignedDuration::from_secs(LEASE_SECONDS) - LEASE_SAFETY_MARGIN;
                Subscriptions::mark_websub_subscribed(db, sub.id, lease_expires_at).await?;
            }
            Ok(status) if status == reqwest::StatusCode::GONE => {
                tracing::warn!(subscription_id = sub.id, "hub returned 410, resetting to NEW");
                Subscriptions::reset_to_new(db, sub.id).await?;
            }
            Ok(status) => {
                tracing::warn!(subscription_id = sub.id, %status, "hub subscribe request failed");
            }
            Err(error) => {
                tracing::warn!(subscription_id = sub.id, %error, "hub subscribe request errored");
            }
        }
    }

    let unsubscribing = Subscriptions::needing_websub_unsubscribe(db).await?;
    for sub in unsubscribing {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        let topic = channel_feed_url(&sub.channel_id);
        match manager.post(topic, Mode::Unsubscribe).await {
            Ok(status) if status.is_success() => {
                Subscriptions::mark_websub_unsubscribed(db, sub.id).await?;
                Subscriptions::delete(db, sub.id).await?;
            }
            Ok(status) => {
                tracing::warn!(subscription_id = sub.id, %status, "hub unsubscribe request failed");
            }
            Err(error) => {
                tracing::warn!(subscription_id = sub.id, %error, "hub unsubscribe request errored");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use entity::subscription;
    use jiff_sea_orm_compat::{JiffTimestampMilliseconds, JiffTimestampMillisecondsOpt};
    use sea_orm::{ActiveValue, Database, EntityTrait};

    use super::*;

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn insert_subscription(db: &DatabaseConnection, user_id: i64) -> i64 {
        // Keep the owning user row satisfied too, since the schema's foreign
        // key expects it even though this module never reads it.
        entity::user::ActiveModel {
            id: ActiveValue::Set(user_id),
            encrypted_access_token: ActiveValue::Set(None),
            encrypted_refresh_token: ActiveValue::Set(None),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            playlist_id: ActiveValue::Set(None),
            automation_disabled: ActiveValue::Set(false),
            is_admin: ActiveValue::Set(false),
        }
        .insert(db)
        .await
        .unwrap();

        let model = subscription::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(user_id),
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
            last_polled_video_id: ActiveValue::Set(None),
        }
        .insert(db)
        .await
        .unwrap();

        model.id
    }

    #[tokio::test]
    async fn backoff_monotonicity_and_max_attempts() {
        let db = memory_db().await;
        let manager = WebSubManager::new(reqwest::Client::new(), "https://example.test/webhook".into());
        let shutdown = CancellationToken::new();

        let sub_id = insert_subscription(&db, 1).await;

        // The hub endpoint here is unreachable in a unit test sandbox, so
        // every POST fails transiently — exactly the "hub always returns
        // non-2xx" scenario from §8's backoff property. Simulated time is
        // driven explicitly rather than read off the real clock: each tick
        // lands exactly on the boundary its own prior attempt count demands,
        // so the test proves the backoff window rather than racing it.
        let mut now = Timestamp::from_second(1_700_000_000).unwrap();
        let mut last_attempt_at = now;

        for expected_attempt in 1..=subscription::MAX_WEBSUB_ATTEMPTS {
            tick(&db, &manager, &shutdown, now).await.unwrap();

            let reloaded = subscription::Entity::find_by_id(sub_id)
                .one(&db)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reloaded.websub_attempt_count, expected_attempt);

            let recorded_at = reloaded.websub_last_attempt_at.0.unwrap();
            assert!(
                recorded_at.duration_since(last_attempt_at) >= SignedDuration::from_mins(1i64 << (expected_attempt - 1)) || expected_attempt == 1,
                "attempt {expected_attempt} landed before its backoff window elapsed"
            );
            last_attempt_at = recorded_at;

            // Advance to exactly the next backoff boundary `2^attempt` minutes out.
            now = now + SignedDuration::from_mins(1i64 << expected_attempt);
        }

        // The sixth tick: attempt_count is already at MAX, so the row is no
        // longer selected regardless of how far `now` advances.
        tick(&db, &manager, &shutdown, now).await.unwrap();
        let reloaded = subscription::Entity::find_by_id(sub_id).one(&db).await.unwrap().unwrap();
        assert_eq!(reloaded.websub_attempt_count, subscription::MAX_WEBSUB_ATTEMPTS);
    }
}
