//! Token Refresh Loop (§4.C) — keeps `PlatformClient` usable by refreshing
//! access tokens before they expire, and gives up on a user (without
//! discarding their refresh token) when the platform itself rejects it.

use std::{sync::Arc, time::Duration};

use jiff::{SignedDuration, Timestamp};
use platform_client::{PlatformClient, PlatformError};
use sea_orm::DatabaseConnection;
use token_vault::TokenVault;
use tokio_util::sync::CancellationToken;

use crate::repository::users::Users;

/// `≤ now + 30 min` per §4.C.
const REFRESH_BUFFER: SignedDuration = SignedDuration::from_secs(30 * 60);

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
            tracing::error!(%error, "token refresh tick failed");
        }
    }

    tracing::info!("token refresh loop shutting down");
}

async fn tick(
    db: &DatabaseConnection,
    client: &PlatformClient,
    vault: &TokenVault,
    shutdown: &CancellationToken,
) -> Result<(), sea_orm::DbErr> {
    let candidates = Users::refresh_candidates(db).await?;
    let now = Timestamp::now();

    for user in candidates {
        if shutdown.is_cancelled() {
            break;
        }

        if !user.needs_refresh(now, REFRESH_BUFFER) {
            continue;
        }

        let Some(encrypted_refresh_token) = user.encrypted_refresh_token.as_deref() else {
            continue;
        };

        let refresh_token = match vault.decrypt(encrypted_refresh_token) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(user_id = user.id, %error, "refresh token undecryptable, disabling automation");
                Users::disable_automation(db, user.id).await?;
                continue;
            }
        };
        let refresh_token = String::from_utf8_lossy(&refresh_token).into_owned();

        match client.refresh_access_token(&refresh_token).await {
            Ok(refreshed) => {
                let encrypted_access_token = match vault.encrypt(refreshed.access_token.as_bytes())
                {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        tracing::error!(user_id = user.id, %error, "failed to encrypt refreshed access token");
                        continue;
                    }
                };

                let encrypted_refresh_token = match refreshed.refresh_token {
                    Some(rotated) => match vault.encrypt(rotated.as_bytes()) {
                        Ok(bytes) => Some(bytes),
                        Err(error) => {
                            tracing::error!(user_id = user.id, %error, "failed to encrypt rotated refresh token");
                            None
                        }
                    },
                    None => None,
                };

                Users::persist_refreshed_token(
                    db,
                    user.id,
                    encrypted_access_token,
                    encrypted_refresh_token,
                    now + refreshed.expires_in,
                )
                .await?;
            }
            Err(PlatformError::Unauthorized) | Err(PlatformError::NotFound) => {
                tracing::warn!(user_id = user.id, "refresh token rejected, disabling automation");
                Users::disable_automation(db, user.id).await?;
            }
            Err(error) => {
                tracing::warn!(user_id = user.id, %error, "token refresh failed, disabling automation");
                Users::disable_automation(db, user.id).await?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use entity::user;
    use jiff_sea_orm_compat::JiffTimestampMillisecondsOpt;
    use sea_orm::{ActiveValue, Database, EntityTrait};
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

    /// An in-process token endpoint double that always grants a fresh
    /// access token good for two hours, for tests that need a genuine
    /// successful refresh rather than a transient network failure.
    async fn mock_token_refresh_server(expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access-token",
                "expires_in": 7200,
            })))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn client_against(server: &MockServer) -> PlatformClient {
        PlatformClient::new(reqwest::Client::new(), "id".into(), "secret".into())
            .with_api_base(format!("{}/youtube/v3", server.uri()), format!("{}/token", server.uri()))
    }

    async fn insert_user(db: &DatabaseConnection, vault: &TokenVault, refresh_token: &str) -> i64 {
        let encrypted = vault.encrypt(refresh_token.as_bytes()).unwrap();
        let model = user::ActiveModel {
            id: ActiveValue::NotSet,
            encrypted_access_token: ActiveValue::Set(Some(vault.encrypt(b"old-access").unwrap())),
            encrypted_refresh_token: ActiveValue::Set(Some(encrypted)),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            playlist_id: ActiveValue::Set(None),
            automation_disabled: ActiveValue::Set(false),
            is_admin: ActiveValue::Set(false),
        }
        .insert(db)
        .await
        .unwrap();
        model.id
    }

    #[tokio::test]
    async fn crypto_error_disables_automation_without_deleting_refresh_token() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let user_id = insert_user(&db, &vault, "refresh-token").await;

        // Corrupt the stored opaque so decryption fails with a `CryptoError`
        // — this must be treated as a non-retryable per-user fault (§4.A),
        // same as an outright refresh rejection, but must NOT erase the
        // refresh token itself (§4.C).
        user::ActiveModel {
            id: ActiveValue::Unchanged(user_id),
            encrypted_refresh_token: ActiveValue::Set(Some(vec![1, 2, 3])),
            ..Default::default()
        }
        .update(&db)
        .await
        .unwrap();

        let client = PlatformClient::new(reqwest::Client::new(), "id".into(), "secret".into());
        let shutdown = CancellationToken::new();
        tick(&db, &client, &vault, &shutdown).await.unwrap();

        let reloaded = user::Entity::find_by_id(user_id).one(&db).await.unwrap().unwrap();
        assert!(reloaded.automation_disabled);
        assert!(reloaded.encrypted_refresh_token.is_some());
    }

    #[tokio::test]
    async fn user_with_fresh_token_is_skipped() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let user_id = insert_user(&db, &vault, "refresh-token").await;

        let far_future = Timestamp::now() + SignedDuration::from_hours(10);
        user::ActiveModel {
            id: ActiveValue::Unchanged(user_id),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(
                far_future,
            ))),
            ..Default::default()
        }
        .update(&db)
        .await
        .unwrap();

        let client = PlatformClient::new(reqwest::Client::new(), "id".into(), "secret".into());
        let shutdown = CancellationToken::new();
        tick(&db, &client, &vault, &shutdown).await.unwrap();

        let reloaded = user::Entity::find_by_id(user_id).one(&db).await.unwrap().unwrap();
        assert!(!reloaded.automation_disabled);
        assert_eq!(reloaded.access_token_expires_at.0, Some(far_future));
    }

    /// §8 token-refresh idempotence: the first tick performs a genuine
    /// successful refresh that pushes expiry well past REFRESH_BUFFER, so
    /// the second back-to-back tick (no time advance) must find nothing
    /// due and skip — the mock's `expect(1)` proves the refresh endpoint
    /// is hit exactly once, not that both ticks happen to fail the same way.
    #[tokio::test]
    async fn calling_tick_twice_with_no_time_advance_is_idempotent() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let user_id = insert_user(&db, &vault, "refresh-token").await;

        // Just inside REFRESH_BUFFER: due for refresh right now.
        let just_stale = Timestamp::now() + REFRESH_BUFFER - SignedDuration::from_secs(60);
        user::ActiveModel {
            id: ActiveValue::Unchanged(user_id),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(
                just_stale,
            ))),
            ..Default::default()
        }
        .update(&db)
        .await
        .unwrap();

        let server = mock_token_refresh_server(1).await;
        let client = client_against(&server);
        let shutdown = CancellationToken::new();

        tick(&db, &client, &vault, &shutdown).await.unwrap();
        let after_first = user::Entity::find_by_id(user_id).one(&db).await.unwrap().unwrap();
        assert!(!after_first.automation_disabled);
        assert!(
            after_first.access_token_expires_at.0.unwrap() > Timestamp::now() + REFRESH_BUFFER,
            "successful refresh must push expiry past the buffer"
        );

        tick(&db, &client, &vault, &shutdown).await.unwrap();
        let after_second = user::Entity::find_by_id(user_id).one(&db).await.unwrap().unwrap();
        server.verify().await;

        assert_eq!(after_first.automation_disabled, after_second.automation_disabled);
        assert_eq!(
            after_first.access_token_expires_at.0,
            after_second.access_token_expires_at.0
        );
        assert_eq!(
            after_first.encrypted_access_token, after_second.encrypted_access_token
        );
    }
}
