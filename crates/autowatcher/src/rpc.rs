//! Internal RPC surface (§6) — thin pass-throughs called by the external
//! auth/UI collaborator into components already in scope. Neither of these
//! is the OAuth consent flow itself: one turns an already-obtained
//! authorization code into stored tokens, the other re-syncs a user's
//! subscription set from the Platform.

use std::sync::Arc;

use jiff::Timestamp;
use sea_orm::DatabaseConnection;
use token_vault::TokenVault;
use tokio::sync::Notify;

use platform_client::{PlatformClient, PlatformError, Privacy};

use crate::repository::{
    quota::{self, Quota},
    subscriptions::Subscriptions,
    users::Users,
};

const MANAGED_PLAYLIST_NAME: &str = "Auto Watch Later";
const MANAGED_PLAYLIST_DESCRIPTION: &str =
    "Videos automatically added from your subscribed channels.";

/// Deposits a freshly-minted OAuth authorization code: exchanges it via the
/// Platform client, encrypts the resulting tokens via the token vault, and
/// persists them on the user's row.
pub async fn deposit_authorization_code(
    db: &DatabaseConnection,
    client: &PlatformClient,
    vault: &TokenVault,
    user_id: i64,
    code: &str,
    redirect_uri: &str,
) -> Result<(), PlatformError> {
    let exchanged = client.exchange_authorization_code(code, redirect_uri).await?;

    let encrypted_access_token = vault
        .encrypt(exchanged.access_token.as_bytes())
        .map_err(|error| PlatformError::Malformed(error.to_string()))?;
    let Some(refresh_token) = exchanged.refresh_token.as_deref() else {
        return Err(PlatformError::Malformed(
            "authorization code exchange did not return a refresh token".into(),
        ));
    };
    let encrypted_refresh_token = vault
        .encrypt(refresh_token.as_bytes())
        .map_err(|error| PlatformError::Malformed(error.to_string()))?;

    Users::persist_deposited_tokens(
        db,
        user_id,
        encrypted_access_token,
        encrypted_refresh_token,
        Timestamp::now() + exchanged.expires_in,
    )
    .await
    .map_err(|error| PlatformError::Malformed(error.to_string()))?;

    Ok(())
}

/// Triggers a subscription bootstrap/resync for a user (§6): re-lists the
/// user's Platform subscriptions, upserts `Subscription` rows preserving
/// existing facets, creates the managed playlist on first bootstrap, and
/// signals D to pick up any newly-added subscriptions promptly.
pub async fn bootstrap_subscriptions(
    db: &DatabaseConnection,
    client: &PlatformClient,
    vault: &TokenVault,
    websub_notify: &Arc<Notify>,
    user_id: i64,
) -> Result<(), PlatformError> {
    let user = Users::by_id(db, user_id)
        .await
        .map_err(|error| PlatformError::Malformed(error.to_string()))?
        .ok_or_else(|| PlatformError::Malformed(format!("no such user {user_id}")))?;

    let Some(encrypted_access_token) = user.encrypted_access_token.as_deref() else {
        return Err(PlatformError::Unauthorized);
    };
    let access_token = vault
        .decrypt(encrypted_access_token)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .map_err(|error| PlatformError::Malformed(error.to_string()))?;

    let current = client.list_user_subscriptions(&access_token).await?;
    record_quota_usage(db, quota::COST_SUBSCRIPTIONS_LIST).await;

    Subscriptions::sync_with_platform(db, user_id, &current, Timestamp::now())
        .await
        .map_err(|error| PlatformError::Malformed(error.to_string()))?;

    if user.playlist_id.is_none() {
        let playlist_id = client
            .create_playlist(
                &access_token,
                MANAGED_PLAYLIST_NAME,
                MANAGED_PLAYLIST_DESCRIPTION,
                Privacy::Private,
            )
            .await?;
        record_quota_usage(db, quota::COST_PLAYLISTS_INSERT).await;
        Users::persist_playlist_id(db, user_id, playlist_id)
            .await
            .map_err(|error| PlatformError::Malformed(error.to_string()))?;
    }

    websub_notify.notify_waiters();
    Ok(())
}

/// Best-effort quota bookkeeping (§4.H): a failure to record usage should
/// never fail the RPC call it's attached to.
async fn record_quota_usage(db: &DatabaseConnection, cost_units: i32) {
    let now = Timestamp::now();
    if let Err(error) = Quota::record_usage(
        db,
        &Quota::today(now),
        quota::YOUTUBE_SERVICE,
        1,
        cost_units,
        quota::DAILY_REQUEST_LIMIT,
        quota::DAILY_COST_UNIT_LIMIT,
        now,
    )
    .await
    {
        tracing::warn!(%error, "failed to record quota usage");
    }
}

#[cfg(test)]
mod test {
    use entity::user;
    use jiff_sea_orm_compat::JiffTimestampMillisecondsOpt;
    use sea_orm::{ActiveModelTrait, ActiveValue, Database};

    use super::*;

    async fn memory_db() -> DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn bootstrap_without_access_token_is_unauthorized() {
        let db = memory_db().await;
        let vault = TokenVault::ephemeral();
        let client = PlatformClient::new(reqwest::Client::new(), "id".into(), "secret".into());
        let notify = Arc::new(Notify::new());

        let inserted = user::ActiveModel {
            id: ActiveValue::NotSet,
            encrypted_access_token: ActiveValue::Set(None),
            encrypted_refresh_token: ActiveValue::Set(None),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(None)),
            playlist_id: ActiveValue::Set(None),
            automation_disabled: ActiveValue::Set(false),
            is_admin: ActiveValue::Set(false),
        }
        .insert(&db)
        .await
        .unwrap();

        let result =
            bootstrap_subscriptions(&db, &client, &vault, &notify, inserted.id).await;
        assert!(matches!(result, Err(PlatformError::Unauthorized)));
    }
}
