use entity::user;
use jiff_sea_orm_compat::JiffTimestampMillisecondsOpt;
use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};

pub struct Users;

impl Users {
    /// Candidates for the token refresh loop (§4.C): refresh token present
    /// and automation enabled. `Model::needs_refresh` still has to be
    /// applied in-app against each row — the boundary on "unknown expiry"
    /// isn't expressible as a single SQL predicate without duplicating that
    /// logic in two places.
    pub async fn refresh_candidates(db: &DatabaseConnection) -> Result<Vec<user::Model>, DbErr> {
        user::Entity::find()
            .filter(user::Column::AutomationDisabled.eq(false))
            .filter(user::Column::EncryptedRefreshToken.is_not_null())
            .all(db)
            .await
    }

    pub async fn by_id(db: &DatabaseConnection, id: i64) -> Result<Option<user::Model>, DbErr> {
        user::Entity::find_by_id(id).one(db).await
    }

    /// Persists a successful refresh: new access token, new expiry, and
    /// (only if the platform rotated it) a new refresh token. Clears
    /// `automation_disabled` since a successful refresh is itself proof the
    /// user's authorization is still good.
    pub async fn persist_refreshed_token(
        db: &DatabaseConnection,
        user_id: i64,
        encrypted_access_token: Vec<u8>,
        encrypted_refresh_token: Option<Vec<u8>>,
        access_token_expires_at: jiff::Timestamp,
    ) -> Result<(), DbErr> {
        let mut active = user::ActiveModel {
            id: ActiveValue::Unchanged(user_id),
            encrypted_access_token: ActiveValue::Set(Some(encrypted_access_token)),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(
                access_token_expires_at,
            ))),
            automation_disabled: ActiveValue::Set(false),
            ..Default::default()
        };

        if let Some(refresh_token) = encrypted_refresh_token {
            active.encrypted_refresh_token = ActiveValue::Set(Some(refresh_token));
        }

        active.update(db).await?;
        Ok(())
    }

    /// Never touches the refresh token — the user may re-authenticate
    /// out-of-band and be unblocked without losing it (§4.C).
    pub async fn disable_automation(db: &DatabaseConnection, user_id: i64) -> Result<(), DbErr> {
        user::ActiveModel {
            id: ActiveValue::Unchanged(user_id),
            automation_disabled: ActiveValue::Set(true),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    pub async fn persist_playlist_id(
        db: &DatabaseConnection,
        user_id: i64,
        playlist_id: String,
    ) -> Result<(), DbErr> {
        user::ActiveModel {
            id: ActiveValue::Unchanged(user_id),
            playlist_id: ActiveValue::Set(Some(playlist_id)),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    pub async fn persist_deposited_tokens(
        db: &DatabaseConnection,
        user_id: i64,
        encrypted_access_token: Vec<u8>,
        encrypted_refresh_token: Vec<u8>,
        access_token_expires_at: jiff::Timestamp,
    ) -> Result<(), DbErr> {
        user::ActiveModel {
            id: ActiveValue::Unchanged(user_id),
            encrypted_access_token: ActiveValue::Set(Some(encrypted_access_token)),
            encrypted_refresh_token: ActiveValue::Set(Some(encrypted_refresh_token)),
            access_token_expires_at: ActiveValue::Set(JiffTimestampMillisecondsOpt(Some(
                access_token_expires_at,
            ))),
            automation_disabled: ActiveValue::Set(false),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }
}
