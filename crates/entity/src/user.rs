use jiff_sea_orm_compat::JiffTimestampMillisecondsOpt;
use sea_orm::entity::prelude::*;

/// An authenticated end user of the auto-watch-later pipeline.
///
/// The core only ever mutates the token/playlist/flag fields below; the row
/// itself is created by the external auth collaborator on first sign-in.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// AEAD-encrypted OAuth access token, opaque to everything but the token vault.
    pub encrypted_access_token: Option<Vec<u8>>,
    /// AEAD-encrypted OAuth refresh token, opaque to everything but the token vault.
    pub encrypted_refresh_token: Option<Vec<u8>>,
    pub access_token_expires_at: JiffTimestampMillisecondsOpt,

    /// Absent until the user's first subscription bootstrap creates it.
    pub playlist_id: Option<String>,

    pub automation_disabled: bool,
    pub is_admin: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::subscription::Entity")]
    Subscription,
    #[sea_orm(has_many = "super::processed_video::Entity")]
    ProcessedVideo,
}

impl Related<super::subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl Related<super::processed_video::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProcessedVideo.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `needs_refresh` per the token refresh loop: unknown expiry with a
    /// refresh token present counts as needing a refresh too.
    pub fn needs_refresh(&self, now: jiff::Timestamp, buffer: jiff::SignedDuration) -> bool {
        match self.access_token_expires_at.0 {
            Some(expires_at) => now.duration_until(expires_at) <= buffer,
            None => self.encrypted_refresh_token.is_some(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use jiff::{SignedDuration, Timestamp};

    fn model(expires_at: Option<Timestamp>, has_refresh: bool) -> Model {
        Model {
            id: 1,
            encrypted_access_token: Some(vec![1]),
            encrypted_refresh_token: has_refresh.then(|| vec![2]),
            access_token_expires_at: JiffTimestampMillisecondsOpt(expires_at),
            playlist_id: None,
            automation_disabled: false,
            is_admin: false,
        }
    }

    #[test]
    fn refresh_needed_inside_buffer() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        let buffer = SignedDuration::from_mins(30);
        let at_boundary = now + SignedDuration::from_mins(30);

        assert!(model(Some(at_boundary), true).needs_refresh(now, buffer));
        assert!(!model(Some(now + SignedDuration::from_mins(31)), true).needs_refresh(now, buffer));
    }

    #[test]
    fn unknown_expiry_with_refresh_token_needs_refresh() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        assert!(model(None, true).needs_refresh(now, SignedDuration::from_mins(30)));
        assert!(!model(None, false).needs_refresh(now, SignedDuration::from_mins(30)));
    }
}
