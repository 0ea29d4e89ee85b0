use jiff_sea_orm_compat::{JiffTimestampMilliseconds, JiffTimestampMillisecondsOpt};
use sea_orm::entity::prelude::*;

/// A user's opt-in to auto-watch-later a single channel, plus the WebSub and
/// polling bookkeeping needed to keep that channel's videos flowing.
///
/// Unique per (user_id, channel_id).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "subscription")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: i64,
    pub channel_id: String,
    pub channel_title: String,
    pub included: bool,
    pub created_at: JiffTimestampMilliseconds,

    // WebSub facet
    pub websub_subscribed: bool,
    pub websub_lease_expires_at: JiffTimestampMillisecondsOpt,
    pub websub_attempt_count: i32,
    pub websub_last_attempt_at: JiffTimestampMillisecondsOpt,

    // Polling facet
    pub polling_enabled: bool,
    pub last_polled_at: JiffTimestampMillisecondsOpt,
    pub last_polled_video_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Maximum WebSub subscribe attempts before a subscription is considered
/// DORMANT and excluded from selection until an operator resets it.
pub const MAX_WEBSUB_ATTEMPTS: i32 = 5;

impl Model {
    /// Exponential backoff: `last_attempt_at + 2^attempt_count minutes <= now`.
    pub fn websub_backoff_elapsed(&self, now: jiff::Timestamp) -> bool {
        match self.websub_last_attempt_at.0 {
            None => true,
            Some(last_attempt_at) => {
                let delay =
                    jiff::SignedDuration::from_mins(1i64 << self.websub_attempt_count.max(0));
                last_attempt_at + delay <= now
            }
        }
    }

    /// True if this subscription should be (re-)selected by the WebSub manager.
    pub fn needs_websub_attention(&self, now: jiff::Timestamp, renew_window: jiff::SignedDuration) -> bool {
        if !self.included {
            return false;
        }

        // (i) never attempted at all — no backoff to wait out yet.
        let never_attempted = !self.websub_subscribed && self.websub_attempt_count == 0;
        // (ii) renewal window reached.
        let renewal_due = self.websub_subscribed
            && self
                .websub_lease_expires_at
                .0
                .is_some_and(|expiry| now.duration_until(expiry) <= renew_window);
        // (iii) a prior attempt failed and its backoff has elapsed.
        let retry_due = self.websub_attempt_count > 0
            && self.websub_attempt_count < MAX_WEBSUB_ATTEMPTS
            && self.websub_backoff_elapsed(now);

        never_attempted || renewal_due || retry_due
    }

    /// Unsubscribe is symmetric with subscribe: selected when a channel was
    /// removed (or opted out) after having successfully subscribed.
    pub fn needs_websub_unsubscribe(&self) -> bool {
        !self.included && self.websub_subscribed
    }

    pub fn needs_polling(&self, now: jiff::Timestamp, interval: jiff::SignedDuration) -> bool {
        if !(self.included && self.polling_enabled) {
            return false;
        }

        let push_broken = !self.websub_subscribed
            || self
                .websub_lease_expires_at
                .0
                .is_some_and(|expiry| expiry < now);
        let poll_due = match self.last_polled_at.0 {
            None => true,
            Some(last) => now.duration_since(last) >= interval,
        };

        push_broken || poll_due
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use jiff::{SignedDuration, Timestamp};

    fn base(now: Timestamp) -> Model {
        Model {
            id: 1,
            user_id: 1,
            channel_id: "CH1".into(),
            channel_title: "Channel".into(),
            included: true,
            created_at: JiffTimestampMilliseconds(now),
            websub_subscribed: false,
            websub_lease_expires_at: JiffTimestampMillisecondsOpt(None),
            websub_attempt_count: 0,
            websub_last_attempt_at: JiffTimestampMillisecondsOpt(None),
            polling_enabled: true,
            last_polled_at: JiffTimestampMillisecondsOpt(None),
            last_polled_video_id: None,
        }
    }

    #[test]
    fn never_succeeded_needs_attention() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        assert!(base(now).needs_websub_attention(now, SignedDuration::from_hours(24)));
    }

    #[test]
    fn excluded_never_needs_attention() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        let mut sub = base(now);
        sub.included = false;
        assert!(!sub.needs_websub_attention(now, SignedDuration::from_hours(24)));
    }

    #[test]
    fn renewal_triggers_exactly_at_window_boundary() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        let mut sub = base(now);
        sub.websub_subscribed = true;
        sub.websub_lease_expires_at =
            JiffTimestampMillisecondsOpt(Some(now + SignedDuration::from_hours(24)));

        assert!(sub.needs_websub_attention(now, SignedDuration::from_hours(24)));

        sub.websub_lease_expires_at =
            JiffTimestampMillisecondsOpt(Some(now + SignedDuration::from_hours(24) + SignedDuration::from_secs(1)));
        assert!(!sub.needs_websub_attention(now, SignedDuration::from_hours(24)));
    }

    #[test]
    fn backoff_monotonicity_and_max_attempts() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        let mut sub = base(now);
        sub.websub_subscribed = false;
        sub.websub_attempt_count = 1;
        sub.websub_last_attempt_at = JiffTimestampMillisecondsOpt(Some(now));

        // Not yet 2^1 = 2 minutes elapsed.
        assert!(!sub.websub_backoff_elapsed(now + SignedDuration::from_mins(1)));
        assert!(sub.websub_backoff_elapsed(now + SignedDuration::from_mins(2)));

        sub.websub_attempt_count = MAX_WEBSUB_ATTEMPTS;
        assert!(!sub.needs_websub_attention(now + SignedDuration::from_hours(1), SignedDuration::from_hours(24)));
    }

    #[test]
    fn unsubscribe_only_needed_when_excluded_and_subscribed() {
        let now = Timestamp::from_second(1_700_000_000).unwrap();
        let mut sub = base(now);
        sub.websub_subscribed = true;
        assert!(!sub.needs_websub_unsubscribe());

        sub.included = false;
        assert!(sub.needs_websub_unsubscribe());

        sub.websub_subscribed = false;
        assert!(!sub.needs_websub_unsubscribe());
    }
}
