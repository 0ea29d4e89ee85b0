use entity_types::Source;
use jiff_sea_orm_compat::{JiffTimestampMilliseconds, JiffTimestampMillisecondsOpt};
use sea_orm::entity::prelude::*;

/// A single push (or synthesized-poll) notification, durably queued for the
/// fan-out processor. Append-only until `processed` flips to `true`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_event")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub channel_id: String,
    pub video_id: String,
    pub title: Option<String>,

    pub received_at: JiffTimestampMilliseconds,
    pub processed: bool,
    pub processed_at: JiffTimestampMillisecondsOpt,

    /// The raw Atom XML body (or a synthesized stand-in for polled videos),
    /// kept for forensic replay.
    pub raw_payload: String,

    pub source: Source,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
