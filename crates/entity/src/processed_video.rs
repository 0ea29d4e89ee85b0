use entity_types::Source;
use jiff_sea_orm_compat::JiffTimestampMilliseconds;
use sea_orm::entity::prelude::*;

/// Records the outcome of attempting to add one video to one user's managed
/// playlist. The mere existence of a row for (user_id, video_id) means
/// "already attempted" — see the exactly-once property in the fan-out
/// processor.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "processed_video")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub user_id: i64,
    pub video_id: String,
    pub channel_id: String,
    pub title: Option<String>,

    pub processed_at: JiffTimestampMilliseconds,
    pub added_to_playlist: bool,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub source: Source,
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
