use jiff_sea_orm_compat::JiffTimestampMilliseconds;
use sea_orm::entity::prelude::*;

/// Daily Platform API quota consumption, one row per (date, service_name).
/// `date` is a plain `YYYY-MM-DD` string so the unique key reads naturally in
/// a dashboard query without needing a dedicated date column type.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_quota_usage")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub date: String,
    pub service_name: String,

    pub requests_used: i32,
    pub quota_limit: i32,
    pub cost_units_used: i32,
    pub cost_unit_limit: i32,

    pub last_updated: JiffTimestampMilliseconds,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
