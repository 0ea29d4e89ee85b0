use sea_orm::{DeriveActiveEnum, EnumIter};

/// How a [`WebhookEvent`]/[`ProcessedVideo`] row came to exist.
///
/// [`WebhookEvent`]: entity::webhook_event::Model
/// [`ProcessedVideo`]: entity::processed_video::Model
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Source {
    #[sea_orm(string_value = "webhook")]
    Webhook,
    #[sea_orm(string_value = "polling")]
    Polling,
    /// Only ever used on a [`ProcessedVideo`] row, never on a [`WebhookEvent`]:
    /// reserved for an operator manually re-running a single insert.
    ///
    /// [`ProcessedVideo`]: entity::processed_video::Model
    /// [`WebhookEvent`]: entity::webhook_event::Model
    #[sea_orm(string_value = "manual")]
    Manual,
}
