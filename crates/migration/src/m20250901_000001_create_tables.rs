use sea_orm_migration::{prelude::*, schema};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(User::create()).await?;
        manager.create_table(Subscription::create()).await?;
        manager
            .create_index(
                Index::create()
                    .name("idx-subscription-user_id-channel_id")
                    .table(Subscription::Table)
                    .col(Subscription::UserId)
                    .col(Subscription::ChannelId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager.create_table(WebhookEvent::create()).await?;
        manager
            .create_index(
                Index::create()
                    .name("idx-webhook_event-channel_id-video_id")
                    .table(WebhookEvent::Table)
                    .col(WebhookEvent::ChannelId)
                    .col(WebhookEvent::VideoId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .name("idx-webhook_event-processed-received_at")
                    .table(WebhookEvent::Table)
                    .col(WebhookEvent::Processed)
                    .col(WebhookEvent::ReceivedAt)
                    .to_owned(),
            )
            .await?;

        manager.create_table(ProcessedVideo::create()).await?;
        manager
            .create_index(
                Index::create()
                    .name("idx-processed_video-user_id-video_id")
                    .table(ProcessedVideo::Table)
                    .col(ProcessedVideo::UserId)
                    .col(ProcessedVideo::VideoId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager.create_table(ApiQuotaUsage::create()).await?;
        manager
            .create_index(
                Index::create()
                    .name("idx-api_quota_usage-date-service_name")
                    .table(ApiQuotaUsage::Table)
                    .col(ApiQuotaUsage::Date)
                    .col(ApiQuotaUsage::ServiceName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApiQuotaUsage::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ProcessedVideo::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WebhookEvent::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscription::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        Ok(())
    }
}

trait TableTrait {
    fn create() -> TableCreateStatement;
}

#[derive(DeriveIden)]
enum User {
    Table,
    Id,

    EncryptedAccessToken,
    EncryptedRefreshToken,
    AccessTokenExpiresAt,

    PlaylistId,

    AutomationDisabled,
    IsAdmin,
}

impl TableTrait for User {
    fn create() -> TableCreateStatement {
        Table::create()
            .table(User::Table)
            .if_not_exists()
            .col(schema::pk_auto(User::Id))
            .col(schema::blob_null(User::EncryptedAccessToken))
            .col(schema::blob_null(User::EncryptedRefreshToken))
            .col(schema::big_integer_null(User::AccessTokenExpiresAt))
            .col(schema::text_null(User::PlaylistId))
            .col(schema::boolean(User::AutomationDisabled).default(false))
            .col(schema::boolean(User::IsAdmin).default(false))
            .to_owned()
    }
}

#[derive(DeriveIden)]
enum Subscription {
    Table,
    Id,

    UserId,
    ChannelId,
    ChannelTitle,
    Included,
    CreatedAt,

    WebsubSubscribed,
    WebsubLeaseExpiresAt,
    WebsubAttemptCount,
    WebsubLastAttemptAt,

    PollingEnabled,
    LastPolledAt,
    LastPolledVideoId,
}

impl TableTrait for Subscription {
    fn create() -> TableCreateStatement {
        Table::create()
            .table(Subscription::Table)
            .if_not_exists()
            .col(schema::pk_auto(Subscription::Id))
            .col(schema::big_integer(Subscription::UserId))
            .foreign_key(
                ForeignKey::create()
                    .name("fk-subscription-user_id")
                    .from(Subscription::Table, Subscription::UserId)
                    .to(User::Table, User::Id),
            )
            .col(schema::text(Subscription::ChannelId))
            .col(schema::text(Subscription::ChannelTitle))
            .col(schema::boolean(Subscription::Included).default(true))
            .col(schema::big_integer(Subscription::CreatedAt))
            .col(schema::boolean(Subscription::WebsubSubscribed).default(false))
            .col(schema::big_integer_null(Subscription::WebsubLeaseExpiresAt))
            .col(schema::integer(Subscription::WebsubAttemptCount).default(0))
            .col(schema::big_integer_null(Subscription::WebsubLastAttemptAt))
            .col(schema::boolean(Subscription::PollingEnabled).default(true))
            .col(schema::big_integer_null(Subscription::LastPolledAt))
            .col(schema::text_null(Subscription::LastPolledVideoId))
            .to_owned()
    }
}

#[derive(DeriveIden)]
enum WebhookEvent {
    Table,
    Id,

    ChannelId,
    VideoId,
    Title,

    ReceivedAt,
    Processed,
    ProcessedAt,

    RawPayload,
    Source,
}

impl TableTrait for WebhookEvent {
    fn create() -> TableCreateStatement {
        Table::create()
            .table(WebhookEvent::Table)
            .if_not_exists()
            .col(schema::pk_auto(WebhookEvent::Id))
            .col(schema::text(WebhookEvent::ChannelId))
            .col(schema::text(WebhookEvent::VideoId))
            .col(schema::text_null(WebhookEvent::Title))
            .col(schema::big_integer(WebhookEvent::ReceivedAt))
            .col(schema::boolean(WebhookEvent::Processed).default(false))
            .col(schema::big_integer_null(WebhookEvent::ProcessedAt))
            .col(schema::text(WebhookEvent::RawPayload))
            .col(schema::text(WebhookEvent::Source))
            .to_owned()
    }
}

#[derive(DeriveIden)]
enum ProcessedVideo {
    Table,
    Id,

    UserId,
    VideoId,
    ChannelId,
    Title,

    ProcessedAt,
    AddedToPlaylist,
    ErrorMessage,
    RetryCount,
    Source,
}

impl TableTrait for ProcessedVideo {
    fn create() -> TableCreateStatement {
        Table::create()
            .table(ProcessedVideo::Table)
            .if_not_exists()
            .col(schema::pk_auto(ProcessedVideo::Id))
            .col(schema::big_integer(ProcessedVideo::UserId))
            .foreign_key(
                ForeignKey::create()
                    .name("fk-processed_video-user_id")
                    .from(ProcessedVideo::Table, ProcessedVideo::UserId)
                    .to(User::Table, User::Id),
            )
            .col(schema::text(ProcessedVideo::VideoId))
            .col(schema::text(ProcessedVideo::ChannelId))
            .col(schema::text_null(ProcessedVideo::Title))
            .col(schema::big_integer(ProcessedVideo::ProcessedAt))
            .col(schema::boolean(ProcessedVideo::AddedToPlaylist))
            .col(schema::text_null(ProcessedVideo::ErrorMessage))
            .col(schema::integer(ProcessedVideo::RetryCount).default(0))
            .col(schema::text(ProcessedVideo::Source))
            .to_owned()
    }
}

#[derive(DeriveIden)]
enum ApiQuotaUsage {
    Table,
    Id,

    Date,
    ServiceName,

    RequestsUsed,
    QuotaLimit,
    CostUnitsUsed,
    CostUnitLimit,

    LastUpdated,
}

impl TableTrait for ApiQuotaUsage {
    fn create() -> TableCreateStatement {
        Table::create()
            .table(ApiQuotaUsage::Table)
            .if_not_exists()
            .col(schema::pk_auto(ApiQuotaUsage::Id))
            .col(schema::text(ApiQuotaUsage::Date))
            .col(schema::text(ApiQuotaUsage::ServiceName))
            .col(schema::integer(ApiQuotaUsage::RequestsUsed).default(0))
            .col(schema::integer(ApiQuotaUsage::QuotaLimit).default(0))
            .col(schema::integer(ApiQuotaUsage::CostUnitsUsed).default(0))
            .col(schema::integer(ApiQuotaUsage::CostUnitLimit).default(0))
            .col(schema::big_integer(ApiQuotaUsage::LastUpdated))
            .to_owned()
    }
}
