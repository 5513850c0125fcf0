use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SecurityLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SecurityLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SecurityLogs::GuildId).big_integer().not_null())
                    .col(ColumnDef::new(SecurityLogs::EventType).string_len(32).not_null())
                    .col(ColumnDef::new(SecurityLogs::UserId).big_integer().null())
                    .col(ColumnDef::new(SecurityLogs::TargetId).big_integer().null())
                    .col(
                        ColumnDef::new(SecurityLogs::Content)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(SecurityLogs::Metadata)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(SecurityLogs::Successful)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SecurityLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Lookups are per guild, newest first; retention deletes by age
        manager
            .create_index(
                Index::create()
                    .name("idx-security-logs-guild-created")
                    .table(SecurityLogs::Table)
                    .col(SecurityLogs::GuildId)
                    .col(SecurityLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-security-logs-created-at")
                    .table(SecurityLogs::Table)
                    .col(SecurityLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SecurityLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SecurityLogs {
    Table,
    Id,
    GuildId,
    EventType,
    UserId,
    TargetId,
    Content,
    Metadata,
    Successful,
    CreatedAt,
}
