//! Create user table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(User::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(User::Username).string_len(150).not_null())
                    .col(ColumnDef::new(User::UsernameLower).string_len(150).not_null())
                    .col(ColumnDef::new(User::Name).string_len(256))
                    .col(ColumnDef::new(User::Email).string_len(254))
                    .col(ColumnDef::new(User::Token).string_len(64))
                    .col(
                        ColumnDef::new(User::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: username_lower (usernames are case-insensitive)
        manager
            .create_index(
                Index::create()
                    .name("idx_user_username_lower")
                    .table(User::Table)
                    .col(User::UsernameLower)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_username")
                    .table(User::Table)
                    .col(User::Username)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Unique index: token
        manager
            .create_index(
                Index::create()
                    .name("idx_user_token")
                    .table(User::Table)
                    .col(User::Token)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum User {
    Table,
    Id,
    Username,
    UsernameLower,
    Name,
    Email,
    Token,
    CreatedAt,
}
