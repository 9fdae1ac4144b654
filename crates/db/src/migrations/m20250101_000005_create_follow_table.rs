//! Create follow table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Follow::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Follow::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Follow::FollowerId).string_len(32).not_null())
                    .col(ColumnDef::new(Follow::AuthorId).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Follow::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    // A user never follows themselves
                    .check(Expr::col(Follow::FollowerId).ne(Expr::col(Follow::AuthorId)))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_follow_follower")
                            .from(Follow::Table, Follow::FollowerId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_follow_author")
                            .from(Follow::Table, Follow::AuthorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Unique index: (follower_id, author_id) - prevent duplicate follows
        manager
            .create_index(
                Index::create()
                    .name("idx_follow_follower_author")
                    .table(Follow::Table)
                    .col(Follow::FollowerId)
                    .col(Follow::AuthorId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Index: author_id (for counting followers)
        manager
            .create_index(
                Index::create()
                    .name("idx_follow_author_id")
                    .table(Follow::Table)
                    .col(Follow::AuthorId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Follow::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Follow {
    Table,
    Id,
    FollowerId,
    AuthorId,
    CreatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}
