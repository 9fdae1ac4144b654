//! Create post table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Post::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Post::Id).string_len(32).not_null().primary_key())
                    .col(ColumnDef::new(Post::Text).text().not_null())
                    .col(ColumnDef::new(Post::AuthorId).string_len(32).not_null())
                    .col(ColumnDef::new(Post::GroupId).string_len(32))
                    .col(ColumnDef::new(Post::Image).string_len(512))
                    .col(
                        ColumnDef::new(Post::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Post::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_post_author")
                            .from(Post::Table, Post::AuthorId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_post_group")
                            .from(Post::Table, Post::GroupId)
                            .to(PostGroup::Table, PostGroup::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: (created_at, id) for newest-first feeds
        manager
            .create_index(
                Index::create()
                    .name("idx_post_created_at_id")
                    .table(Post::Table)
                    .col(Post::CreatedAt)
                    .col(Post::Id)
                    .to_owned(),
            )
            .await?;

        // Index: author_id (profile and following feeds)
        manager
            .create_index(
                Index::create()
                    .name("idx_post_author_id")
                    .table(Post::Table)
                    .col(Post::AuthorId)
                    .to_owned(),
            )
            .await?;

        // Index: group_id (group feeds)
        manager
            .create_index(
                Index::create()
                    .name("idx_post_group_id")
                    .table(Post::Table)
                    .col(Post::GroupId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Post::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Post {
    Table,
    Id,
    Text,
    AuthorId,
    GroupId,
    Image,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum User {
    Table,
    Id,
}

#[derive(Iden)]
enum PostGroup {
    Table,
    Id,
}
