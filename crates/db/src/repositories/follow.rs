//! Follow repository.

use std::sync::Arc;

use super::write_error;
use crate::entities::{Follow, follow};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    sea_query::OnConflict,
};

/// Follow repository for database operations.
#[derive(Clone)]
pub struct FollowRepository {
    db: Arc<DatabaseConnection>,
}

impl FollowRepository {
    /// Create a new follow repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a follow edge by follower and author.
    pub async fn find_by_pair(
        &self,
        follower_id: &str,
        author_id: &str,
    ) -> AppResult<Option<follow::Model>> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::AuthorId.eq(author_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Check if a user is following an author.
    pub async fn is_following(&self, follower_id: &str, author_id: &str) -> AppResult<bool> {
        Ok(self.find_by_pair(follower_id, author_id).await?.is_some())
    }

    /// Insert a follow edge unless one already exists for the pair.
    ///
    /// Runs as a single `INSERT ... ON CONFLICT DO NOTHING`, so concurrent
    /// requests cannot produce a duplicate edge. Returns whether a row was
    /// inserted.
    pub async fn insert_if_absent(&self, model: follow::ActiveModel) -> AppResult<bool> {
        let author_id = model.author_id.try_as_ref().cloned().unwrap_or_default();
        let inserted = Follow::insert(model)
            .on_conflict(
                OnConflict::columns([follow::Column::FollowerId, follow::Column::AuthorId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| {
                write_error(
                    &e,
                    || AppError::Database(e.to_string()),
                    || AppError::UserNotFound(author_id),
                )
            })?;

        Ok(inserted > 0)
    }

    /// Delete the follow edge for a pair. Returns whether a row was removed.
    pub async fn delete_by_pair(&self, follower_id: &str, author_id: &str) -> AppResult<bool> {
        let result = Follow::delete_many()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .filter(follow::Column::AuthorId.eq(author_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }

    /// Count followers of an author.
    pub async fn count_followers(&self, author_id: &str) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::AuthorId.eq(author_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count authors a user follows.
    pub async fn count_following(&self, follower_id: &str) -> AppResult<u64> {
        Follow::find()
            .filter(follow::Column::FollowerId.eq(follower_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
