//! Comment repository.

use std::sync::Arc;

use super::write_error;
use crate::entities::{Comment, comment};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};

/// Comment repository for database operations.
#[derive(Clone)]
pub struct CommentRepository {
    db: Arc<DatabaseConnection>,
}

impl CommentRepository {
    /// Create a new comment repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Create a new comment.
    ///
    /// Fails with `PostNotFound` when the post is gone by the time the row lands.
    pub async fn create(&self, model: comment::ActiveModel) -> AppResult<comment::Model> {
        let post_id = model.post_id.try_as_ref().cloned().unwrap_or_default();
        model.insert(self.db.as_ref()).await.map_err(|e| {
            write_error(
                &e,
                || AppError::Database(e.to_string()),
                || AppError::PostNotFound(post_id),
            )
        })
    }

    /// Comments on a post, newest first.
    pub async fn find_by_post(&self, post_id: &str) -> AppResult<Vec<comment::Model>> {
        Comment::find()
            .filter(comment::Column::PostId.eq(post_id))
            .order_by_desc(comment::Column::CreatedAt)
            .order_by_desc(comment::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count comments on a post.
    pub async fn count_by_post(&self, post_id: &str) -> AppResult<u64> {
        Comment::find()
            .filter(comment::Column::PostId.eq(post_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
