//! Group repository.

use std::sync::Arc;

use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

use super::write_error;
use crate::entities::{Group, group};

/// Repository for group operations.
#[derive(Clone)]
pub struct GroupRepository {
    db: Arc<DatabaseConnection>,
}

impl GroupRepository {
    /// Create a new group repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find group by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<group::Model>> {
        Group::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find groups by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<group::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        Group::find()
            .filter(group::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find group by slug.
    pub async fn find_by_slug(&self, slug: &str) -> AppResult<Option<group::Model>> {
        Group::find()
            .filter(group::Column::Slug.eq(slug))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get group by slug, returning error if not found.
    pub async fn get_by_slug(&self, slug: &str) -> AppResult<group::Model> {
        self.find_by_slug(slug)
            .await?
            .ok_or_else(|| AppError::GroupNotFound(slug.to_string()))
    }

    /// List all groups by title.
    pub async fn list(&self) -> AppResult<Vec<group::Model>> {
        Group::find()
            .order_by_asc(group::Column::Title)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a group.
    ///
    /// A slug that is already taken is a `Conflict`.
    pub async fn create(&self, model: group::ActiveModel) -> AppResult<group::Model> {
        let slug = model.slug.try_as_ref().cloned().unwrap_or_default();
        model.insert(self.db.as_ref()).await.map_err(|e| {
            write_error(
                &e,
                || AppError::Conflict(format!("Slug already taken: {slug}")),
                || AppError::Database(e.to_string()),
            )
        })
    }

    /// Delete a group. Its posts remain, with their group cleared.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = Group::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }
}
