//! User repository.

use std::sync::Arc;

use super::write_error;
use crate::entities::{User, user};
use quill_common::{AppError, AppResult};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

/// User repository for database operations.
#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a user by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<user::Model>> {
        User::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<user::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    /// Find users by IDs.
    pub async fn find_by_ids(&self, ids: &[String]) -> AppResult<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        User::find()
            .filter(user::Column::Id.is_in(ids.to_vec()))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by username (case-insensitive).
    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::UsernameLower.eq(username.to_lowercase()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a user by username, returning an error if not found.
    pub async fn get_by_username(&self, username: &str) -> AppResult<user::Model> {
        self.find_by_username(username)
            .await?
            .ok_or_else(|| AppError::UserNotFound(username.to_string()))
    }

    /// Find a user by token.
    pub async fn find_by_token(&self, token: &str) -> AppResult<Option<user::Model>> {
        User::find()
            .filter(user::Column::Token.eq(token))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a new user. A username taken in any letter case is a `Conflict`.
    pub async fn create(&self, model: user::ActiveModel) -> AppResult<user::Model> {
        let username = model.username.try_as_ref().cloned().unwrap_or_default();
        model.insert(self.db.as_ref()).await.map_err(|e| {
            write_error(
                &e,
                || AppError::Conflict(format!("Username already taken: {username}")),
                || AppError::Database(e.to_string()),
            )
        })
    }

    /// Delete a user. Their posts, comments and follow edges go with them.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = User::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn create_test_user(id: &str, username: &str) -> user::Model {
        user::Model {
            id: id.to_string(),
            username: username.to_string(),
            username_lower: username.to_lowercase(),
            name: Some("Test User".to_string()),
            email: None,
            token: Some("test_token".to_string()),
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let user = create_test_user("u1", "serg");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let found = repo.find_by_id("u1").await.unwrap().unwrap();

        assert_eq!(found.username, "serg");
    }

    #[tokio::test]
    async fn test_get_by_username_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let result = repo.get_by_username("nobody").await;

        assert!(matches!(result, Err(AppError::UserNotFound(name)) if name == "nobody"));
    }

    #[tokio::test]
    async fn test_find_by_username_is_case_insensitive() {
        let user = create_test_user("u1", "Serg");

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[user.clone()]])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        let found = repo.find_by_username("SERG").await.unwrap().unwrap();
        assert_eq!(found.username_lower, "serg");
    }

    #[tokio::test]
    async fn test_find_by_ids_empty_skips_query() {
        // No results appended: a query would fail
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());

        let repo = UserRepository::new(db);
        let users = repo.find_by_ids(&[]).await.unwrap();

        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = UserRepository::new(db);
        assert!(repo.delete("u1").await.unwrap());
    }
}
