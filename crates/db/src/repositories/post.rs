//! Post repository.

use std::sync::Arc;

use crate::entities::{Post, follow, post};
use quill_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
    prelude::DateTimeWithTimeZone,
    sea_query::{Expr, Query},
};

/// Which posts a feed query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostScope {
    /// Every post.
    All,
    /// Posts filed under a group.
    Group(String),
    /// Posts written by an author.
    Author(String),
    /// Posts by every author the given user follows.
    FollowedBy(String),
}

impl PostScope {
    fn condition(&self) -> Condition {
        match self {
            Self::All => Condition::all(),
            Self::Group(group_id) => Condition::all().add(post::Column::GroupId.eq(group_id)),
            Self::Author(author_id) => Condition::all().add(post::Column::AuthorId.eq(author_id)),
            Self::FollowedBy(user_id) => Condition::all().add(
                post::Column::AuthorId.in_subquery(
                    Query::select()
                        .column(follow::Column::AuthorId)
                        .from(follow::Entity)
                        .and_where(follow::Column::FollowerId.eq(user_id))
                        .to_owned(),
                ),
            ),
        }
    }
}

/// Post repository for database operations.
#[derive(Clone)]
pub struct PostRepository {
    db: Arc<DatabaseConnection>,
}

impl PostRepository {
    /// Create a new post repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a post by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<post::Model>> {
        Post::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a post by ID, returning an error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<post::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::PostNotFound(id.to_string()))
    }

    /// Create a new post.
    pub async fn create(&self, model: post::ActiveModel) -> AppResult<post::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Count posts in a scope.
    pub async fn count(&self, scope: &PostScope) -> AppResult<u64> {
        Post::find()
            .filter(scope.condition())
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get one window of a scope, newest first.
    pub async fn find_page(
        &self,
        scope: &PostScope,
        limit: u64,
        offset: u64,
    ) -> AppResult<Vec<post::Model>> {
        Post::find()
            .filter(scope.condition())
            .order_by_desc(post::Column::CreatedAt)
            .order_by_desc(post::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Update text and group of a post, but only if `author_id` wrote it.
    ///
    /// A single `UPDATE ... WHERE id = ? AND author_id = ?`. Returns the number
    /// of rows changed; zero means the post is missing or belongs to someone else.
    pub async fn update_if_author(
        &self,
        id: &str,
        author_id: &str,
        text: String,
        group_id: Option<String>,
        updated_at: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let result = Post::update_many()
            .col_expr(post::Column::Text, Expr::value(text))
            .col_expr(post::Column::GroupId, Expr::value(group_id))
            .col_expr(post::Column::UpdatedAt, Expr::value(Some(updated_at)))
            .filter(post::Column::Id.eq(id))
            .filter(post::Column::AuthorId.eq(author_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Delete a post. Its comments go with it.
    pub async fn delete(&self, id: &str) -> AppResult<bool> {
        let result = Post::delete_by_id(id)
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
    use sea_orm::{DatabaseBackend, DbBackend, MockDatabase, MockExecResult, QueryTrait};

    fn create_test_post(id: &str, author_id: &str) -> post::Model {
        post::Model {
            id: id.to_string(),
            text: format!("Post {id}"),
            author_id: author_id.to_string(),
            group_id: None,
            image: None,
            created_at: Utc::now().into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_followed_by_scope_uses_subquery() {
        let sql = Post::find()
            .filter(PostScope::FollowedBy("andr".to_string()).condition())
            .build(DbBackend::Postgres)
            .to_string();

        assert!(sql.contains("IN (SELECT"));
        assert!(sql.contains(r#"FROM "follow""#));
        assert!(sql.contains("'andr'"));
    }

    #[test]
    fn test_all_scope_has_no_filter() {
        let sql = Post::find()
            .filter(PostScope::All.condition())
            .build(DbBackend::Postgres)
            .to_string();

        assert!(!sql.contains("WHERE"));
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<post::Model>::new()])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::PostNotFound(_))));
    }

    #[tokio::test]
    async fn test_count_scope() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[maplit::btreemap! {
                    "num_items" => sea_orm::Value::BigInt(Some(13))
                }]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let count = repo
            .count(&PostScope::Author("serg".to_string()))
            .await
            .unwrap();

        assert_eq!(count, 13);
    }

    #[tokio::test]
    async fn test_find_page() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[
                    create_test_post("p2", "serg"),
                    create_test_post("p1", "serg"),
                ]])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let posts = repo.find_page(&PostScope::All, 10, 0).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "p2");
    }

    #[tokio::test]
    async fn test_update_if_author_reports_rows() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 1,
                    },
                    MockExecResult {
                        last_insert_id: 0,
                        rows_affected: 0,
                    },
                ])
                .into_connection(),
        );

        let repo = PostRepository::new(db);
        let now = Utc::now().into();

        let changed = repo
            .update_if_author("p1", "serg", "edited".to_string(), None, now)
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let changed = repo
            .update_if_author("p1", "andr", "hijacked".to_string(), None, now)
            .await
            .unwrap();
        assert_eq!(changed, 0);
    }
}
