//! Comment service.

use std::collections::HashMap;

use quill_common::{AppError, AppResult, IdGenerator};
use quill_db::{
    entities::{comment, user},
    repositories::{CommentRepository, PostRepository, UserRepository},
};
use sea_orm::{Set, prelude::DateTimeWithTimeZone};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use crate::guard::require_actor;

/// Maximum comment length in characters.
pub const MAX_COMMENT_TEXT_LEN: u64 = 2000;

/// Input for adding a comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentInput {
    #[validate(length(max = "MAX_COMMENT_TEXT_LEN"))]
    pub text: String,
}

/// A comment with its author's username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_username: String,
    pub text: String,
    pub created_at: DateTimeWithTimeZone,
}

impl CommentView {
    fn new(comment: comment::Model, author_username: String) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_username,
            text: comment.text,
            created_at: comment.created_at,
        }
    }
}

/// Comment service for business logic.
#[derive(Clone)]
pub struct CommentService {
    comment_repo: CommentRepository,
    post_repo: PostRepository,
    user_repo: UserRepository,
    id_gen: IdGenerator,
}

impl CommentService {
    /// Create a new comment service.
    #[must_use]
    pub const fn new(
        comment_repo: CommentRepository,
        post_repo: PostRepository,
        user_repo: UserRepository,
    ) -> Self {
        Self {
            comment_repo,
            post_repo,
            user_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Add a comment to a post.
    pub async fn add_comment(
        &self,
        actor: Option<&user::Model>,
        post_id: &str,
        input: CreateCommentInput,
    ) -> AppResult<CommentView> {
        let actor = require_actor(actor)?;
        input.validate()?;

        let text = input.text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Comment text is required".to_string()));
        }

        let post = self.post_repo.get_by_id(post_id).await?;

        let model = comment::ActiveModel {
            id: Set(self.id_gen.generate()),
            post_id: Set(post.id),
            author_id: Set(actor.id.clone()),
            text: Set(text.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        let comment = self.comment_repo.create(model).await?;
        info!(comment_id = %comment.id, post_id = %post_id, "Comment added");

        Ok(CommentView::new(comment, actor.username.clone()))
    }

    /// Comments on a post, newest first.
    pub async fn list_for_post(&self, post_id: &str) -> AppResult<Vec<CommentView>> {
        let comments = self.comment_repo.find_by_post(post_id).await?;

        let mut author_ids: Vec<String> = comments.iter().map(|c| c.author_id.clone()).collect();
        author_ids.sort_unstable();
        author_ids.dedup();

        let authors: HashMap<String, String> = self
            .user_repo
            .find_by_ids(&author_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect();

        comments
            .into_iter()
            .map(|comment| {
                let username = authors
                    .get(&comment.author_id)
                    .cloned()
                    .ok_or_else(|| AppError::UserNotFound(comment.author_id.clone()))?;
                Ok(CommentView::new(comment, username))
            })
            .collect()
    }

    /// Count comments on a post.
    pub async fn count_for_post(&self, post_id: &str) -> AppResult<u64> {
        self.comment_repo.count_by_post(post_id).await
    }
}
