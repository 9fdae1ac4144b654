//! Following service.

use quill_common::{AppResult, IdGenerator};
use quill_db::{
    entities::{follow, user},
    repositories::{FollowRepository, UserRepository},
};
use sea_orm::Set;
use serde::Serialize;
use tracing::info;

use crate::guard::require_actor;

/// Outcome of a follow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FollowResult {
    /// A new follow edge was created.
    Following,
    /// The edge already existed; nothing changed.
    AlreadyFollowing,
    /// Users cannot follow themselves; nothing changed.
    SelfFollowIgnored,
}

/// Outcome of an unfollow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnfollowResult {
    Unfollowed,
    NotFollowing,
}

/// Following service for business logic.
#[derive(Clone)]
pub struct FollowingService {
    follow_repo: FollowRepository,
    user_repo: UserRepository,
    id_gen: IdGenerator,
}

impl FollowingService {
    /// Create a new following service.
    #[must_use]
    pub const fn new(follow_repo: FollowRepository, user_repo: UserRepository) -> Self {
        Self {
            follow_repo,
            user_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Make `follower_id` follow `author_id`.
    ///
    /// Idempotent: following twice, or following yourself, changes nothing.
    pub async fn follow(&self, follower_id: &str, author_id: &str) -> AppResult<FollowResult> {
        if follower_id == author_id {
            return Ok(FollowResult::SelfFollowIgnored);
        }

        let model = follow::ActiveModel {
            id: Set(self.id_gen.generate()),
            follower_id: Set(follower_id.to_string()),
            author_id: Set(author_id.to_string()),
            created_at: Set(chrono::Utc::now().into()),
        };

        if self.follow_repo.insert_if_absent(model).await? {
            info!(follower_id = %follower_id, author_id = %author_id, "Follow created");
            Ok(FollowResult::Following)
        } else {
            Ok(FollowResult::AlreadyFollowing)
        }
    }

    /// Remove the follow edge, if any.
    pub async fn unfollow(&self, follower_id: &str, author_id: &str) -> AppResult<UnfollowResult> {
        if self.follow_repo.delete_by_pair(follower_id, author_id).await? {
            info!(follower_id = %follower_id, author_id = %author_id, "Follow removed");
            Ok(UnfollowResult::Unfollowed)
        } else {
            Ok(UnfollowResult::NotFollowing)
        }
    }

    /// Check if `follower_id` follows `author_id`.
    pub async fn is_following(&self, follower_id: &str, author_id: &str) -> AppResult<bool> {
        self.follow_repo.is_following(follower_id, author_id).await
    }

    /// Follow the user named `username`.
    pub async fn follow_by_username(
        &self,
        actor: Option<&user::Model>,
        username: &str,
    ) -> AppResult<FollowResult> {
        let actor = require_actor(actor)?;
        let author = self.user_repo.get_by_username(username).await?;
        self.follow(&actor.id, &author.id).await
    }

    /// Unfollow the user named `username`.
    pub async fn unfollow_by_username(
        &self,
        actor: Option<&user::Model>,
        username: &str,
    ) -> AppResult<UnfollowResult> {
        let actor = require_actor(actor)?;
        let author = self.user_repo.get_by_username(username).await?;
        self.unfollow(&actor.id, &author.id).await
    }

    /// Count followers of a user.
    pub async fn count_followers(&self, user_id: &str) -> AppResult<u64> {
        self.follow_repo.count_followers(user_id).await
    }

    /// Count users a user follows.
    pub async fn count_following(&self, user_id: &str) -> AppResult<u64> {
        self.follow_repo.count_following(user_id).await
    }
}
