//! Post service: creation, editing and deletion of posts.

use std::sync::Arc;

use quill_common::{AppError, AppResult, IdGenerator, StorageBackend, generate_storage_key};
use quill_db::{
    entities::{post, user},
    repositories::{GroupRepository, PostRepository, PostScope},
};
use sea_orm::Set;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use crate::cache::TimelineCache;
use crate::guard::{ensure_author, require_actor};
use crate::services::comment::{CommentService, CommentView};
use crate::services::feed::{PostView, PostViewAssembler};
use crate::services::media::decode_image;

/// Maximum post length in characters.
pub const MAX_POST_TEXT_LEN: u64 = 10_000;

/// Input for creating a post.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    #[validate(length(max = "MAX_POST_TEXT_LEN"))]
    pub text: String,

    pub group_id: Option<String>,

    /// Base64-encoded image, optionally as a `data:` URL.
    pub image: Option<String>,
}

/// Input for editing a post. Image and author cannot change.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    #[validate(length(max = "MAX_POST_TEXT_LEN"))]
    pub text: String,

    pub group_id: Option<String>,
}

/// A post with its comments.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostView,
    pub comment_count: u64,
    pub comments: Vec<CommentView>,
    pub author_post_count: u64,
}

/// Post service for business logic.
#[derive(Clone)]
pub struct PostService {
    post_repo: PostRepository,
    group_repo: GroupRepository,
    comments: CommentService,
    views: PostViewAssembler,
    storage: Arc<dyn StorageBackend>,
    cache: Arc<dyn TimelineCache>,
    id_gen: IdGenerator,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub fn new(
        post_repo: PostRepository,
        group_repo: GroupRepository,
        comments: CommentService,
        views: PostViewAssembler,
        storage: Arc<dyn StorageBackend>,
        cache: Arc<dyn TimelineCache>,
    ) -> Self {
        Self {
            post_repo,
            group_repo,
            comments,
            views,
            storage,
            cache,
            id_gen: IdGenerator::new(),
        }
    }

    /// Publish a new post.
    pub async fn create_post(
        &self,
        actor: Option<&user::Model>,
        input: CreatePostInput,
    ) -> AppResult<PostView> {
        let actor = require_actor(actor)?;
        input.validate()?;
        require_text(&input.text)?;
        self.check_group(input.group_id.as_deref()).await?;

        let image = match input.image.as_deref() {
            Some(encoded) => Some(decode_image(encoded).await?),
            None => None,
        };

        let image_key = match image {
            Some(image) => {
                let key = generate_storage_key("posts", image.format.extension());
                let stored = self
                    .storage
                    .upload(&key, &image.data, image.format.mime_type())
                    .await?;
                Some(stored.key)
            }
            None => None,
        };

        let model = post::ActiveModel {
            id: Set(self.id_gen.generate()),
            text: Set(input.text),
            author_id: Set(actor.id.clone()),
            group_id: Set(input.group_id),
            image: Set(image_key.clone()),
            created_at: Set(chrono::Utc::now().into()),
            updated_at: Set(None),
        };

        let post = match self.post_repo.create(model).await {
            Ok(post) => post,
            Err(e) => {
                if let Some(key) = image_key {
                    self.remove_image(&key).await;
                }
                return Err(e);
            }
        };

        info!(post_id = %post.id, author_id = %actor.id, "Post created");
        self.cache.clear().await;

        self.views.assemble_one(post).await
    }

    /// Edit the text and group of a post.
    ///
    /// Only the author may edit; anyone else gets `Forbidden` and the post is
    /// left untouched.
    pub async fn edit_post(
        &self,
        actor: Option<&user::Model>,
        post_id: &str,
        input: UpdatePostInput,
    ) -> AppResult<PostView> {
        let actor = require_actor(actor)?;
        let post = self.post_repo.get_by_id(post_id).await?;
        ensure_author(&post, actor)?;

        input.validate()?;
        require_text(&input.text)?;
        self.check_group(input.group_id.as_deref()).await?;

        let updated = self
            .post_repo
            .update_if_author(
                post_id,
                &actor.id,
                input.text,
                input.group_id,
                chrono::Utc::now().into(),
            )
            .await?;

        if updated == 0 {
            // Deleted between the read and the update
            return Err(AppError::PostNotFound(post_id.to_string()));
        }

        info!(post_id = %post_id, "Post edited");
        self.cache.clear().await;

        let post = self.post_repo.get_by_id(post_id).await?;
        self.views.assemble_one(post).await
    }

    /// A post with its comments and the number of posts by its author.
    pub async fn get_post(&self, post_id: &str) -> AppResult<PostDetail> {
        let post = self.post_repo.get_by_id(post_id).await?;
        let author_post_count = self
            .post_repo
            .count(&PostScope::Author(post.author_id.clone()))
            .await?;

        let comment_count = self.comments.count_for_post(post_id).await?;
        let comments = self.comments.list_for_post(post_id).await?;

        Ok(PostDetail {
            post: self.views.assemble_one(post).await?,
            comment_count,
            comments,
            author_post_count,
        })
    }

    /// Delete a post along with its comments and image.
    pub async fn delete_post(&self, actor: Option<&user::Model>, post_id: &str) -> AppResult<()> {
        let actor = require_actor(actor)?;
        let post = self.post_repo.get_by_id(post_id).await?;
        ensure_author(&post, actor)?;

        if !self.post_repo.delete(post_id).await? {
            return Err(AppError::PostNotFound(post_id.to_string()));
        }

        if let Some(key) = post.image.as_deref() {
            self.remove_image(key).await;
        }

        info!(post_id = %post_id, "Post deleted");
        self.cache.clear().await;

        Ok(())
    }

    async fn check_group(&self, group_id: Option<&str>) -> AppResult<()> {
        if let Some(group_id) = group_id
            && self.group_repo.find_by_id(group_id).await?.is_none()
        {
            return Err(AppError::Validation(format!("Unknown group: {group_id}")));
        }
        Ok(())
    }

    async fn remove_image(&self, key: &str) {
        if let Err(e) = self.storage.delete(key).await {
            warn!(error = %e, key = %key, "Failed to remove post image");
        }
    }
}

fn require_text(text: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::Validation("Post text is required".to_string()));
    }
    Ok(())
}
