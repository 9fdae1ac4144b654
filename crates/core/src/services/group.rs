//! Group service.

use std::sync::{Arc, LazyLock};

use quill_common::{AppError, AppResult, IdGenerator};
use quill_db::{entities::group, repositories::GroupRepository};
use regex::Regex;
use sea_orm::Set;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::cache::TimelineCache;

#[allow(clippy::unwrap_used)]
static SLUG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Input for creating a group.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(min = 1, max = 200), regex(path = *SLUG_RE))]
    pub slug: String,

    #[serde(default)]
    pub description: String,
}

/// Group service for business logic.
#[derive(Clone)]
pub struct GroupService {
    group_repo: GroupRepository,
    cache: Arc<dyn TimelineCache>,
    id_gen: IdGenerator,
}

impl GroupService {
    /// Create a new group service.
    #[must_use]
    pub fn new(group_repo: GroupRepository, cache: Arc<dyn TimelineCache>) -> Self {
        Self {
            group_repo,
            cache,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create a group. Slugs are unique.
    pub async fn create(&self, input: CreateGroupInput) -> AppResult<group::Model> {
        input.validate()?;

        if self.group_repo.find_by_slug(&input.slug).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Group slug already in use: {}",
                input.slug
            )));
        }

        let model = group::ActiveModel {
            id: Set(self.id_gen.generate()),
            title: Set(input.title),
            slug: Set(input.slug),
            description: Set(input.description),
            created_at: Set(chrono::Utc::now().into()),
        };

        let group = self.group_repo.create(model).await?;
        info!(group_id = %group.id, slug = %group.slug, "Group created");

        Ok(group)
    }

    /// Get a group by slug.
    pub async fn get_by_slug(&self, slug: &str) -> AppResult<group::Model> {
        self.group_repo.get_by_slug(slug).await
    }

    /// List all groups.
    pub async fn list(&self) -> AppResult<Vec<group::Model>> {
        self.group_repo.list().await
    }

    /// Delete a group. Its posts stay, no longer filed under any group.
    pub async fn delete(&self, slug: &str) -> AppResult<()> {
        let group = self.group_repo.get_by_slug(slug).await?;
        self.group_repo.delete(&group.id).await?;

        info!(slug = %slug, "Group deleted");
        self.cache.clear().await;

        Ok(())
    }
}
