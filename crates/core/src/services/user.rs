//! User service.

use std::sync::{Arc, LazyLock};

use quill_common::{AppError, AppResult, IdGenerator};
use quill_db::{entities::user, repositories::UserRepository};
use regex::Regex;
use sea_orm::Set;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use crate::cache::TimelineCache;

#[allow(clippy::unwrap_used)]
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.@+-]+$").unwrap());

/// Input for signing up.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 150), regex(path = *USERNAME_RE))]
    pub username: String,

    #[validate(length(max = 150))]
    pub name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

/// User service for business logic.
#[derive(Clone)]
pub struct UserService {
    user_repo: UserRepository,
    cache: Arc<dyn TimelineCache>,
    id_gen: IdGenerator,
}

impl UserService {
    /// Create a new user service.
    #[must_use]
    pub fn new(user_repo: UserRepository, cache: Arc<dyn TimelineCache>) -> Self {
        Self {
            user_repo,
            cache,
            id_gen: IdGenerator::new(),
        }
    }

    /// Sign up a new user. The returned model carries their bearer token.
    pub async fn register(&self, input: RegisterInput) -> AppResult<user::Model> {
        input.validate()?;

        if self
            .user_repo
            .find_by_username(&input.username)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Username already taken: {}",
                input.username
            )));
        }

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            username_lower: Set(input.username.to_lowercase()),
            username: Set(input.username),
            name: Set(input.name.filter(|n| !n.trim().is_empty())),
            email: Set(input.email),
            token: Set(Some(self.id_gen.generate_token())),
            created_at: Set(chrono::Utc::now().into()),
        };

        let user = self.user_repo.create(model).await?;
        info!(user_id = %user.id, username = %user.username, "User registered");

        Ok(user)
    }

    /// Resolve a bearer token to its user.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)
    }

    /// Get a user by ID.
    pub async fn get(&self, id: &str) -> AppResult<user::Model> {
        self.user_repo.get_by_id(id).await
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(&self, username: &str) -> AppResult<user::Model> {
        self.user_repo.get_by_username(username).await
    }

    /// Delete a user with their posts, comments and follow edges.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        if !self.user_repo.delete(id).await? {
            return Err(AppError::UserNotFound(id.to_string()));
        }

        info!(user_id = %id, "User deleted");
        self.cache.clear().await;

        Ok(())
    }
}
