//! Authorization guards called at the start of each core operation.

use quill_common::{AppError, AppResult};
use quill_db::entities::{post, user};

/// Require an authenticated actor.
pub fn require_actor(actor: Option<&user::Model>) -> AppResult<&user::Model> {
    actor.ok_or(AppError::Unauthorized)
}

/// Require that `actor` wrote `post`.
pub fn ensure_author(post: &post::Model, actor: &user::Model) -> AppResult<()> {
    if post.author_id == actor.id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only the author can modify this post".to_string(),
        ))
    }
}
