//! Repositories: one per entity, wrapping sea-orm queries.

mod comment;
mod follow;
mod group;
mod post;
mod user;

pub use comment::CommentRepository;
pub use follow::FollowRepository;
pub use group::GroupRepository;
pub use post::{PostRepository, PostScope};
pub use user::UserRepository;

use quill_common::AppError;
use sea_orm::{DbErr, SqlErr};

/// Map a failed write onto the error taxonomy.
///
/// A unique violation becomes `on_conflict` and a foreign key violation
/// becomes `on_missing`. Anything else is a database error.
pub(crate) fn write_error(
    err: &DbErr,
    on_conflict: impl FnOnce() -> AppError,
    on_missing: impl FnOnce() -> AppError,
) -> AppError {
    classify(err.sql_err(), err, on_conflict, on_missing)
}

fn classify(
    sql_err: Option<SqlErr>,
    err: &DbErr,
    on_conflict: impl FnOnce() -> AppError,
    on_missing: impl FnOnce() -> AppError,
) -> AppError {
    match sql_err {
        Some(SqlErr::UniqueConstraintViolation(_)) => on_conflict(),
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => on_missing(),
        _ => AppError::Database(err.to_string()),
    }
}
