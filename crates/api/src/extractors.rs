//! Request extractors.

use axum::{extract::FromRequestParts, http::request::Parts};
use quill_common::AppError;
use quill_db::entities::user;
use serde::Deserialize;

/// Authenticated user extractor.
#[derive(Debug, Clone)]
pub struct AuthUser(pub user::Model);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by auth middleware
        parts
            .extensions
            .get::<user::Model>()
            .cloned()
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Optional authenticated user extractor.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<user::Model>);

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.extensions.get::<user::Model>().cloned()))
    }
}

/// `?page=` query parameter.
///
/// Kept as a raw string so that garbage such as `?page=last` falls back to the
/// first page instead of being rejected.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}
