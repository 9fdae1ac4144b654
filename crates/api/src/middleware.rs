//! API middleware.

#![allow(missing_docs)]

use axum::{
    body::Body,
    extract::State,
    http::{Request, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use quill_core::{
    CommentService, FeedService, FollowingService, GroupService, PostService, UserService,
};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub user_service: UserService,
    pub group_service: GroupService,
    pub post_service: PostService,
    pub comment_service: CommentService,
    pub following_service: FollowingService,
    pub feed_service: FeedService,
}

/// Authentication middleware.
///
/// Resolves `Authorization: Bearer <token>` into the request's user. Unknown
/// tokens leave the request anonymous; endpoints that need a user reject it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(auth_header) = req.headers().get(AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        match state.user_service.authenticate_by_token(token.trim()).await {
            Ok(user) => {
                req.extensions_mut().insert(user);
            }
            Err(e) if e.is_server_error() => {
                tracing::warn!(error = %e, "Token lookup failed");
            }
            Err(_) => {}
        }
    }

    next.run(req).await
}
