//! Profile endpoints: an author's posts and follow controls.

use axum::{
    Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use quill_common::{AppResult, Page};
use quill_core::{FollowResult, PostView, UnfollowResult};
use quill_db::entities::user;
use serde::Serialize;

use crate::{
    extractors::{MaybeAuthUser, PageQuery},
    middleware::AppState,
    response::ApiResponse,
};

/// Public user information.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub created_at: String,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            username: u.username,
            name: u.name,
            created_at: u.created_at.to_rfc3339(),
        }
    }
}

/// Profile response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub post_count: u64,
    pub followers_count: u64,
    pub following_count: u64,
    pub is_followed: bool,
    pub posts: Page<PostView>,
}

#[derive(Serialize)]
struct FollowStatus<T: Serialize> {
    status: T,
}

/// A user's profile and posts.
async fn get_profile(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<ProfileResponse>> {
    let page = state.feed_service.page_request(query.page.as_deref());
    let profile = state
        .feed_service
        .list_profile(viewer.as_ref(), &username, page)
        .await?;

    Ok(ApiResponse::ok(ProfileResponse {
        user: profile.author.into(),
        post_count: profile.post_count,
        followers_count: profile.followers_count,
        following_count: profile.following_count,
        is_followed: profile.is_followed,
        posts: profile.posts,
    }))
}

/// Follow a user.
async fn follow(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<ApiResponse<FollowStatus<FollowResult>>> {
    let status = state
        .following_service
        .follow_by_username(user.as_ref(), &username)
        .await?;
    Ok(ApiResponse::ok(FollowStatus { status }))
}

/// Unfollow a user.
async fn unfollow(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<ApiResponse<FollowStatus<UnfollowResult>>> {
    let status = state
        .following_service
        .unfollow_by_username(user.as_ref(), &username)
        .await?;
    Ok(ApiResponse::ok(FollowStatus { status }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{username}", get(get_profile))
        .route("/{username}/follow", post(follow))
        .route("/{username}/unfollow", post(unfollow))
}
