//! Group endpoints.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use quill_common::{AppResult, Page};
use quill_core::{CreateGroupInput, PostView};
use quill_db::entities::group;
use serde::Serialize;

use crate::{
    extractors::{AuthUser, PageQuery},
    middleware::AppState,
    response::ApiResponse,
};

/// Group response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub created_at: String,
}

impl From<group::Model> for GroupResponse {
    fn from(g: group::Model) -> Self {
        Self {
            id: g.id,
            title: g.title,
            slug: g.slug,
            description: g.description,
            created_at: g.created_at.to_rfc3339(),
        }
    }
}

/// A group with one page of its posts.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupFeedResponse {
    pub group: GroupResponse,
    pub posts: Page<PostView>,
}

/// List all groups.
async fn list_groups(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<GroupResponse>>> {
    let groups = state.group_service.list().await?;
    Ok(ApiResponse::ok(groups.into_iter().map(Into::into).collect()))
}

/// Create a group.
async fn create_group(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateGroupInput>,
) -> AppResult<ApiResponse<GroupResponse>> {
    let group = state.group_service.create(input).await?;
    tracing::debug!(user_id = %user.id, slug = %group.slug, "Group created via API");
    Ok(ApiResponse::created(group.into()))
}

/// Posts in a group.
async fn list_group(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<GroupFeedResponse>> {
    let page = state.feed_service.page_request(query.page.as_deref());
    let feed = state.feed_service.list_group(&slug, page).await?;

    Ok(ApiResponse::ok(GroupFeedResponse {
        group: feed.group.into(),
        posts: feed.posts,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups).post(create_group))
        .route("/{slug}", get(list_group))
}
