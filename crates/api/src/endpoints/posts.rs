//! Post and comment endpoints.

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use quill_common::{AppResult, Page};
use quill_core::{
    CommentView, CreateCommentInput, CreatePostInput, MAX_IMAGE_BYTES, PostView, UpdatePostInput,
};
use serde::Serialize;

use crate::{
    extractors::{AuthUser, MaybeAuthUser, PageQuery},
    middleware::AppState,
    response::{ApiResponse, no_content},
};

/// Room for a base64 image plus the JSON around it.
const MAX_BODY_BYTES: usize = MAX_IMAGE_BYTES / 3 * 4 + 64 * 1024;

/// A post with its comments.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDetailResponse {
    pub post: PostView,
    pub comment_count: u64,
    pub comments: Vec<CommentView>,
    pub author_post_count: u64,
}

/// The public timeline.
async fn list_timeline(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<Page<PostView>>> {
    let page = state.feed_service.page_request(query.page.as_deref());
    let posts = state.feed_service.list_timeline(page).await?;
    Ok(ApiResponse::ok(posts))
}

/// Publish a post.
async fn create_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreatePostInput>,
) -> AppResult<ApiResponse<PostView>> {
    let post = state.post_service.create_post(Some(&user), input).await?;
    Ok(ApiResponse::created(post))
}

/// Show a post with its comments.
async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<ApiResponse<PostDetailResponse>> {
    let detail = state.post_service.get_post(&post_id).await?;

    Ok(ApiResponse::ok(PostDetailResponse {
        post: detail.post,
        comment_count: detail.comment_count,
        comments: detail.comments,
        author_post_count: detail.author_post_count,
    }))
}

/// Edit a post. Author only.
async fn edit_post(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<UpdatePostInput>,
) -> AppResult<ApiResponse<PostView>> {
    let post = state
        .post_service
        .edit_post(Some(&user), &post_id, input)
        .await?;
    Ok(ApiResponse::ok(post))
}

/// Delete a post. Author only.
async fn delete_post(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    state
        .post_service
        .delete_post(user.as_ref(), &post_id)
        .await?;
    Ok(no_content())
}

/// Comment on a post.
async fn add_comment(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    Json(input): Json<CreateCommentInput>,
) -> AppResult<ApiResponse<CommentView>> {
    let comment = state
        .comment_service
        .add_comment(Some(&user), &post_id, input)
        .await?;
    Ok(ApiResponse::created(comment))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_timeline).post(create_post))
        .route(
            "/{id}",
            get(get_post).patch(edit_post).delete(delete_post),
        )
        .route("/{id}/comments", post(add_comment))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}
