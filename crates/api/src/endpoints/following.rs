//! Following feed endpoint.

use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use quill_common::{AppResult, Page};
use quill_core::PostView;

use crate::{
    extractors::{MaybeAuthUser, PageQuery},
    middleware::AppState,
    response::ApiResponse,
};

/// Posts by the authors the user follows.
async fn following_feed(
    MaybeAuthUser(user): MaybeAuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<ApiResponse<Page<PostView>>> {
    let page = state.feed_service.page_request(query.page.as_deref());
    let posts = state
        .feed_service
        .list_following_feed(user.as_ref(), page)
        .await?;
    Ok(ApiResponse::ok(posts))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(following_feed))
}
