//! API endpoints.

mod auth;
mod following;
mod groups;
mod posts;
mod profiles;

use axum::Router;

use crate::middleware::AppState;

pub use groups::GroupResponse;
pub use profiles::UserResponse;

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/posts", posts::router())
        .nest("/groups", groups::router())
        .nest("/profiles", profiles::router())
        .nest("/follow", following::router())
}
