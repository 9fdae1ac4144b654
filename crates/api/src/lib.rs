//! HTTP API layer for quill.
//!
//! A JSON API over the core services:
//!
//! - **Endpoints**: auth, posts and comments, groups, profiles, follow feed
//! - **Extractors**: authenticated user, page query
//! - **Middleware**: bearer token authentication
//!
//! Built on Axum 0.8.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::router;
pub use middleware::{AppState, auth_middleware};
