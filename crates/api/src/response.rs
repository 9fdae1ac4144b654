//! API response types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Standard API response wrapper: `{ "data": ... }`.
///
/// Errors do not go through this type; [`quill_common::AppError`] renders
/// its own `{ "error": ... }` body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip)]
    status: StatusCode,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 OK.
    pub const fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            data,
        }
    }

    /// 201 Created.
    pub const fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Empty success response.
#[must_use]
pub fn no_content() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}
