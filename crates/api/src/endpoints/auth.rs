//! Authentication endpoints.

use axum::{Json, Router, extract::State, routing::post};
use quill_common::AppResult;
use quill_core::RegisterInput;
use serde::{Deserialize, Serialize};

use crate::{middleware::AppState, response::ApiResponse};

/// Signup request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub username: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Signup response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub token: String,
}

/// Create a new user account.
async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<ApiResponse<SignupResponse>> {
    let input = RegisterInput {
        username: req.username,
        name: req.name,
        email: req.email,
    };

    let user = state.user_service.register(input).await?;

    Ok(ApiResponse::created(SignupResponse {
        id: user.id,
        username: user.username,
        name: user.name,
        token: user.token.unwrap_or_default(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/signup", post(signup))
}
