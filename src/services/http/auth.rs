use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use super::{json_body, AppState, ErrorResponse};
use crate::{
    models::users::Credentials,
    services::{auth::AuthRequest, dispatch, ServiceError},
};

#[derive(Serialize, ToSchema)]
pub struct RegisterResponse {
    pub id: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = Credentials,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ServiceError> {
    let credentials = json_body(payload)?;

    let user = dispatch(&state.auth_channel, "auth", |response| {
        AuthRequest::Register {
            credentials,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { id: user.id })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = Credentials,
    responses(
        (status = 200, description = "Bearer token issued", body = TokenResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<TokenResponse>), ServiceError> {
    let credentials = json_body(payload)?;

    // Unknown emails and wrong passwords look the same to the client.
    let token = dispatch(&state.auth_channel, "auth", |response| {
        AuthRequest::Authenticate {
            credentials,
            response,
        }
    })
    .await
    .map_err(|e| match e {
        ServiceError::UserNotFound => ServiceError::BadPassword,
        other => other,
    })?;

    Ok((StatusCode::OK, Json(TokenResponse { token })))
}
