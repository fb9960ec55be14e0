use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::{json_body, AppState, AuthenticatedUser, ErrorResponse};
use crate::{
    models::referral_codes::{CreateReferralCode, ReferralCodeResponse},
    services::{dispatch, referral_codes::ReferralCodeRequest, ServiceError},
};

#[utoipa::path(
    post,
    path = "/referral_code",
    request_body = CreateReferralCode,
    responses(
        (status = 201, description = "Referral code created", body = ReferralCodeResponse),
        (status = 400, description = "Invalid or past expiration date", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 409, description = "An active code already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "referral_codes"
)]
pub async fn create_referral_code(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<CreateReferralCode>, JsonRejection>,
) -> Result<(StatusCode, Json<ReferralCodeResponse>), ServiceError> {
    let request = json_body(payload)?;
    let expires_at = request.expiration().map_err(|_| {
        ServiceError::Validation("Invalid expiration date, expected DD.MM.YYYY.".to_string())
    })?;
    log::debug!("{} requested a referral code.", user.claims.email);

    let code = dispatch(&state.referral_code_channel, "referral_codes", |response| {
        ReferralCodeRequest::CreateCode {
            referrer_id: user.id,
            expires_at,
            response,
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ReferralCodeResponse::from(code))))
}

#[utoipa::path(
    delete,
    path = "/referral_code",
    responses(
        (status = 204, description = "Active referral code deleted"),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 404, description = "No active referral code", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "referral_codes"
)]
pub async fn delete_referral_code(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<StatusCode, ServiceError> {
    dispatch(&state.referral_code_channel, "referral_codes", |response| {
        ReferralCodeRequest::DeleteActiveCode {
            referrer_id: user.id,
            response,
        }
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/referral_code/email/{email}",
    params(("email" = String, Path, description = "Email of the code owner")),
    responses(
        (status = 200, description = "Active referral code", body = ReferralCodeResponse),
        (status = 404, description = "Unknown user or no active code", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "referral_codes"
)]
pub async fn get_referral_code_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<(StatusCode, Json<ReferralCodeResponse>), ServiceError> {
    let code = dispatch(&state.referral_code_channel, "referral_codes", |response| {
        ReferralCodeRequest::LookupByOwnerEmail { email, response }
    })
    .await?;

    Ok((StatusCode::OK, Json(ReferralCodeResponse::from(code))))
}
