use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{json_body, AppState, ErrorResponse};
use crate::{
    models::{
        referrals::ReferralInfo,
        users::{Credentials, ReferredCredentials},
    },
    services::{dispatch, referrals::ReferralRequest, ServiceError},
};

#[derive(Serialize, ToSchema)]
pub struct ReferralRegistration {
    pub email: String,
    pub referrer_id: String,
}

#[utoipa::path(
    post,
    path = "/auth/register/referral",
    request_body = ReferredCredentials,
    responses(
        (status = 201, description = "User registered and linked to the referrer", body = ReferralRegistration),
        (status = 400, description = "Invalid request or expired code", body = ErrorResponse),
        (status = 404, description = "Referral code not found", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "referrals"
)]
pub async fn register_with_referral(
    State(state): State<AppState>,
    payload: Result<Json<ReferredCredentials>, JsonRejection>,
) -> Result<(StatusCode, Json<ReferralRegistration>), ServiceError> {
    let request = json_body(payload)?;
    let credentials = Credentials {
        email: request.email,
        password: request.password,
    };

    let referral = dispatch(&state.referral_channel, "referrals", |response| {
        ReferralRequest::RegisterWithCode {
            code: request.referral_code,
            credentials,
            response,
        }
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReferralRegistration {
            email: referral.email,
            referrer_id: referral.referrer_id,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/referral/id/{referrer_id}",
    params(("referrer_id" = String, Path, description = "UUID of the referrer")),
    responses(
        (status = 200, description = "Referrals ordered by creation time", body = [ReferralInfo]),
        (status = 400, description = "Malformed referrer id", body = ErrorResponse),
        (status = 404, description = "No referrals found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "referrals"
)]
pub async fn list_referrals(
    State(state): State<AppState>,
    Path(referrer_id): Path<String>,
) -> Result<(StatusCode, Json<Vec<ReferralInfo>>), ServiceError> {
    let referrer_id = Uuid::parse_str(&referrer_id)
        .map_err(|_| ServiceError::Validation("Invalid referrer id.".to_string()))?
        .hyphenated()
        .to_string();

    let referrals = dispatch(&state.referral_channel, "referrals", |response| {
        ReferralRequest::ListReferrals {
            referrer_id,
            response,
        }
    })
    .await?;

    Ok((StatusCode::OK, Json(referrals)))
}
