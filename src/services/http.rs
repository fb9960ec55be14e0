use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use super::{
    auth::{tokens::Claims, AuthRequest},
    dispatch,
    referral_codes::ReferralCodeRequest,
    referrals::ReferralRequest,
    ErrorKind, ServiceChannels, ServiceError,
};

mod auth;
mod doc;
mod referral_codes;
mod referrals;

#[derive(Clone)]
pub struct AppState {
    auth_channel: mpsc::Sender<AuthRequest>,
    referral_code_channel: mpsc::Sender<ReferralCodeRequest>,
    referral_channel: mpsc::Sender<ReferralRequest>,
}

impl From<ServiceChannels> for AppState {
    fn from(channels: ServiceChannels) -> Self {
        AppState {
            auth_channel: channels.auth,
            referral_code_channel: channels.referral_codes,
            referral_channel: channels.referrals,
        }
    }
}

/// Token subject attached to requests that passed [`require_token`].
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: String,
    pub claims: Claims,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Referral code not found.")]
    pub error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match self.kind() {
            ErrorKind::Validation => (StatusCode::BAD_REQUEST, self.to_string()),
            ErrorKind::Conflict => (StatusCode::CONFLICT, self.to_string()),
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ErrorKind::Auth => match self {
                ServiceError::InvalidToken(_) => {
                    (StatusCode::UNAUTHORIZED, "Invalid token.".to_string())
                }
                other => (StatusCode::UNAUTHORIZED, other.to_string()),
            },
            ErrorKind::Store | ErrorKind::Internal => {
                log::error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error.".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServiceError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServiceError::Validation(rejection.body_text()))
}

async fn require_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ServiceError::MissingToken)?
        .to_string();

    let claims = dispatch(&state.auth_channel, "auth", |response| {
        AuthRequest::ValidateToken { token, response }
    })
    .await?;

    request.extensions_mut().insert(AuthenticatedUser {
        id: claims.sub.clone(),
        claims,
    });

    Ok(next.run(request).await)
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String)),
    tag = "health"
)]
async fn health() -> &'static str {
    "OK"
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/referral_code",
            post(referral_codes::create_referral_code)
                .delete(referral_codes::delete_referral_code),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route(
            "/auth/register/referral",
            post(referrals::register_with_referral),
        )
        .route(
            "/referral_code/email/{email}",
            get(referral_codes::get_referral_code_by_email),
        )
        .route("/referral/id/{referrer_id}", get(referrals::list_referrals))
        .route("/health", get(health))
        .merge(protected)
        .merge(
            SwaggerUi::new(doc::SWAGGER_UI_PATH)
                .url(doc::OPENAPI_JSON_PATH, doc::ApiDoc::openapi()),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(
    channels: ServiceChannels,
    listen: &str,
) -> Result<(), anyhow::Error> {
    let app = router(AppState::from(channels));

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
