use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

use crate::{
    repositories::{
        referrals::ReferralRepository, users::UserRepository, CodeStore, StoreError, UserStore,
    },
    settings::Settings,
};

pub mod auth;
pub mod http;
pub mod referral_codes;
pub mod referrals;
#[cfg(test)]
mod test_support;

use auth::{
    password::PasswordHasher,
    tokens::{TokenError, TokenSigner},
    AuthRequest, AuthRequestHandler, AuthService,
};
use referral_codes::{ReferralCodeRequest, ReferralCodeRequestHandler, ReferralCodeService};
use referrals::{ReferralRequest, ReferralRequestHandler, ReferralService};

pub const CHANNEL_CAPACITY: usize = 512;

/// Coarse classification used by transports to pick a status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Auth,
    Store,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),
    #[error("User already exists.")]
    UserAlreadyExists,
    #[error("Referrer already has an active referral code.")]
    CodeAlreadyActive,
    #[error("User not found.")]
    UserNotFound,
    #[error("Referral code not found.")]
    CodeNotFound,
    #[error("Referral code has expired.")]
    CodeExpired,
    #[error("No referrals found.")]
    ReferralsNotFound,
    #[error("Invalid credentials.")]
    BadPassword,
    #[error("Missing bearer token.")]
    MissingToken,
    #[error("Invalid token: {0}")]
    InvalidToken(#[from] TokenError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) | ServiceError::CodeExpired => ErrorKind::Validation,
            ServiceError::UserAlreadyExists | ServiceError::CodeAlreadyActive => {
                ErrorKind::Conflict
            }
            ServiceError::UserNotFound
            | ServiceError::CodeNotFound
            | ServiceError::ReferralsNotFound => ErrorKind::NotFound,
            ServiceError::BadPassword
            | ServiceError::MissingToken
            | ServiceError::InvalidToken(_) => ErrorKind::Auth,
            ServiceError::Store(_) => ErrorKind::Store,
            ServiceError::Internal(_) | ServiceError::Communication(_, _) => ErrorKind::Internal,
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Sends a request built around a fresh responder and waits for the reply.
pub async fn dispatch<R, T>(
    channel: &mpsc::Sender<R>,
    service: &str,
    build: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> R,
) -> Result<T, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(build(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

#[derive(Clone)]
pub struct ServiceChannels {
    pub auth: mpsc::Sender<AuthRequest>,
    pub referral_codes: mpsc::Sender<ReferralCodeRequest>,
    pub referrals: mpsc::Sender<ReferralRequest>,
}

pub fn spawn_services(auth_handler: AuthRequestHandler, codes: Arc<dyn CodeStore>) -> ServiceChannels {
    let (auth_tx, mut auth_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (code_tx, mut code_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (referral_tx, mut referral_rx) = mpsc::channel(CHANNEL_CAPACITY);

    log::info!("Starting auth service.");
    tokio::spawn(async move {
        AuthService::new().run(auth_handler, &mut auth_rx).await;
    });

    log::info!("Starting referral code service.");
    let code_handler = ReferralCodeRequestHandler::new(codes.clone(), auth_tx.clone());
    tokio::spawn(async move {
        ReferralCodeService::new().run(code_handler, &mut code_rx).await;
    });

    log::info!("Starting referral service.");
    let referral_handler = ReferralRequestHandler::new(codes, code_tx.clone(), auth_tx.clone());
    tokio::spawn(async move {
        ReferralService::new()
            .run(referral_handler, &mut referral_rx)
            .await;
    });

    ServiceChannels {
        auth: auth_tx,
        referral_codes: code_tx,
        referrals: referral_tx,
    }
}

pub async fn start_services(pool: PgPool, settings: Settings) -> Result<(), anyhow::Error> {
    let timeout = settings.store.timeout();
    let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(pool.clone(), timeout));
    let codes: Arc<dyn CodeStore> = Arc::new(ReferralRepository::new(pool, timeout));

    let hasher = PasswordHasher::new(
        settings.auth.argon2_memory_kib,
        settings.auth.argon2_iterations,
    )
    .map_err(|e| anyhow::anyhow!("Invalid password hashing parameters: {}", e))?;
    let tokens = TokenSigner::new(
        settings.auth.secret_key.as_bytes(),
        chrono::Duration::hours(settings.auth.token_ttl_hours),
    );

    let channels = spawn_services(AuthRequestHandler::new(users, hasher, tokens), codes);
    log::info!("Started services.");

    http::start_http_server(channels, &settings.server.listen).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ServiceError::Validation("bad".to_string()), ErrorKind::Validation)]
    #[case(ServiceError::CodeExpired, ErrorKind::Validation)]
    #[case(ServiceError::UserAlreadyExists, ErrorKind::Conflict)]
    #[case(ServiceError::CodeAlreadyActive, ErrorKind::Conflict)]
    #[case(ServiceError::CodeNotFound, ErrorKind::NotFound)]
    #[case(ServiceError::ReferralsNotFound, ErrorKind::NotFound)]
    #[case(ServiceError::InvalidToken(TokenError::Expired), ErrorKind::Auth)]
    #[case(
        ServiceError::Store(StoreError::Timeout(std::time::Duration::from_secs(5))),
        ErrorKind::Store
    )]
    #[case(ServiceError::Communication("auth".into(), "closed".into()), ErrorKind::Internal)]
    fn test_error_kind(#[case] error: ServiceError, #[case] kind: ErrorKind) {
        assert_eq!(error.kind(), kind);
    }

    #[tokio::test]
    async fn test_dispatch_reports_closed_channel() {
        let (tx, rx) = mpsc::channel::<oneshot::Sender<Result<(), ServiceError>>>(1);
        drop(rx);

        let result = dispatch(&tx, "test", |response| response).await;

        assert!(matches!(result, Err(ServiceError::Communication(ref s, _)) if s == "test"));
    }

    #[tokio::test]
    async fn test_dispatch_reports_dropped_responder() {
        let (tx, mut rx) = mpsc::channel::<oneshot::Sender<Result<(), ServiceError>>>(1);
        tokio::spawn(async move {
            let _ = rx.recv().await;
        });

        let result = dispatch(&tx, "test", |response| response).await;

        assert!(matches!(result, Err(ServiceError::Communication(_, _))));
    }
}
