use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use tokio::sync::{mpsc, oneshot};

use super::{auth::AuthRequest, dispatch, RequestHandler, Service, ServiceError};
use crate::{
    models::referral_codes::{NewReferralCode, ReferralCode},
    repositories::{CodeStore, StoreError, REFERRAL_CODES_CODE_KEY},
};

pub const CODE_LENGTH: usize = 8;
const CODE_ENTROPY_BYTES: usize = 8;
const MAX_CODE_ATTEMPTS: usize = 3;

/// Eight uppercased base64url characters drawn from the OS CSPRNG.
pub fn generate_code() -> Result<String, rand::Error> {
    let mut bytes = [0u8; CODE_ENTROPY_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;

    let mut code = URL_SAFE_NO_PAD.encode(bytes).to_uppercase();
    code.truncate(CODE_LENGTH);

    Ok(code)
}

pub enum ReferralCodeRequest {
    CreateCode {
        referrer_id: String,
        expires_at: DateTime<Utc>,
        response: oneshot::Sender<Result<ReferralCode, ServiceError>>,
    },
    DeleteActiveCode {
        referrer_id: String,
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    LookupByOwnerEmail {
        email: String,
        response: oneshot::Sender<Result<ReferralCode, ServiceError>>,
    },
    ResolveCodeId {
        code: String,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    ResolveReferrerId {
        code: String,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ReferralCodeRequestHandler {
    repository: Arc<dyn CodeStore>,
    auth_channel: mpsc::Sender<AuthRequest>,
    generator: fn() -> Result<String, rand::Error>,
}

fn code_not_found(error: StoreError) -> ServiceError {
    match error {
        StoreError::NotFound => ServiceError::CodeNotFound,
        other => other.into(),
    }
}

impl ReferralCodeRequestHandler {
    pub fn new(repository: Arc<dyn CodeStore>, auth_channel: mpsc::Sender<AuthRequest>) -> Self {
        ReferralCodeRequestHandler {
            repository,
            auth_channel,
            generator: generate_code,
        }
    }

    #[cfg(test)]
    fn with_generator(mut self, generator: fn() -> Result<String, rand::Error>) -> Self {
        self.generator = generator;
        self
    }

    pub async fn create_code(
        &self,
        referrer_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ReferralCode, ServiceError> {
        if expires_at <= Utc::now() {
            return Err(ServiceError::Validation(
                "Expiration date must be in the future.".to_string(),
            ));
        }

        match self.repository.get_active_code_by_referrer_id(referrer_id).await {
            Ok(_) => return Err(ServiceError::CodeAlreadyActive),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = (self.generator)()
                .map_err(|e| ServiceError::Internal(format!("Could not generate code: {}", e)))?;
            let new_code = NewReferralCode {
                code,
                referrer_id: referrer_id.to_string(),
                expires_at,
            };

            match self.repository.create_code(&new_code).await {
                Ok(code) => {
                    log::info!("Created referral code {} for {}.", code.id, referrer_id);
                    return Ok(code);
                }
                Err(StoreError::UniqueViolation(ref constraint))
                    if constraint == REFERRAL_CODES_CODE_KEY =>
                {
                    log::warn!(
                        "Referral code collision on attempt {}/{}.",
                        attempt,
                        MAX_CODE_ATTEMPTS
                    );
                }
                Err(StoreError::ActiveCodeExists) => return Err(ServiceError::CodeAlreadyActive),
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Internal(
            "Could not generate a unique referral code.".to_string(),
        ))
    }

    pub async fn delete_active_code(&self, referrer_id: &str) -> Result<(), ServiceError> {
        let code = self
            .repository
            .get_active_code_by_referrer_id(referrer_id)
            .await
            .map_err(code_not_found)?;

        let deleted = self.repository.delete_code_by_id(&code.id).await?;
        if deleted == 0 {
            return Err(ServiceError::CodeNotFound);
        }
        log::info!("Deleted referral code {} of {}.", code.id, referrer_id);

        Ok(())
    }

    pub async fn lookup_by_owner_email(&self, email: &str) -> Result<ReferralCode, ServiceError> {
        let email = email.to_string();
        let owner = dispatch(&self.auth_channel, "auth", |response| {
            AuthRequest::GetUserByEmail { email, response }
        })
        .await?;

        self.repository
            .get_active_code_by_referrer_id(&owner.id)
            .await
            .map_err(code_not_found)
    }

    /// Fails with [`ServiceError::CodeExpired`] without revealing the id.
    pub async fn resolve_code_id(&self, code: &str) -> Result<String, ServiceError> {
        let (id, expires_at) = self
            .repository
            .get_code_id_and_expiration(code)
            .await
            .map_err(code_not_found)?;

        if expires_at <= Utc::now() {
            return Err(ServiceError::CodeExpired);
        }

        Ok(id)
    }

    pub async fn resolve_referrer_id(&self, code: &str) -> Result<String, ServiceError> {
        self.repository
            .get_referrer_id_by_code(code)
            .await
            .map_err(code_not_found)
    }
}

#[async_trait]
impl RequestHandler<ReferralCodeRequest> for ReferralCodeRequestHandler {
    async fn handle_request(&self, request: ReferralCodeRequest) {
        match request {
            ReferralCodeRequest::CreateCode {
                referrer_id,
                expires_at,
                response,
            } => {
                log::debug!("Creating referral code for {}.", referrer_id);
                let code = self.create_code(&referrer_id, expires_at).await;
                let _ = response.send(code);
            }
            ReferralCodeRequest::DeleteActiveCode {
                referrer_id,
                response,
            } => {
                log::debug!("Deleting active referral code of {}.", referrer_id);
                let result = self.delete_active_code(&referrer_id).await;
                let _ = response.send(result);
            }
            ReferralCodeRequest::LookupByOwnerEmail { email, response } => {
                let code = self.lookup_by_owner_email(&email).await;
                let _ = response.send(code);
            }
            ReferralCodeRequest::ResolveCodeId { code, response } => {
                let id = self.resolve_code_id(&code).await;
                let _ = response.send(id);
            }
            ReferralCodeRequest::ResolveReferrerId { code, response } => {
                let referrer_id = self.resolve_referrer_id(&code).await;
                let _ = response.send(referrer_id);
            }
        }
    }
}

pub struct ReferralCodeService;

impl ReferralCodeService {
    pub fn new() -> Self {
        ReferralCodeService {}
    }
}

#[async_trait]
impl Service<ReferralCodeRequest, ReferralCodeRequestHandler> for ReferralCodeService {}
