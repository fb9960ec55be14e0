use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::{
    auth::AuthRequest, dispatch, referral_codes::ReferralCodeRequest, RequestHandler, Service,
    ServiceError,
};
use crate::{
    models::{
        referrals::{Referral, ReferralInfo, ReferralLink},
        users::Credentials,
    },
    repositories::CodeStore,
};

pub enum ReferralRequest {
    RegisterWithCode {
        code: String,
        credentials: Credentials,
        response: oneshot::Sender<Result<Referral, ServiceError>>,
    },
    ListReferrals {
        referrer_id: String,
        response: oneshot::Sender<Result<Vec<ReferralInfo>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct ReferralRequestHandler {
    repository: Arc<dyn CodeStore>,
    code_channel: mpsc::Sender<ReferralCodeRequest>,
    auth_channel: mpsc::Sender<AuthRequest>,
}

impl ReferralRequestHandler {
    pub fn new(
        repository: Arc<dyn CodeStore>,
        code_channel: mpsc::Sender<ReferralCodeRequest>,
        auth_channel: mpsc::Sender<AuthRequest>,
    ) -> Self {
        ReferralRequestHandler {
            repository,
            code_channel,
            auth_channel,
        }
    }

    /// Code errors are reported before any user is created; the user and
    /// referral rows are then written together or not at all.
    pub async fn register_with_code(
        &self,
        code: &str,
        credentials: Credentials,
    ) -> Result<Referral, ServiceError> {
        let code = code.trim().to_string();
        if code.is_empty() {
            return Err(ServiceError::Validation(
                "Referral code is required.".to_string(),
            ));
        }

        let lookup = code.clone();
        let code_id = dispatch(&self.code_channel, "referral_codes", |response| {
            ReferralCodeRequest::ResolveCodeId {
                code: lookup,
                response,
            }
        })
        .await?;

        let referrer_id = dispatch(&self.code_channel, "referral_codes", |response| {
            ReferralCodeRequest::ResolveReferrerId { code, response }
        })
        .await?;

        let link = ReferralLink {
            code_id,
            referrer_id,
        };
        dispatch(&self.auth_channel, "auth", |response| {
            AuthRequest::RegisterReferred {
                credentials,
                link,
                response,
            }
        })
        .await
    }

    pub async fn list_referrals(&self, referrer_id: &str) -> Result<Vec<ReferralInfo>, ServiceError> {
        let referrals = self
            .repository
            .list_referrals_by_referrer_id(referrer_id)
            .await?;

        if referrals.is_empty() {
            return Err(ServiceError::ReferralsNotFound);
        }

        Ok(referrals.into_iter().map(ReferralInfo::from).collect())
    }
}

#[async_trait]
impl RequestHandler<ReferralRequest> for ReferralRequestHandler {
    async fn handle_request(&self, request: ReferralRequest) {
        match request {
            ReferralRequest::RegisterWithCode {
                code,
                credentials,
                response,
            } => {
                log::debug!("Registering user with referral code {}.", code);
                let referral = self.register_with_code(&code, credentials).await;
                if let Err(ref e) = referral {
                    log::warn!("Referral registration with code {} failed: {}", code, e);
                }
                let _ = response.send(referral);
            }
            ReferralRequest::ListReferrals {
                referrer_id,
                response,
            } => {
                let referrals = self.list_referrals(&referrer_id).await;
                let _ = response.send(referrals);
            }
        }
    }
}

pub struct ReferralService;

impl ReferralService {
    pub fn new() -> Self {
        ReferralService {}
    }
}

#[async_trait]
impl Service<ReferralRequest, ReferralRequestHandler> for ReferralService {}
