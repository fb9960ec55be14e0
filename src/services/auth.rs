use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::{
        referrals::{Referral, ReferralLink},
        users::{Credentials, NewUser, User},
    },
    repositories::{
        StoreError, UserStore, REFERRALS_CODE_FKEY, REFERRALS_EMAIL_KEY, USERS_EMAIL_KEY,
    },
};

pub mod password;
pub mod tokens;

use password::PasswordHasher;
use tokens::{Claims, TokenSigner};

pub enum AuthRequest {
    Register {
        credentials: Credentials,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
    RegisterReferred {
        credentials: Credentials,
        link: ReferralLink,
        response: oneshot::Sender<Result<Referral, ServiceError>>,
    },
    Authenticate {
        credentials: Credentials,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
    ValidateToken {
        token: String,
        response: oneshot::Sender<Result<Claims, ServiceError>>,
    },
    GetUserByEmail {
        email: String,
        response: oneshot::Sender<Result<User, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct AuthRequestHandler {
    repository: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenSigner,
}

impl AuthRequestHandler {
    pub fn new(repository: Arc<dyn UserStore>, hasher: PasswordHasher, tokens: TokenSigner) -> Self {
        AuthRequestHandler {
            repository,
            hasher,
            tokens,
        }
    }

    /// Rejects taken emails before paying for a hash.
    async fn prepare_user(&self, credentials: &Credentials) -> Result<NewUser, ServiceError> {
        let email = credentials.email.trim();
        if email.is_empty() || credentials.password.is_empty() {
            return Err(ServiceError::Validation(
                "Email and password are required.".to_string(),
            ));
        }

        match self.repository.get_user_by_email(email).await {
            Ok(_) => return Err(ServiceError::UserAlreadyExists),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let password_hash = self
            .hasher
            .hash(&credentials.password)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(NewUser {
            email: email.to_string(),
            password_hash,
        })
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<User, ServiceError> {
        let new_user = self.prepare_user(credentials).await?;

        let user = self
            .repository
            .create_user(&new_user)
            .await
            .map_err(registration_error)?;
        log::info!("Registered user {}.", user.id);

        Ok(user)
    }

    /// Creates the user and its referral row in one store transaction.
    pub async fn register_referred(
        &self,
        credentials: &Credentials,
        link: &ReferralLink,
    ) -> Result<Referral, ServiceError> {
        let new_user = self.prepare_user(credentials).await?;

        let (user, referral) = self
            .repository
            .create_referred_user(&new_user, link)
            .await
            .map_err(registration_error)?;
        log::info!(
            "Registered user {} referred by {}.",
            user.id,
            referral.referrer_id
        );

        Ok(referral)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, ServiceError> {
        self.repository
            .get_user_by_email(email.trim())
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServiceError::UserNotFound,
                other => other.into(),
            })
    }

    pub async fn authenticate(&self, credentials: &Credentials) -> Result<String, ServiceError> {
        let user = self.get_user_by_email(&credentials.email).await?;

        let matches = self
            .hasher
            .verify(&credentials.password, &user.password_hash)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;
        if !matches {
            log::warn!("Failed login for user {}.", user.id);
            return Err(ServiceError::BadPassword);
        }

        self.issue_token(&user)
    }

    pub fn issue_token(&self, user: &User) -> Result<String, ServiceError> {
        self.tokens
            .issue(user)
            .map_err(|e| ServiceError::Internal(format!("Could not sign token: {}", e)))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        self.tokens.validate(token).map_err(|e| {
            log::warn!("Rejected bearer token: {}.", e);
            ServiceError::InvalidToken(e)
        })
    }
}

fn registration_error(error: StoreError) -> ServiceError {
    match error {
        StoreError::UniqueViolation(ref constraint)
            if constraint == USERS_EMAIL_KEY || constraint == REFERRALS_EMAIL_KEY =>
        {
            ServiceError::UserAlreadyExists
        }
        StoreError::ForeignKeyViolation(ref constraint) if constraint == REFERRALS_CODE_FKEY => {
            ServiceError::CodeNotFound
        }
        other => ServiceError::Store(other),
    }
}

#[async_trait]
impl RequestHandler<AuthRequest> for AuthRequestHandler {
    async fn handle_request(&self, request: AuthRequest) {
        match request {
            AuthRequest::Register {
                credentials,
                response,
            } => {
                log::debug!("Handling registration request.");
                let user = self.register(&credentials).await;
                let _ = response.send(user);
            }
            AuthRequest::RegisterReferred {
                credentials,
                link,
                response,
            } => {
                log::debug!("Handling referred registration for code {}.", link.code_id);
                let referral = self.register_referred(&credentials, &link).await;
                let _ = response.send(referral);
            }
            AuthRequest::Authenticate {
                credentials,
                response,
            } => {
                let token = self.authenticate(&credentials).await;
                let _ = response.send(token);
            }
            AuthRequest::ValidateToken { token, response } => {
                let claims = self.validate_token(&token);
                let _ = response.send(claims);
            }
            AuthRequest::GetUserByEmail { email, response } => {
                let user = self.get_user_by_email(&email).await;
                let _ = response.send(user);
            }
        }
    }
}

pub struct AuthService;

impl AuthService {
    pub fn new() -> Self {
        AuthService {}
    }
}

#[async_trait]
impl Service<AuthRequest, AuthRequestHandler> for AuthService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repositories::memory::MemoryStore,
        services::test_support::{auth_handler, credentials, seed_code},
    };
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let store = MemoryStore::new();
        let handler = auth_handler(&store);

        let user = handler
            .register(&credentials("alice@example.com", "secret"))
            .await
            .unwrap();
        let token = handler
            .authenticate(&credentials("alice@example.com", "secret"))
            .await
            .unwrap();

        let claims = handler.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_ne!(store.users()[0].password_hash, "secret");
    }

    #[tokio::test]
    async fn test_register_rejects_taken_email() {
        let store = MemoryStore::new();
        let handler = auth_handler(&store);
        handler
            .register(&credentials("alice@example.com", "secret"))
            .await
            .unwrap();

        let result = handler
            .register(&credentials("alice@example.com", "other"))
            .await;

        assert!(matches!(result, Err(ServiceError::UserAlreadyExists)));
        assert_eq!(store.users().len(), 1);
    }

    #[tokio::test]
    async fn test_register_requires_email_and_password() {
        let handler = auth_handler(&MemoryStore::new());

        let result = handler.register(&credentials(" ", "secret")).await;

        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_authenticate_wrong_password() {
        let store = MemoryStore::new();
        let handler = auth_handler(&store);
        handler
            .register(&credentials("alice@example.com", "secret"))
            .await
            .unwrap();

        let result = handler
            .authenticate(&credentials("alice@example.com", "wrong"))
            .await;

        assert!(matches!(result, Err(ServiceError::BadPassword)));
    }

    #[tokio::test]
    async fn test_authenticate_unknown_user() {
        let handler = auth_handler(&MemoryStore::new());

        let result = handler
            .authenticate(&credentials("nobody@example.com", "secret"))
            .await;

        assert!(matches!(result, Err(ServiceError::UserNotFound)));
    }

    #[tokio::test]
    async fn test_register_referred_writes_user_and_referral() {
        let store = MemoryStore::new();
        let handler = auth_handler(&store);
        let alice = handler
            .register(&credentials("alice@example.com", "secret"))
            .await
            .unwrap();
        let code = seed_code(&store, &alice.id, "ABCDEFGH", Utc::now() + Duration::days(1));
        let link = ReferralLink {
            code_id: code.id.clone(),
            referrer_id: alice.id.clone(),
        };

        let referral = handler
            .register_referred(&credentials("bob@example.com", "secret"), &link)
            .await
            .unwrap();

        assert_eq!(referral.email, "bob@example.com");
        assert_eq!(referral.referrer_id, alice.id);
        assert_eq!(referral.referral_code_id, Some(code.id));
        assert_eq!(store.users().len(), 2);
        assert_eq!(store.referrals().len(), 1);
    }

    #[tokio::test]
    async fn test_register_referred_with_vanished_code_writes_nothing() {
        let store = MemoryStore::new();
        let handler = auth_handler(&store);
        let link = ReferralLink {
            code_id: "missing".to_string(),
            referrer_id: "someone".to_string(),
        };

        let result = handler
            .register_referred(&credentials("bob@example.com", "secret"), &link)
            .await;

        assert!(matches!(result, Err(ServiceError::CodeNotFound)));
        assert!(store.users().is_empty());
        assert!(store.referrals().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new();
        let handler = auth_handler(&store);
        store.set_unavailable(true);

        let result = handler
            .register(&credentials("alice@example.com", "secret"))
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Store(StoreError::Timeout(_)))
        ));
    }
}
