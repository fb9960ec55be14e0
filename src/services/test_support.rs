use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{
    auth::{password::PasswordHasher, tokens::TokenSigner, AuthRequestHandler},
    spawn_services, ServiceChannels,
};
use crate::{
    models::{referral_codes::ReferralCode, users::Credentials},
    repositories::memory::MemoryStore,
};

pub const SECRET: &[u8] = b"test-signing-secret";

/// Auth handler over `store` with the cheapest argon2 cost.
pub fn auth_handler(store: &MemoryStore) -> AuthRequestHandler {
    AuthRequestHandler::new(
        Arc::new(store.clone()),
        PasswordHasher::new(8, 1).unwrap(),
        TokenSigner::new(SECRET, Duration::hours(24)),
    )
}

pub fn spawn(store: &MemoryStore) -> ServiceChannels {
    spawn_services(auth_handler(store), Arc::new(store.clone()))
}

pub fn credentials(email: &str, password: &str) -> Credentials {
    Credentials {
        email: email.to_string(),
        password: password.to_string(),
    }
}

pub fn seed_code(
    store: &MemoryStore,
    referrer_id: &str,
    code: &str,
    expires_at: DateTime<Utc>,
) -> ReferralCode {
    let now = Utc::now();
    let code = ReferralCode {
        id: Uuid::new_v4().hyphenated().to_string(),
        code: code.to_string(),
        referrer_id: referrer_id.to_string(),
        expires_at,
        created_at: now,
        updated_at: now,
    };
    store.insert_code(code.clone());

    code
}
