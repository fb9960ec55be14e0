use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    referral_codes::{NewReferralCode, ReferralCode},
    referrals::{Referral, ReferralLink},
    users::{NewUser, User},
};

#[cfg(test)]
pub mod memory;
pub mod referrals;
pub mod users;

pub const USERS_EMAIL_KEY: &str = "users_email_key";
pub const REFERRAL_CODES_CODE_KEY: &str = "referral_codes_code_key";
pub const REFERRALS_EMAIL_KEY: &str = "referrals_email_key";
pub const REFERRALS_CODE_FKEY: &str = "referrals_referral_code_id_fkey";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found.")]
    NotFound,
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("Foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),
    #[error("Referrer already holds an active referral code.")]
    ActiveCodeExists,
    #[error("Store operation timed out after {0:?}.")]
    Timeout(Duration),
    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().unwrap_or_default().to_string())
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                StoreError::ForeignKeyViolation(db.constraint().unwrap_or_default().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Credential store: owns user rows and enforces email uniqueness.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, StoreError>;

    /// Inserts the user and its referral row atomically. Either both rows
    /// exist afterwards or neither does.
    async fn create_referred_user(
        &self,
        new_user: &NewUser,
        link: &ReferralLink,
    ) -> Result<(User, Referral), StoreError>;

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;
}

/// Code store: owns referral codes and the referrals listed per referrer.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Fails with [`StoreError::ActiveCodeExists`] when the referrer already
    /// holds a non-expired code. The check and the insert are atomic.
    async fn create_code(&self, new_code: &NewReferralCode) -> Result<ReferralCode, StoreError>;

    async fn delete_code_by_id(&self, id: &str) -> Result<u64, StoreError>;

    async fn get_active_code_by_referrer_id(
        &self,
        referrer_id: &str,
    ) -> Result<ReferralCode, StoreError>;

    async fn get_code_id_and_expiration(
        &self,
        code: &str,
    ) -> Result<(String, DateTime<Utc>), StoreError>;

    async fn get_referrer_id_by_code(&self, code: &str) -> Result<String, StoreError>;

    async fn list_referrals_by_referrer_id(
        &self,
        referrer_id: &str,
    ) -> Result<Vec<Referral>, StoreError>;
}

/// Bounds a store operation so a stalled database cannot hold a worker.
pub async fn with_timeout<T, F>(limit: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
