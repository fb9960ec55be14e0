use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    CodeStore, StoreError, UserStore, REFERRALS_CODE_FKEY, REFERRALS_EMAIL_KEY,
    REFERRAL_CODES_CODE_KEY, USERS_EMAIL_KEY,
};
use crate::models::{
    referral_codes::{NewReferralCode, ReferralCode},
    referrals::{Referral, ReferralLink},
    users::{NewUser, User},
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    codes: Vec<ReferralCode>,
    referrals: Vec<Referral>,
    unavailable: bool,
}

/// In-process store backing both [`UserStore`] and [`CodeStore`] in tests.
/// Enforces the same constraints as the Postgres schema.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail as if the database stalled.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Seeds a code directly, bypassing the active-code check.
    pub fn insert_code(&self, code: ReferralCode) {
        self.lock().codes.push(code);
    }

    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    pub fn codes(&self) -> Vec<ReferralCode> {
        self.lock().codes.clone()
    }

    pub fn referrals(&self) -> Vec<Referral> {
        self.lock().referrals.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn available(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self.lock();
        if state.unavailable {
            return Err(StoreError::Timeout(Duration::from_secs(5)));
        }
        Ok(state)
    }
}

fn new_id() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

fn insert_user(state: &mut State, new_user: &NewUser) -> Result<User, StoreError> {
    if state.users.iter().any(|u| u.email == new_user.email) {
        return Err(StoreError::UniqueViolation(USERS_EMAIL_KEY.to_string()));
    }

    let user = User {
        id: new_id(),
        email: new_user.email.clone(),
        password_hash: new_user.password_hash.clone(),
        created_at: Utc::now(),
    };
    state.users.push(user.clone());

    Ok(user)
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, StoreError> {
        let mut state = self.available()?;
        insert_user(&mut state, new_user)
    }

    async fn create_referred_user(
        &self,
        new_user: &NewUser,
        link: &ReferralLink,
    ) -> Result<(User, Referral), StoreError> {
        let mut state = self.available()?;

        if state.referrals.iter().any(|r| r.email == new_user.email) {
            return Err(StoreError::UniqueViolation(REFERRALS_EMAIL_KEY.to_string()));
        }
        if !state.codes.iter().any(|c| c.id == link.code_id) {
            return Err(StoreError::ForeignKeyViolation(REFERRALS_CODE_FKEY.to_string()));
        }

        let user = insert_user(&mut state, new_user)?;
        let referral = Referral {
            id: new_id(),
            email: user.email.clone(),
            referral_code_id: Some(link.code_id.clone()),
            referrer_id: link.referrer_id.clone(),
            created_at: Utc::now(),
        };
        state.referrals.push(referral.clone());

        Ok((user, referral))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.available()?
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl CodeStore for MemoryStore {
    async fn create_code(&self, new_code: &NewReferralCode) -> Result<ReferralCode, StoreError> {
        let mut state = self.available()?;
        let now = Utc::now();

        if state
            .codes
            .iter()
            .any(|c| c.referrer_id == new_code.referrer_id && c.is_active_at(now))
        {
            return Err(StoreError::ActiveCodeExists);
        }
        if state.codes.iter().any(|c| c.code == new_code.code) {
            return Err(StoreError::UniqueViolation(
                REFERRAL_CODES_CODE_KEY.to_string(),
            ));
        }

        let code = ReferralCode {
            id: new_id(),
            code: new_code.code.clone(),
            referrer_id: new_code.referrer_id.clone(),
            expires_at: new_code.expires_at,
            created_at: now,
            updated_at: now,
        };
        state.codes.push(code.clone());

        Ok(code)
    }

    async fn delete_code_by_id(&self, id: &str) -> Result<u64, StoreError> {
        let mut state = self.available()?;
        let before = state.codes.len();
        state.codes.retain(|c| c.id != id);
        let removed = (before - state.codes.len()) as u64;

        for referral in state.referrals.iter_mut() {
            if referral.referral_code_id.as_deref() == Some(id) {
                referral.referral_code_id = None;
            }
        }

        Ok(removed)
    }

    async fn get_active_code_by_referrer_id(
        &self,
        referrer_id: &str,
    ) -> Result<ReferralCode, StoreError> {
        let now = Utc::now();
        self.available()?
            .codes
            .iter()
            .filter(|c| c.referrer_id == referrer_id && c.is_active_at(now))
            .max_by_key(|c| c.created_at)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_code_id_and_expiration(
        &self,
        code: &str,
    ) -> Result<(String, DateTime<Utc>), StoreError> {
        self.available()?
            .codes
            .iter()
            .find(|c| c.code == code)
            .map(|c| (c.id.clone(), c.expires_at))
            .ok_or(StoreError::NotFound)
    }

    async fn get_referrer_id_by_code(&self, code: &str) -> Result<String, StoreError> {
        self.available()?
            .codes
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.referrer_id.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn list_referrals_by_referrer_id(
        &self,
        referrer_id: &str,
    ) -> Result<Vec<Referral>, StoreError> {
        Ok(self
            .available()?
            .referrals
            .iter()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect())
    }
}
