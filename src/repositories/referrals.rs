use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{with_timeout, CodeStore, StoreError};
use crate::models::{
    referral_codes::{NewReferralCode, ReferralCode},
    referrals::Referral,
};

#[derive(Clone)]
pub struct ReferralRepository {
    conn: PgPool,
    timeout: Duration,
}

impl ReferralRepository {
    pub fn new(conn: PgPool, timeout: Duration) -> Self {
        Self { conn, timeout }
    }
}

#[async_trait]
impl CodeStore for ReferralRepository {
    async fn create_code(&self, new_code: &NewReferralCode) -> Result<ReferralCode, StoreError> {
        let code_id = Uuid::new_v4().hyphenated().to_string();

        with_timeout(self.timeout, async {
            let mut tx = self.conn.begin().await?;

            // Serializes code creation per referrer until the transaction ends.
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&new_code.referrer_id)
                .execute(&mut *tx)
                .await?;

            let active: Option<String> = sqlx::query_scalar(
                "SELECT id FROM referral_codes WHERE referrer_id = $1 AND expires_at > NOW() LIMIT 1",
            )
            .bind(&new_code.referrer_id)
            .fetch_optional(&mut *tx)
            .await?;

            if active.is_some() {
                return Err(StoreError::ActiveCodeExists);
            }

            let code = sqlx::query_as::<_, ReferralCode>(
                r#"
                    INSERT INTO referral_codes (id, code, referrer_id, expires_at)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, code, referrer_id, expires_at, created_at, updated_at
                "#,
            )
            .bind(&code_id)
            .bind(&new_code.code)
            .bind(&new_code.referrer_id)
            .bind(new_code.expires_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok(code)
        })
        .await
    }

    async fn delete_code_by_id(&self, id: &str) -> Result<u64, StoreError> {
        with_timeout(self.timeout, async {
            let result = sqlx::query("DELETE FROM referral_codes WHERE id = $1")
                .bind(id)
                .execute(&self.conn)
                .await?;

            Ok::<_, StoreError>(result.rows_affected())
        })
        .await
    }

    async fn get_active_code_by_referrer_id(
        &self,
        referrer_id: &str,
    ) -> Result<ReferralCode, StoreError> {
        with_timeout(self.timeout, async {
            sqlx::query_as::<_, ReferralCode>(
                r#"
                    SELECT id, code, referrer_id, expires_at, created_at, updated_at
                    FROM referral_codes
                    WHERE referrer_id = $1 AND expires_at > NOW()
                    ORDER BY created_at DESC
                    LIMIT 1
                "#,
            )
            .bind(referrer_id)
            .fetch_optional(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn get_code_id_and_expiration(
        &self,
        code: &str,
    ) -> Result<(String, DateTime<Utc>), StoreError> {
        with_timeout(self.timeout, async {
            sqlx::query_as::<_, (String, DateTime<Utc>)>(
                "SELECT id, expires_at FROM referral_codes WHERE code = $1",
            )
            .bind(code)
            .fetch_optional(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn get_referrer_id_by_code(&self, code: &str) -> Result<String, StoreError> {
        with_timeout(self.timeout, async {
            sqlx::query_scalar::<_, String>("SELECT referrer_id FROM referral_codes WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.conn)
                .await?
                .ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn list_referrals_by_referrer_id(
        &self,
        referrer_id: &str,
    ) -> Result<Vec<Referral>, StoreError> {
        with_timeout(self.timeout, async {
            let referrals = sqlx::query_as::<_, Referral>(
                r#"
                    SELECT id, email, referral_code_id, referrer_id, created_at
                    FROM referrals
                    WHERE referrer_id = $1
                    ORDER BY created_at, id
                "#,
            )
            .bind(referrer_id)
            .fetch_all(&self.conn)
            .await?;

            Ok::<_, StoreError>(referrals)
        })
        .await
    }
}
