use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{with_timeout, StoreError, UserStore};
use crate::models::{
    referrals::{Referral, ReferralLink},
    users::{NewUser, User},
};

#[derive(Clone)]
pub struct UserRepository {
    conn: PgPool,
    timeout: Duration,
}

impl UserRepository {
    pub fn new(conn: PgPool, timeout: Duration) -> Self {
        Self { conn, timeout }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn create_user(&self, new_user: &NewUser) -> Result<User, StoreError> {
        let user_id = Uuid::new_v4().hyphenated().to_string();

        with_timeout(self.timeout, async {
            let user = sqlx::query_as::<_, User>(
                r#"
                    INSERT INTO users (id, email, password_hash)
                    VALUES ($1, $2, $3)
                    RETURNING id, email, password_hash, created_at
                "#,
            )
            .bind(&user_id)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .fetch_one(&self.conn)
            .await?;

            Ok::<_, StoreError>(user)
        })
        .await
    }

    async fn create_referred_user(
        &self,
        new_user: &NewUser,
        link: &ReferralLink,
    ) -> Result<(User, Referral), StoreError> {
        let user_id = Uuid::new_v4().hyphenated().to_string();
        let referral_id = Uuid::new_v4().hyphenated().to_string();

        with_timeout(self.timeout, async {
            let mut tx = self.conn.begin().await?;

            let user = sqlx::query_as::<_, User>(
                r#"
                    INSERT INTO users (id, email, password_hash)
                    VALUES ($1, $2, $3)
                    RETURNING id, email, password_hash, created_at
                "#,
            )
            .bind(&user_id)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .fetch_one(&mut *tx)
            .await?;

            let referral = sqlx::query_as::<_, Referral>(
                r#"
                    INSERT INTO referrals (id, email, referral_code_id, referrer_id)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, email, referral_code_id, referrer_id, created_at
                "#,
            )
            .bind(&referral_id)
            .bind(&user.email)
            .bind(&link.code_id)
            .bind(&link.referrer_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            Ok::<_, StoreError>((user, referral))
        })
        .await
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        with_timeout(self.timeout, async {
            sqlx::query_as::<_, User>(
                "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
            )
            .bind(email)
            .fetch_optional(&self.conn)
            .await?
            .ok_or(StoreError::NotFound)
        })
        .await
    }
}
