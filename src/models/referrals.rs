use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct Referral {
    pub id: String,
    pub email: String,
    // Null once the redeemed code has been deleted.
    pub referral_code_id: Option<String>,
    pub referrer_id: String,
    pub created_at: DateTime<Utc>,
}

/// The code and referrer a new user is attributed to.
#[derive(Clone, Debug)]
pub struct ReferralLink {
    pub code_id: String,
    pub referrer_id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct ReferralInfo {
    pub referrer_id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<Referral> for ReferralInfo {
    fn from(referral: Referral) -> Self {
        Self {
            referrer_id: referral.referrer_id,
            email: referral.email,
            created_at: referral.created_at,
        }
    }
}
