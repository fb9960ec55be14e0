use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const EXPIRATION_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct ReferralCode {
    pub id: String,
    pub code: String,
    pub referrer_id: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReferralCode {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[derive(Clone, Debug)]
pub struct NewReferralCode {
    pub code: String,
    pub referrer_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct CreateReferralCode {
    #[schema(example = "31.12.2099")]
    pub expiration_date: String,
}

impl CreateReferralCode {
    /// Parses `DD.MM.YYYY` into midnight UTC of that day.
    pub fn expiration(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        NaiveDate::parse_from_str(self.expiration_date.trim(), EXPIRATION_DATE_FORMAT)
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, ToSchema)]
pub struct ReferralCodeResponse {
    #[schema(example = "K3J9-QZA")]
    pub code: String,
    pub expiration: DateTime<Utc>,
}

impl From<ReferralCode> for ReferralCodeResponse {
    fn from(code: ReferralCode) -> Self {
        Self {
            code: code.code,
            expiration: code.expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Duration, Timelike};
    use rstest::rstest;

    #[rstest]
    fn test_expiration_parses_day_month_year() {
        let request = CreateReferralCode {
            expiration_date: "31.12.2099".to_string(),
        };

        let expiration = request.expiration().unwrap();

        assert_eq!(expiration.year(), 2099);
        assert_eq!(expiration.month(), 12);
        assert_eq!(expiration.day(), 31);
        assert_eq!(expiration.hour(), 0);
    }

    #[rstest]
    #[case("2099-12-31")]
    #[case("31/12/2099")]
    #[case("32.12.2099")]
    #[case("")]
    fn test_expiration_rejects_other_formats(#[case] input: &str) {
        let request = CreateReferralCode {
            expiration_date: input.to_string(),
        };

        assert!(request.expiration().is_err());
    }

    #[rstest]
    fn test_is_active_at_compares_against_given_instant() {
        let now = Utc::now();
        let code = ReferralCode {
            id: "id".to_string(),
            code: "ABCDEFGH".to_string(),
            referrer_id: "referrer".to_string(),
            expires_at: now,
            created_at: now,
            updated_at: now,
        };

        assert!(code.is_active_at(now - Duration::seconds(1)));
        assert!(!code.is_active_at(now));
    }
}
