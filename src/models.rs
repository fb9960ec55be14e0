pub mod referral_codes;
pub mod referrals;
pub mod users;
