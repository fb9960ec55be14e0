//! OpenAPI document served next to the Swagger UI.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::{
    auth::{RegisterResponse, TokenResponse},
    referrals::ReferralRegistration,
    ErrorResponse,
};
use crate::models::{
    referral_codes::{CreateReferralCode, ReferralCodeResponse},
    referrals::ReferralInfo,
    users::{Credentials, ReferredCredentials},
};

pub const SWAGGER_UI_PATH: &str = "/docs/swagger";
pub const OPENAPI_JSON_PATH: &str = "/docs/openapi.json";

/// Registers the bearer token scheme used by the protected code routes.
struct BearerAddon;

impl Modify for BearerAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerAddon),
    info(
        title = "Referral dealer API",
        description = "User registration, bearer authentication and referral codes."
    ),
    paths(
        super::auth::register,
        super::auth::login,
        super::referrals::register_with_referral,
        super::referrals::list_referrals,
        super::referral_codes::create_referral_code,
        super::referral_codes::delete_referral_code,
        super::referral_codes::get_referral_code_by_email,
        super::health,
    ),
    components(schemas(
        Credentials,
        ReferredCredentials,
        CreateReferralCode,
        ReferralCodeResponse,
        ReferralInfo,
        RegisterResponse,
        TokenResponse,
        ReferralRegistration,
        ErrorResponse,
    )),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "referral_codes", description = "Referral code lifecycle"),
        (name = "referrals", description = "Referral registration and listing"),
        (name = "health", description = "Liveness check")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_every_route() {
        let doc = ApiDoc::openapi();

        for path in [
            "/auth/register",
            "/auth/login",
            "/auth/register/referral",
            "/referral_code",
            "/referral_code/email/{email}",
            "/referral/id/{referrer_id}",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.unwrap();

        assert!(components.security_schemes.contains_key("bearer"));
        assert!(components.schemas.contains_key("ErrorResponse"));
    }
}
