use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{CookieJar, Status};
use rocket::outcome::Outcome::{Failure, Success};
use rocket::request::{self, FromRequest, Request};

use crate::config::Config;
use crate::error::CoreResult;
use crate::identity::{Identity, Profile};
use crate::resp::problem::Problem;

pub static ID_TOKEN_COOKIE_NAME: &str = "id_token";

/// Claims of the token issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityToken {
    #[serde(with = "chrono::serde::ts_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    exp: DateTime<Utc>,
    pub sub: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl IdentityToken {
    pub fn new(sub: impl ToString, profile: &Profile) -> IdentityToken {
        let now = Utc::now();
        IdentityToken {
            iat: now,
            exp: now + Duration::hours(1),
            sub: sub.to_string(),
            email: profile.email.clone(),
            name: profile.display_name.clone(),
        }
    }

    pub fn identity(&self) -> CoreResult<Identity> {
        Identity::new(&self.sub)
    }

    pub fn profile(&self) -> Profile {
        Profile::new(&self.email, &self.name)
    }

    pub fn encode_jwt(
        &self,
        secret: impl AsRef<[u8]>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        encode(
            &Header::new(Algorithm::HS256),
            &self,
            &EncodingKey::from_secret(secret.as_ref()),
        )
    }

    pub fn decode_jwt(
        token: impl AsRef<str>,
        secret: impl AsRef<[u8]>,
    ) -> Result<IdentityToken, jsonwebtoken::errors::Error> {
        decode::<IdentityToken>(
            token.as_ref(),
            &DecodingKey::from_secret(secret.as_ref()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
    }
}

pub fn auth_problem(detail: impl ToString) -> Problem {
    Problem::new_untyped(Status::Unauthorized, "Unable to identify user.")
        .detail(detail)
        .clone()
}

fn bearer_token<'a>(req: &'a Request<'_>) -> Option<&'a str> {
    req.headers()
        .get_one("Authorization")
        .and_then(|it| it.strip_prefix("Bearer "))
        .map(str::trim)
}

pub fn extract_claims(
    bearer: Option<&str>,
    cookies: &CookieJar,
    secret: impl AsRef<[u8]>,
) -> Result<IdentityToken, Problem> {
    let token = match (bearer, cookies.get(ID_TOKEN_COOKIE_NAME)) {
        (Some(token), _) => token.to_string(),
        (None, Some(cookie)) => cookie.value().to_string(),
        (None, None) => return Err(auth_problem("No identity token.")),
    };

    match IdentityToken::decode_jwt(&token, secret) {
        Ok(it) => {
            tracing::debug!("decoded identity token for {}", it.sub);
            Ok(it)
        }
        Err(e) => {
            let mut problem = Problem::from(e);
            problem.detail("Identity token was malformed or expired.");
            Err(problem)
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for IdentityToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(it) => it,
            None => {
                tracing::error!("configuration isn't managed, rejecting identity token");
                return Failure((
                    Status::InternalServerError,
                    Problem::new_untyped(Status::InternalServerError, "Server misconfigured."),
                ));
            }
        };

        tracing::trace!("extracting identity token from request");
        match extract_claims(bearer_token(req), req.cookies(), &config.identity_secret) {
            Ok(claims) => Success(claims),
            Err(e) => {
                tracing::debug!("unable to extract identity claims: {}", e);
                Failure((Status::Unauthorized, e))
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct IdTokenAuth;

    impl From<IdTokenAuth> for SecurityScheme {
        fn from(_: IdTokenAuth) -> SecurityScheme {
            let mut http = Http::new(HttpAuthScheme::Bearer);
            http.bearer_format = Some("JWT".to_string());
            SecurityScheme::Http(http)
        }
    }

    impl utoipa::Modify for IdTokenAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("id_token", *self)
            }
        }
    }
}
