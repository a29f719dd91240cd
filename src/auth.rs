use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;

/// Decoded identity. The upstream provider guarantees an email claim; that is
/// the only claim the ownership checks care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub exp: usize,
}

/// Validate a JWT and return its claims.
fn decode_jwt(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding verified `Claims`. Handlers that take `Auth` cannot run
/// without an identity, so the email-match check below never sees an
/// unauthenticated request.
pub struct Auth(pub Claims);

impl Auth {
    /// Requester must be asking about their own records: the `email` query
    /// parameter has to match the token's email claim. A missing parameter is
    /// forbidden too, same as any mismatch.
    pub fn require_owner(&self, requested: Option<&str>) -> Result<(), ApiError> {
        if requested != Some(self.0.email.as_str()) {
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate to BearerAuth to parse the header.
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            match decode_jwt(bearer.token()) {
                Ok(claims) => return ready(Ok(Auth(claims))),
                Err(_) => return ready(Err(ApiError::Unauthorized.into())),
            }
        }
        ready(Err(ApiError::Unauthorized.into()))
    }
}

/// Mint a token for the given email. Used by tests and local tooling; in
/// production tokens come from the identity provider.
pub fn create_jwt(email: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let secret = env::var("JWT_SECRET").expect("JWT_SECRET not set");
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::hours(24))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        email: email.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
