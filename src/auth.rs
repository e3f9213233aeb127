//! Bearer-token identity for the HTTP edge. The core only ever receives the
//! resulting user id.

use actix_web::{dev::Payload, web, Error, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::models::{Id, User};

const TOKEN_TTL_HOURS: i64 = 24;

/// HS256 signing secret, registered as app data.
#[derive(Clone)]
pub struct JwtSecret(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub username: String,
    pub exp: usize,
}

fn decode_jwt(secret: &JwtSecret, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.0.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// Extractor yielding the authenticated user.
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> Id {
        // sub is only ever minted by create_jwt; verified in from_request
        self.0.sub.parse().unwrap_or_default()
    }
}

impl FromRequest for Auth {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(secret) = req.app_data::<web::Data<JwtSecret>>() else {
            log::error!("JwtSecret missing from app data");
            return ready(Err(actix_web::error::ErrorInternalServerError("auth not configured")));
        };
        if let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() {
            return ready(match decode_jwt(secret, bearer.token()) {
                Ok(claims) if claims.sub.parse::<Id>().is_ok() => Ok(Auth(claims)),
                _ => Err(actix_web::error::ErrorUnauthorized("Invalid JWT")),
            });
        }
        ready(Err(actix_web::error::ErrorUnauthorized(
            "Authorization required",
        )))
    }
}

/// Mint a token for `user`.
pub fn create_jwt(secret: &JwtSecret, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize;

    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.0.as_bytes()),
    )
}
