use jsonwebtoken::{encode, decode, Algorithm, Header, Validation, EncodingKey, DecodingKey};
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use crate::models::Caller;

pub const AUDIENCE: &str = "authenticated";

/// Claims as issued by the identity provider. `sub` is the identity the
/// row-level policies compare against.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub aud: String,
    pub role: String,
    pub exp: usize,
}

pub fn generate_jwt(user_id: Uuid, secret: &str, expires_at: DateTime<Utc>) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id,
        aud: AUDIENCE.to_string(),
        role: AUDIENCE.to_string(),
        exp: expires_at.timestamp().max(0) as usize,
    };
    encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_ref()))
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_ref()), &validation)?;
    Ok(data.claims)
}

pub fn caller_from_token(token: &str, secret: &str) -> Result<Caller, jsonwebtoken::errors::Error> {
    decode_jwt(token, secret).map(|claims| Caller::Authenticated(claims.sub))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_carries_identity() {
        let id = Uuid::new_v4();
        let token = generate_jwt(id, "s3cret", Utc::now() + Duration::hours(1)).unwrap();
        assert_eq!(caller_from_token(&token, "s3cret").unwrap(), Caller::Authenticated(id));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_jwt(Uuid::new_v4(), "s3cret", Utc::now() + Duration::hours(1)).unwrap();
        assert!(decode_jwt(&token, "other").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = generate_jwt(Uuid::new_v4(), "s3cret", Utc::now() - Duration::hours(2)).unwrap();
        assert!(decode_jwt(&token, "s3cret").is_err());
    }
}
