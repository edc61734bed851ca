use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token verification failed: {0}")]
    Unknown(String),
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Preferred over `sub` when both are present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    fn into_user_id(self) -> Result<String, AuthError> {
        self.user_id
            .or(self.sub)
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::InvalidToken)
    }
}

/// Turns bearer tokens into user ids
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    secret: String,
    /// Fall back to reading the claims of tokens whose signature cannot be
    /// checked. Expired tokens are still rejected.
    allow_unverified: bool,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<String>, allow_unverified: bool) -> Self {
        Self {
            secret: secret.into(),
            allow_unverified,
        }
    }

    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let mut validation = Validation::default();
        validation.validate_aud = false;

        match decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &validation) {
            Ok(data) => data.claims.into_user_id(),
            Err(e) => match classify(e.kind()) {
                AuthError::Unknown(reason) if self.allow_unverified => {
                    log::warn!("Token could not be verified ({}), reading claims without verification", reason);
                    decode_unverified(token)
                }
                err => Err(err),
            },
        }
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            AuthError::InvalidToken
        }
        other => AuthError::Unknown(format!("{:?}", other)),
    }
}

fn decode_unverified(token: &str) -> Result<String, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => data.claims.into_user_id(),
        Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => Err(AuthError::ExpiredToken),
        Err(_) => Err(AuthError::InvalidToken),
    }
}

/// Issue a signed token for `user_id`
pub fn create_jwt(user_id: &str, secret: &str, expiration_hours: i64) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiration_hours);

    let claims = Claims {
        sub: Some(user_id.to_string()),
        user_id: None,
        exp: Some(exp.timestamp()),
        iat: Some(now.timestamp()),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
