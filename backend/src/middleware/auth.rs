use actix_web::{HttpRequest, HttpResponse};
use shared::ApiError;

use crate::services::auth::{AuthError, TokenVerifier};

/// Extract the caller's user id from the Authorization header
pub fn extract_user_id(req: &HttpRequest, verifier: &TokenVerifier) -> Result<String, AuthError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .ok_or(AuthError::MissingToken)?;

    let auth_str = auth_header.to_str().map_err(|_| AuthError::InvalidToken)?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::MissingToken)?;

    verifier.verify(token)
}

/// 401 response for a rejected request
pub fn unauthorized(err: &AuthError) -> HttpResponse {
    let (code, message) = match err {
        AuthError::MissingToken => ("unauthorized", "No token provided"),
        AuthError::ExpiredToken => ("token_expired", "Token expired"),
        _ => ("invalid_token", "Invalid token"),
    };

    HttpResponse::Unauthorized().json(ApiError {
        error: code.to_string(),
        message: message.to_string(),
    })
}
