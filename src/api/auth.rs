//! HS256 bearer-token authentication
//!
//! Tokens are issued by `POST /api/auth/token` against the configured admin
//! credentials and checked by [`require_auth`] on every protected route.
//! Without a configured secret the middleware lets every request through.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{ApiError, ApiJson};
use super::handlers::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
}

pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
    admin: Option<(String, String)>,
}

impl JwtAuth {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl_secs,
            admin: None,
        }
    }

    pub fn with_admin(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin = Some((user.into(), password.into()));
        self
    }

    pub fn issue_token(&self, sub: &str, role: &str) -> Result<IssuedToken, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + self.ttl_secs as i64,
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(AuthError::Token)?;

        Ok(IssuedToken {
            access_token,
            token_type: "Bearer",
            expires_in: self.ttl_secs,
        })
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Exchange admin credentials for a token
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        match &self.admin {
            Some((user, pass)) if user == username && pass == password => {
                self.issue_token(username, "admin")
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingHeader,

    #[error("Authorization header must use Bearer scheme")]
    InvalidScheme,

    #[error("Invalid or expired token: {0}")]
    InvalidToken(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token encoding failed: {0}")]
    Token(jsonwebtoken::errors::Error),
}

/// Reject requests without a valid bearer token when auth is configured
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(auth) = state.auth.as_ref() else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidScheme)?;
    let token = extract_bearer_token(header)?;

    let claims = auth.validate(token).map_err(|e| {
        warn!(error = %e, "JWT validation failed");
        e
    })?;
    debug!(sub = %claims.sub, role = %claims.role, "Authenticated request");

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidScheme)?
        .trim();
    if token.is_empty() {
        return Err(AuthError::InvalidScheme);
    }
    Ok(token)
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<TokenRequest>,
) -> Result<Json<IssuedToken>, ApiError> {
    let auth = state
        .auth
        .as_ref()
        .ok_or_else(|| ApiError::BadRequest("Authentication is not enabled".to_string()))?;

    let token = auth.login(&request.username, &request.password).map_err(|e| {
        warn!(username = %request.username, "Rejected token request");
        e
    })?;
    Ok(Json(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc123").unwrap(), "abc123");
        assert!(extract_bearer_token("Basic abc123").is_err());
        assert!(extract_bearer_token("Bearer ").is_err());
        assert!(extract_bearer_token("abc123").is_err());
    }

    #[test]
    fn test_issue_and_validate() {
        let auth = JwtAuth::new("secret", 60);
        let token = auth.issue_token("ops", "viewer").unwrap();
        let claims = auth.validate(&token.access_token).unwrap();
        assert_eq!(claims.sub, "ops");
        assert_eq!(claims.role, "viewer");
        assert_eq!(claims.exp - claims.iat, 60);

        let other = JwtAuth::new("different", 60);
        assert!(matches!(
            other.validate(&token.access_token),
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = JwtAuth::new("secret", 60);
        let now = Utc::now().timestamp();
        let stale = Claims {
            sub: "ops".into(),
            role: "admin".into(),
            iat: now - 120,
            exp: now - 60,
        };
        let token = encode(&Header::default(), &stale, &EncodingKey::from_secret(b"secret")).unwrap();
        assert!(auth.validate(&token).is_err());
    }

    #[test]
    fn test_login() {
        let auth = JwtAuth::new("secret", 60).with_admin("admin", "hunter2");
        assert!(auth.login("admin", "hunter2").is_ok());
        assert!(matches!(
            auth.login("admin", "wrong"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(JwtAuth::new("secret", 60).login("admin", "hunter2").is_err());
    }
}
