//! JWT authentication module.
//!
//! Handles token issuance, validation, refresh and logout.
//!
//! ## Token Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  login(identity) ──► TokenPair { access, refresh }                     │
//! │                                                                         │
//! │  "Bearer <access>" ──► authenticate() ──► RequestContext               │
//! │                                                                         │
//! │  refresh(<refresh>) ──► new TokenPair, old refresh token revoked       │
//! │                                                                         │
//! │  logout(<access>)                                                      │
//! │    ├── valid   ──► jti revoked, success                                │
//! │    ├── expired ──► success (nothing to revoke)                         │
//! │    └── invalid ──► Unauthenticated                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Credential checks (email/password) happen upstream; `issue_tokens` trusts
//! the identity it is given.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ApiConfig;

/// Token kind carried in the claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,

    pub token_type: TokenType,
}

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub user_id: String,
    pub name: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        UserIdentity {
            user_id: user_id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Per-request caller context, passed explicitly to every user-scoped call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub identity: UserIdentity,
    /// `jti` of the access token the request carried.
    pub token_id: String,
}

impl RequestContext {
    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }
}

/// Access and refresh tokens returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// What happened on logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    Revoked,
    AlreadyExpired,
}

/// Authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Token not provided")]
    MissingToken,

    #[error("Token has expired")]
    Expired,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Expected {expected:?} token")]
    WrongTokenType { expected: TokenType },

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Resolves a bearer token to a request context.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, bearer_token: &str) -> Result<RequestContext, AuthError>;
}

/// JWT token manager.
///
/// Revoked token ids are held in memory until the token would have expired
/// anyway.
#[derive(Debug)]
pub struct JwtManager {
    secret: String,
    access_lifetime_secs: i64,
    refresh_lifetime_secs: i64,
    /// jti → exp
    revoked: Mutex<HashMap<String, i64>>,
}

impl JwtManager {
    /// Create a new JWT manager.
    pub fn new(secret: String, access_lifetime_secs: i64, refresh_lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            access_lifetime_secs,
            refresh_lifetime_secs,
            revoked: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        JwtManager::new(
            config.jwt_secret.clone(),
            config.jwt_access_lifetime_secs,
            config.jwt_refresh_lifetime_secs,
        )
    }

    fn generate(&self, identity: &UserIdentity, token_type: TokenType) -> Result<String, AuthError> {
        let now = Utc::now();
        let lifetime = match token_type {
            TokenType::Access => self.access_lifetime_secs,
            TokenType::Refresh => self.refresh_lifetime_secs,
        };
        let exp = now + Duration::seconds(lifetime);

        let claims = Claims {
            sub: identity.user_id.clone(),
            name: identity.name.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Generate an access token.
    pub fn generate_access_token(&self, identity: &UserIdentity) -> Result<String, AuthError> {
        self.generate(identity, TokenType::Access)
    }

    /// Generate a refresh token.
    pub fn generate_refresh_token(&self, identity: &UserIdentity) -> Result<String, AuthError> {
        self.generate(identity, TokenType::Refresh)
    }

    /// Issues an access/refresh pair for an identity verified upstream.
    pub fn issue_tokens(&self, identity: &UserIdentity) -> Result<TokenPair, AuthError> {
        let pair = TokenPair {
            access_token: self.generate_access_token(identity)?,
            refresh_token: self.generate_refresh_token(identity)?,
            token_type: "Bearer".to_string(),
            expires_in: self.access_lifetime_secs,
        };

        info!(user_id = %identity.user_id, "Token issued successfully");
        Ok(pair)
    }

    /// Validate and decode a token (signature, expiry, revocation).
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            _ => AuthError::Invalid(e.to_string()),
        })?
        .claims;

        if self.is_revoked(&claims.jti) {
            return Err(AuthError::Revoked);
        }

        Ok(claims)
    }

    /// Validate that a token is an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.validate_token(token)?;

        if claims.token_type != TokenType::Access {
            return Err(AuthError::WrongTokenType {
                expected: TokenType::Access,
            });
        }

        Ok(claims)
    }

    /// Validate that a token is a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.validate_token(token)?;

        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::WrongTokenType {
                expected: TokenType::Refresh,
            });
        }

        Ok(claims)
    }

    /// Exchanges a refresh token for a new pair; the old refresh token is revoked.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.validate_refresh_token(refresh_token)?;
        let identity = UserIdentity {
            user_id: claims.sub.clone(),
            name: claims.name.clone(),
        };

        let pair = self.issue_tokens(&identity)?;
        self.revoke(claims.jti, claims.exp);

        info!(user_id = %identity.user_id, "Token refreshed successfully");
        Ok(pair)
    }

    /// Revokes the token. An expired token counts as logged out.
    pub fn logout(&self, token: &str) -> Result<LogoutOutcome, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        match self.validate_token(token) {
            Ok(claims) => {
                info!(user_id = %claims.sub, "Token revoked");
                self.revoke(claims.jti, claims.exp);
                Ok(LogoutOutcome::Revoked)
            }
            Err(AuthError::Expired) | Err(AuthError::Revoked) => Ok(LogoutOutcome::AlreadyExpired),
            Err(e) => Err(e),
        }
    }

    fn revoke(&self, jti: String, exp: i64) {
        let now = Utc::now().timestamp();
        let mut revoked = self.revoked.lock().unwrap_or_else(PoisonError::into_inner);
        revoked.retain(|_, expires| *expires > now);
        revoked.insert(jti, exp);
        debug!(revoked = revoked.len(), "Revocation list updated");
    }

    fn is_revoked(&self, jti: &str) -> bool {
        self.revoked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(jti)
    }
}

impl Authenticator for JwtManager {
    fn authenticate(&self, bearer_token: &str) -> Result<RequestContext, AuthError> {
        let token = extract_bearer_token(bearer_token).unwrap_or(bearer_token).trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.validate_access_token(token)?;
        Ok(RequestContext {
            identity: UserIdentity {
                user_id: claims.sub,
                name: claims.name,
            },
            token_id: claims.jti,
        })
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new("test-secret".to_string(), 3600, 86400)
    }

    fn cashier() -> UserIdentity {
        UserIdentity::new("user-001").with_name("Sari")
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = manager();
        let pair = manager.issue_tokens(&cashier()).unwrap();

        let ctx = manager
            .authenticate(&format!("Bearer {}", pair.access_token))
            .unwrap();
        assert_eq!(ctx.user_id(), "user-001");
        assert_eq!(ctx.identity.name.as_deref(), Some("Sari"));
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 3600);
    }

    #[test]
    fn test_wrong_token_type() {
        let manager = manager();
        let pair = manager.issue_tokens(&cashier()).unwrap();

        assert!(matches!(
            manager.validate_refresh_token(&pair.access_token),
            Err(AuthError::WrongTokenType { .. })
        ));
        assert!(manager.authenticate(&pair.refresh_token).is_err());
    }

    #[test]
    fn test_refresh_rotates() {
        let manager = manager();
        let pair = manager.issue_tokens(&cashier()).unwrap();

        let next = manager.refresh(&pair.refresh_token).unwrap();
        assert!(manager.authenticate(&next.access_token).is_ok());

        assert!(matches!(
            manager.refresh(&pair.refresh_token),
            Err(AuthError::Revoked)
        ));
    }

    #[test]
    fn test_logout_revokes() {
        let manager = manager();
        let pair = manager.issue_tokens(&cashier()).unwrap();

        assert_eq!(manager.logout(&pair.access_token).unwrap(), LogoutOutcome::Revoked);
        assert!(matches!(
            manager.authenticate(&pair.access_token),
            Err(AuthError::Revoked)
        ));
    }

    #[test]
    fn test_logout_expired_token_succeeds() {
        // Expired well beyond the default 60s leeway
        let stale = JwtManager::new("test-secret".to_string(), -600, -600);
        let pair = stale.issue_tokens(&cashier()).unwrap();

        assert_eq!(
            manager().logout(&pair.access_token).unwrap(),
            LogoutOutcome::AlreadyExpired
        );
    }

    #[test]
    fn test_logout_invalid_token() {
        assert!(matches!(
            manager().logout("not-a-jwt"),
            Err(AuthError::Invalid(_))
        ));
        assert!(matches!(manager().logout(""), Err(AuthError::MissingToken)));

        let other = JwtManager::new("other-secret".to_string(), 3600, 86400);
        let pair = other.issue_tokens(&cashier()).unwrap();
        assert!(matches!(
            manager().logout(&pair.access_token),
            Err(AuthError::Invalid(_))
        ));
    }
}
