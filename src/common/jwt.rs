use crate::error::{Error, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Distinguishes an access token from a refresh token so one can never be
/// accepted in place of the other, even though both are signed with the
/// same key and share a claims shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Session this token belongs to
    pub sid: String,
    /// Access or refresh
    pub typ: TokenType,
    /// Issued at (timestamp)
    pub iat: i64,
    /// Expiration time (timestamp)
    pub exp: i64,
    /// JWT ID (for revocation tracking)
    pub jti: String,
}

impl Claims {
    fn new(user_id: Uuid, session_id: Uuid, typ: TokenType, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            sid: session_id.to_string(),
            typ,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| Error::Unauthorized("Invalid user ID in token".to_string()))
    }

    pub fn session_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sid)
            .map_err(|_| Error::Unauthorized("Invalid session ID in token".to_string()))
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Issues and validates access/refresh JWTs.
pub struct JwtManager {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtManager {
    pub fn new(secret: String, access_ttl_minutes: i64, refresh_ttl_hours: i64) -> Self {
        Self {
            secret,
            access_ttl: Duration::minutes(access_ttl_minutes),
            refresh_ttl: Duration::hours(refresh_ttl_hours),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn create_access_token(&self, user_id: Uuid, session_id: Uuid) -> Result<String> {
        self.encode(Claims::new(
            user_id,
            session_id,
            TokenType::Access,
            self.access_ttl,
        ))
    }

    pub fn create_refresh_token(&self, user_id: Uuid, session_id: Uuid) -> Result<String> {
        self.encode(Claims::new(
            user_id,
            session_id,
            TokenType::Refresh,
            self.refresh_ttl,
        ))
    }

    fn encode(&self, claims: Claims) -> Result<String> {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| {
            tracing::error!("Failed to sign token: {}", e);
            Error::Internal("Failed to create authentication token".to_string())
        })
    }

    /// Decode and validate a token without checking its `typ`.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::default();

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            tracing::warn!("JWT validation failed: {}", e);
            Error::Unauthorized("Invalid or expired token".to_string())
        })?;

        if token_data.claims.is_expired() {
            return Err(Error::Unauthorized("Token has expired".to_string()));
        }

        Ok(token_data.claims)
    }

    /// Decode and validate a token, rejecting it if it isn't of `expected` type.
    pub fn validate_token_of_type(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let claims = self.validate_token(token)?;
        if claims.typ != expected {
            return Err(Error::Unauthorized("Wrong token type".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> JwtManager {
        JwtManager::new("test_secret_key_minimum_32_chars".to_string(), 15, 24 * 7)
    }

    #[test]
    fn test_create_and_validate_access_token() {
        let manager = manager();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let token = manager.create_access_token(user_id, session_id).unwrap();
        let claims = manager
            .validate_token_of_type(&token, TokenType::Access)
            .unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.session_id().unwrap(), session_id);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let manager = manager();
        let token = manager
            .create_refresh_token(Uuid::new_v4(), Uuid::new_v4())
            .unwrap();

        let result = manager.validate_token_of_type(&token, TokenType::Access);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_token() {
        let manager = manager();
        let result = manager.validate_token("invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let manager1 = JwtManager::new("secret1_minimum_32_characters_long".to_string(), 15, 24);
        let manager2 = JwtManager::new("secret2_minimum_32_characters_long".to_string(), 15, 24);

        let token = manager1
            .create_access_token(Uuid::new_v4(), Uuid::new_v4())
            .unwrap();
        let result = manager2.validate_token(&token);

        assert!(result.is_err());
    }
}
