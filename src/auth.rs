//! Bearer-token authentication
//!
//! `Authorization: <prefix> <token>`. In JWT mode the token is a signed
//! claim set carrying the user id; in UID mode (development) the token IS
//! the user id. The REST adapter owns the HTTP side and calls in here.

use std::str::FromStr;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::{AuthConfig, AuthMode};
use crate::core_types::{UserId, is_object_id};
use crate::errors::AuthError;

const TOKEN_SUBJECT: &str = "access";

/// JWT claims: the user id, the expiry instant, and the fixed subject.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    id: String,
    exp: i64,
    subject: String,
}

pub struct AuthService {
    mode: AuthMode,
    token_prefix: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_minutes: i64,
}

impl AuthService {
    pub fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let algorithm = Algorithm::from_str(&config.jwt.algorithm)
            .map_err(|_| anyhow::anyhow!("unsupported JWT algorithm `{}`", config.jwt.algorithm))?;
        Ok(Self {
            mode: config.mode,
            token_prefix: config.token_prefix.clone(),
            algorithm,
            encoding_key: EncodingKey::from_secret(config.jwt.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt.secret.as_bytes()),
            access_token_minutes: config.jwt.access_token_minutes,
        })
    }

    /// Issue an access token for `user_id` (JWT mode; in UID mode the id
    /// itself is the token).
    pub fn create_access_token(&self, user_id: &UserId) -> Result<String, AuthError> {
        match self.mode {
            AuthMode::Uid => Ok(user_id.clone()),
            AuthMode::Jwt => {
                let expire = Utc::now() + Duration::minutes(self.access_token_minutes);
                let claims = Claims {
                    id: user_id.clone(),
                    exp: expire.timestamp(),
                    subject: TOKEN_SUBJECT.to_string(),
                };
                encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
                    .map_err(|_| AuthError::InvalidAuthToken)
            }
        }
    }

    /// Extract the user id from a raw token.
    pub fn user_id_from_token(&self, token: &str) -> Result<UserId, AuthError> {
        match self.mode {
            AuthMode::Uid => {
                if is_object_id(token) {
                    Ok(token.to_string())
                } else {
                    Err(AuthError::InvalidUserID)
                }
            }
            AuthMode::Jwt => {
                let validation = Validation::new(self.algorithm);
                let data = decode::<Claims>(token, &self.decoding_key, &validation)
                    .map_err(|_| AuthError::InvalidAuthToken)?;
                if data.claims.subject != TOKEN_SUBJECT {
                    return Err(AuthError::InvalidAuthToken);
                }
                if !is_object_id(&data.claims.id) {
                    return Err(AuthError::InvalidUserID);
                }
                Ok(data.claims.id)
            }
        }
    }

    /// Parse a full `Authorization` header value.
    pub fn user_id_from_header(&self, header: Option<&str>) -> Result<UserId, AuthError> {
        let header = header.ok_or(AuthError::AuthHeaderNotFound)?;
        let mut parts = header.split_whitespace();
        let (prefix, token) = match (parts.next(), parts.next(), parts.next()) {
            (Some(prefix), Some(token), None) => (prefix, token),
            _ => return Err(AuthError::WrongTokenFormat),
        };
        if prefix != self.token_prefix {
            return Err(AuthError::InvalidAuthTokenPrefix);
        }
        self.user_id_from_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::core_types::new_object_id;

    fn jwt_service() -> AuthService {
        AuthService::from_config(&AuthConfig {
            token_prefix: "Token".to_string(),
            mode: AuthMode::Jwt,
            jwt: JwtConfig::default(),
        })
        .unwrap()
    }

    fn uid_service() -> AuthService {
        AuthService::from_config(&AuthConfig {
            token_prefix: "Token".to_string(),
            mode: AuthMode::Uid,
            jwt: JwtConfig::default(),
        })
        .unwrap()
    }

    #[test]
    fn test_jwt_round_trip() {
        let service = jwt_service();
        let user_id = new_object_id();
        let token = service.create_access_token(&user_id).unwrap();
        assert_eq!(service.user_id_from_token(&token).unwrap(), user_id);
    }

    #[test]
    fn test_jwt_garbage_rejected() {
        let service = jwt_service();
        assert_eq!(
            service.user_id_from_token("not-a-jwt"),
            Err(AuthError::InvalidAuthToken)
        );
    }

    #[test]
    fn test_jwt_wrong_secret_rejected() {
        let issuing = jwt_service();
        let verifying = AuthService::from_config(&AuthConfig {
            token_prefix: "Token".to_string(),
            mode: AuthMode::Jwt,
            jwt: JwtConfig {
                secret: "other".to_string(),
                ..JwtConfig::default()
            },
        })
        .unwrap();
        let token = issuing.create_access_token(&new_object_id()).unwrap();
        assert_eq!(
            verifying.user_id_from_token(&token),
            Err(AuthError::InvalidAuthToken)
        );
    }

    #[test]
    fn test_uid_mode() {
        let service = uid_service();
        let user_id = new_object_id();
        assert_eq!(service.create_access_token(&user_id).unwrap(), user_id);
        assert_eq!(service.user_id_from_token(&user_id).unwrap(), user_id);
        assert_eq!(
            service.user_id_from_token("short"),
            Err(AuthError::InvalidUserID)
        );
    }

    #[test]
    fn test_header_parsing() {
        let service = jwt_service();
        let user_id = new_object_id();
        let token = service.create_access_token(&user_id).unwrap();

        assert_eq!(
            service.user_id_from_header(None),
            Err(AuthError::AuthHeaderNotFound)
        );
        assert_eq!(
            service.user_id_from_header(Some(token.as_str())),
            Err(AuthError::WrongTokenFormat)
        );
        let wrong_prefix = format!("Bearer {token}");
        assert_eq!(
            service.user_id_from_header(Some(wrong_prefix.as_str())),
            Err(AuthError::InvalidAuthTokenPrefix)
        );
        let header = format!("Token {token}");
        assert_eq!(
            service.user_id_from_header(Some(header.as_str())),
            Ok(user_id)
        );
    }

    #[test]
    fn test_unsupported_algorithm_fails_construction() {
        let result = AuthService::from_config(&AuthConfig {
            token_prefix: "Token".to_string(),
            mode: AuthMode::Jwt,
            jwt: JwtConfig {
                algorithm: "XS999".to_string(),
                ..JwtConfig::default()
            },
        });
        assert!(result.is_err());
    }
}
