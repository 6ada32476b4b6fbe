use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Claims carried by the bearer tokens the account service issues. Only the
/// subject is used here: it is the caller's account id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
}

/// HS256 bearer-token verification against a shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Mints a token for an account. Used by the seed tool and tests; in
    /// production tokens come from the account service.
    pub fn issue(&self, account_id: Uuid, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: account_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Uuid> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| {
                tracing::debug!("Rejected bearer token: {}", e);
                AppError::Unauthorized
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_same_account() {
        let tokens = TokenService::new("test-secret");
        let account = Uuid::new_v4();

        let token = tokens.issue(account, Duration::hours(1)).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), account);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = TokenService::new("one")
            .issue(Uuid::new_v4(), Duration::hours(1))
            .unwrap();

        let err = TokenService::new("two").verify(&token).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new("test-secret");
        let token = tokens.issue(Uuid::new_v4(), Duration::hours(-2)).unwrap();

        assert!(matches!(tokens.verify(&token), Err(AppError::Unauthorized)));
    }
}
