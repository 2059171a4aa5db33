//! Sign-in and bearer token verification.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::repos::{RepoError, UsersRepo};

pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no user is registered with this email")]
    UnknownUser,
    #[error("password does not match")]
    InvalidPassword,
    #[error("token rejected: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("token could not be issued: {0}")]
    Issue(#[source] jsonwebtoken::errors::Error),
    #[error("password verification failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Claims carried by issued tokens and attached to authenticated requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn from_secret(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(&self, id: i64, email: &str) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            id,
            email: email.to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Issue)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    keys: TokenKeys,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, keys: TokenKeys) -> Self {
        Self { users, keys }
    }

    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    /// Checks the credentials and returns a signed token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let Some(user) = self.users.find_user_by_email(email.trim()).await? else {
            warn!(target = "itsm::application::auth", "sign-in with unregistered email");
            return Err(AuthError::UnknownUser);
        };

        let candidate = password.to_string();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hash))
            .await
            .map_err(|err| AuthError::Hashing(err.to_string()))?
            .map_err(|err| AuthError::Hashing(err.to_string()))?;
        if !valid {
            warn!(target = "itsm::application::auth", user_id = user.id, "sign-in with wrong password");
            return Err(AuthError::InvalidPassword);
        }

        let token = self.keys.issue(user.id, &user.email)?;
        info!(target = "itsm::application::auth", user_id = user.id, "sign-in succeeded");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.keys.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let keys = TokenKeys::from_secret(b"test-secret", Duration::from_secs(60));
        let token = keys.issue(5, "ana@example.com").expect("issue");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.id, 5);
        assert_eq!(claims.email, "ana@example.com");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let issuer = TokenKeys::from_secret(b"one", Duration::from_secs(60));
        let verifier = TokenKeys::from_secret(b"two", Duration::from_secs(60));
        let token = issuer.issue(1, "a@b.io").expect("issue");
        assert!(matches!(verifier.verify(&token), Err(AuthError::InvalidToken(_))));
        assert!(matches!(verifier.verify("garbage"), Err(AuthError::InvalidToken(_))));
    }
}
