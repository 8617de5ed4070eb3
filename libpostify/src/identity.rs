//! Users and sessions
//!
//! Passwords are hashed with Argon2id. Sessions are opaque random tokens
//! mapped to a user id by a pluggable `SessionStore`: `MemorySessionStore`
//! for tests and single-process use, `Database` for persistence across
//! restarts.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use base64::Engine;
use rand::RngCore;
use tracing::{debug, info};

use crate::db::Database;
use crate::error::{IdentityError, Result};
use crate::types::User;

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;
const TOKEN_BYTES: usize = 32;

/// Token → user id mapping
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, token: &str, user_id: &str) -> Result<()>;

    async fn get(&self, token: &str) -> Result<Option<String>>;

    async fn remove(&self, token: &str) -> Result<()>;

    /// Drop every session
    async fn clear(&self) -> Result<()>;
}

#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, token: &str, user_id: &str) -> Result<()> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.to_string(), user_id.to_string());
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<String>> {
        Ok(self
            .sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(token)
            .cloned())
    }

    async fn remove(&self, token: &str) -> Result<()> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(token);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

/// A logged-in session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct IdentityService {
    db: Database,
    sessions: Arc<dyn SessionStore>,
}

impl IdentityService {
    pub fn new(db: Database, sessions: Arc<dyn SessionStore>) -> Self {
        Self { db, sessions }
    }

    /// Create a user and return its id
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<String> {
        validate_username(username)?;
        validate_password(password)?;
        validate_email(email)?;

        if self.db.get_user_by_username(username).await?.is_some() {
            return Err(IdentityError::UsernameTaken.into());
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password)?,
            created_at: chrono::Utc::now().timestamp(),
        };

        // A concurrent registration can still win the UNIQUE constraint
        if let Err(e) = self.db.create_user(&user).await {
            if self.db.get_user_by_username(username).await?.is_some() {
                return Err(IdentityError::UsernameTaken.into());
            }
            return Err(e);
        }

        info!("Registered user {}", user.username);
        Ok(user.id)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let user = self
            .db
            .get_user_by_username(username)
            .await?
            .ok_or(IdentityError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(IdentityError::InvalidCredentials.into());
        }

        let token = new_token();
        self.sessions.insert(&token, &user.id).await?;
        debug!("Opened session for {}", user.username);
        Ok(Session { token, user })
    }

    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let user_id = self
            .sessions
            .get(token)
            .await?
            .ok_or(IdentityError::InvalidSession)?;

        self.db
            .get_user(&user_id)
            .await?
            .ok_or_else(|| IdentityError::InvalidSession.into())
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.remove(token).await
    }

    pub async fn change_password(
        &self,
        user: &User,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        if !verify_password(old_password, &user.password_hash) {
            return Err(IdentityError::InvalidCredentials.into());
        }
        validate_password(new_password)?;

        self.db
            .update_user_password(&user.id, &hash_password(new_password)?)
            .await?;
        info!("Password changed for {}", user.username);
        Ok(())
    }

    pub async fn update_profile(&self, user: &User, email: &str) -> Result<User> {
        validate_email(email)?;
        self.db.update_user_email(&user.id, email).await?;
        Ok(User {
            email: email.to_string(),
            ..user.clone()
        })
    }
}

fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&len) {
        return Err(IdentityError::Validation(format!(
            "Username must be between {} and {} characters",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        ))
        .into());
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        return Err(IdentityError::Validation(
            "Username may only contain letters, digits and @/./+/-/_".to_string(),
        )
        .into());
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(IdentityError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))
        .into());
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    if !email.is_empty() && !email.contains('@') {
        return Err(IdentityError::Validation("Enter a valid email address".to_string()).into());
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Hashing(e.to_string()).into())
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

fn new_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
