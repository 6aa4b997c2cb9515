// Password login and token sessions. Passwords are argon2 hashes; tokens are random ids
// stored in the sessions table with an expiry.

pub mod token;

use crate::config::AuthConfig;
use crate::error::{CredentialField, PanelError, Result};
use crate::models::{LoginRequest, LoginResponse, UserProfile, now_ms};
use crate::store::Store;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use std::sync::Arc;

const MS_PER_HOUR: i64 = 3_600_000;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| PanelError::Internal(anyhow::anyhow!("password hash: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub struct AuthService {
    store: Arc<Store>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(store: Arc<Store>, config: AuthConfig) -> Self {
        Self { store, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Profile used for every request when auth is disabled.
    pub fn anonymous() -> UserProfile {
        UserProfile {
            username: "anonymous".into(),
            admin: true,
        }
    }

    pub async fn create_user(&self, username: &str, password: &str, admin: bool) -> Result<()> {
        if self.store.find_user(username).await?.is_some() {
            return Err(PanelError::AlreadyExists(format!("user {}", username)));
        }
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;
        self.store
            .insert_user(username, &hash, admin, now_ms())
            .await
    }

    /// Creates the configured admin when no users exist yet. Returns true if one was created.
    pub async fn bootstrap(&self) -> Result<bool> {
        if self.store.count_users().await? > 0 {
            return Ok(false);
        }
        let Some(password) = self.config.bootstrap_password.as_deref() else {
            if self.config.enabled {
                tracing::warn!("no users exist and auth.bootstrap_password is unset; nobody can log in");
            }
            return Ok(false);
        };
        self.create_user(&self.config.bootstrap_user, password, true)
            .await?;
        tracing::info!(username = %self.config.bootstrap_user, "bootstrap admin created");
        Ok(true)
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse> {
        let user = self
            .store
            .find_user(req.username.trim())
            .await?
            .ok_or(PanelError::InvalidCredentials {
                field: CredentialField::Username,
            })?;
        let password = req.password.clone();
        let hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await?;
        if !valid {
            tracing::info!(username = %user.username, "login rejected: wrong password");
            return Err(PanelError::InvalidCredentials {
                field: CredentialField::Password,
            });
        }

        let ttl_ms = if req.remember {
            self.config.remember_days as i64 * 24 * MS_PER_HOUR
        } else {
            self.config.token_ttl_hours as i64 * MS_PER_HOUR
        };
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let expires_at = now_ms() + ttl_ms;
        self.store
            .insert_session(&token, &user.username, expires_at)
            .await?;
        tracing::info!(username = %user.username, remember = req.remember, "login");
        Ok(LoginResponse {
            token,
            username: user.username,
            admin: user.admin,
            expires_at,
        })
    }

    /// Profile of a live session.
    pub async fn verify(&self, token: &str) -> Result<UserProfile> {
        let (username, expires_at) = self
            .store
            .find_session(token)
            .await?
            .ok_or(PanelError::TokenExpiredOrMissing)?;
        if expires_at <= now_ms() {
            self.store.delete_session(token).await?;
            return Err(PanelError::TokenExpiredOrMissing);
        }
        let user = self
            .store
            .find_user(&username)
            .await?
            .ok_or(PanelError::TokenExpiredOrMissing)?;
        Ok(UserProfile {
            username: user.username,
            admin: user.admin,
        })
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.store.delete_session(token).await
    }

    pub async fn prune_sessions(&self) -> Result<u64> {
        self.store.prune_sessions(now_ms()).await
    }
}
