//! Password storage and verification.
//!
//! The API never stores or hashes passwords itself. Cognito owns them in
//! production; the in-memory provider keeps salted digests for tests.

use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::DisplayErrorContext;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType, MessageActionType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialsError {
    #[error("password does not meet the password policy")]
    InvalidPassword,
    #[error("account already exists")]
    AlreadyExists,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("credential provider failed: {0}")]
    Backend(String),
}

impl From<CredentialsError> for ApiError {
    fn from(err: CredentialsError) -> Self {
        match err {
            CredentialsError::InvalidPassword => {
                ApiError::InvalidOperation("Password does not meet the password policy".to_string())
            }
            CredentialsError::AlreadyExists => ApiError::Conflict("User already exists".to_string()),
            CredentialsError::InvalidCredentials => {
                ApiError::InvalidCredentials("Invalid email or password")
            }
            CredentialsError::Backend(message) => ApiError::internal(message),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i32,
}

/// Account credentials keyed by the application user id.
#[async_trait]
pub trait Credentials: Send + Sync {
    async fn register(&self, user_id: &str, email: &str, password: &str) -> Result<(), CredentialsError>;

    async fn authenticate(&self, user_id: &str, password: &str) -> Result<AuthTokens, CredentialsError>;

    async fn remove(&self, user_id: &str) -> Result<(), CredentialsError>;
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
pub fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> Result<String, CredentialsError> {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| CredentialsError::Backend(format!("HMAC key rejected: {}", e)))?;
    mac.update(message.as_bytes());
    let result = mac.finalize();
    Ok(general_purpose::STANDARD.encode(result.into_bytes()))
}

pub struct CognitoCredentials {
    client: CognitoClient,
    user_pool_id: String,
    client_id: String,
    client_secret: String,
}

impl CognitoCredentials {
    pub fn new(
        client: CognitoClient,
        user_pool_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            user_pool_id: user_pool_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl Credentials for CognitoCredentials {
    async fn register(&self, user_id: &str, email: &str, password: &str) -> Result<(), CredentialsError> {
        let email_attr = AttributeType::builder()
            .name("email")
            .value(email)
            .build()
            .map_err(|e| CredentialsError::Backend(e.to_string()))?;

        // Invitation e-mails are suppressed; the admin hands out the password.
        let created = self
            .client
            .admin_create_user()
            .user_pool_id(&self.user_pool_id)
            .username(user_id)
            .message_action(MessageActionType::Suppress)
            .user_attributes(email_attr)
            .send()
            .await;

        if let Err(e) = created {
            if e.as_service_error()
                .is_some_and(|se| se.is_username_exists_exception())
            {
                return Err(CredentialsError::AlreadyExists);
            }
            tracing::error!("Cognito admin_create_user failed: {}", DisplayErrorContext(&e));
            return Err(CredentialsError::Backend(DisplayErrorContext(&e).to_string()));
        }

        let set_password = self
            .client
            .admin_set_user_password()
            .user_pool_id(&self.user_pool_id)
            .username(user_id)
            .password(password)
            .permanent(true)
            .send()
            .await;

        if let Err(e) = set_password {
            // Do not leave a half-created account behind.
            if let Err(cleanup) = self.remove(user_id).await {
                tracing::error!("Failed to roll back Cognito user {}: {}", user_id, cleanup);
            }
            if e.as_service_error()
                .is_some_and(|se| se.is_invalid_password_exception())
            {
                return Err(CredentialsError::InvalidPassword);
            }
            return Err(CredentialsError::Backend(DisplayErrorContext(&e).to_string()));
        }

        tracing::info!("Cognito account created for user {}", user_id);
        Ok(())
    }

    async fn authenticate(&self, user_id: &str, password: &str) -> Result<AuthTokens, CredentialsError> {
        let secret_hash = compute_secret_hash(user_id, &self.client_id, &self.client_secret)?;

        let auth_result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", user_id)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", &secret_hash)
            .send()
            .await;

        match auth_result {
            Ok(response) => {
                let auth = response.authentication_result().ok_or_else(|| {
                    tracing::error!("No authentication result returned for {}", user_id);
                    CredentialsError::InvalidCredentials
                })?;
                Ok(AuthTokens {
                    id_token: auth.id_token().unwrap_or_default().to_string(),
                    access_token: auth.access_token().unwrap_or_default().to_string(),
                    refresh_token: auth.refresh_token().unwrap_or_default().to_string(),
                    expires_in: auth.expires_in(),
                })
            }
            Err(e) => {
                let rejected = e.as_service_error().is_some_and(|se| {
                    se.is_not_authorized_exception() || se.is_user_not_found_exception()
                });
                if rejected {
                    tracing::warn!("Cognito rejected credentials for {}", user_id);
                    Err(CredentialsError::InvalidCredentials)
                } else {
                    tracing::error!("Cognito authentication error: {}", DisplayErrorContext(&e));
                    Err(CredentialsError::Backend(DisplayErrorContext(&e).to_string()))
                }
            }
        }
    }

    async fn remove(&self, user_id: &str) -> Result<(), CredentialsError> {
        let result = self
            .client
            .admin_delete_user()
            .user_pool_id(&self.user_pool_id)
            .username(user_id)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            // Already gone is as good as removed.
            Err(e) if e.as_service_error().is_some_and(|se| se.is_user_not_found_exception()) => Ok(()),
            Err(e) => Err(CredentialsError::Backend(DisplayErrorContext(&e).to_string())),
        }
    }
}

/// Minimum length the in-memory provider accepts, matching Cognito's default policy.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Salted SHA-256 digests held in process. Tokens are opaque random strings.
#[derive(Default)]
pub struct InMemoryCredentials {
    digests: RwLock<HashMap<String, String>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    fn digest(user_id: &str, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(user_id.as_bytes());
        hasher.update(b":");
        hasher.update(password.as_bytes());
        general_purpose::STANDARD.encode(hasher.finalize())
    }
}

#[async_trait]
impl Credentials for InMemoryCredentials {
    async fn register(&self, user_id: &str, _email: &str, password: &str) -> Result<(), CredentialsError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CredentialsError::InvalidPassword);
        }
        let mut digests = self.digests.write().await;
        if digests.contains_key(user_id) {
            return Err(CredentialsError::AlreadyExists);
        }
        digests.insert(user_id.to_string(), Self::digest(user_id, password));
        Ok(())
    }

    async fn authenticate(&self, user_id: &str, password: &str) -> Result<AuthTokens, CredentialsError> {
        let digests = self.digests.read().await;
        match digests.get(user_id) {
            Some(stored) if *stored == Self::digest(user_id, password) => Ok(AuthTokens {
                id_token: uuid::Uuid::new_v4().to_string(),
                access_token: uuid::Uuid::new_v4().to_string(),
                refresh_token: uuid::Uuid::new_v4().to_string(),
                expires_in: 3600,
            }),
            _ => Err(CredentialsError::InvalidCredentials),
        }
    }

    async fn remove(&self, user_id: &str) -> Result<(), CredentialsError> {
        self.digests.write().await.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_hash_is_base64_hmac_of_username_and_client_id() {
        let hash = compute_secret_hash("user-1", "client", "secret").unwrap();
        let decoded = general_purpose::STANDARD.decode(&hash).unwrap();
        assert_eq!(decoded.len(), 32);
        assert_eq!(hash, compute_secret_hash("user-1", "client", "secret").unwrap());
        assert_ne!(hash, compute_secret_hash("user-2", "client", "secret").unwrap());
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let creds = InMemoryCredentials::new();
        creds.register("u1", "a@b.c", "correct-horse").await.unwrap();

        assert!(creds.authenticate("u1", "correct-horse").await.is_ok());
        assert_eq!(
            creds.authenticate("u1", "wrong-horse").await.unwrap_err(),
            CredentialsError::InvalidCredentials
        );

        creds.remove("u1").await.unwrap();
        assert!(creds.authenticate("u1", "correct-horse").await.is_err());
    }

    #[tokio::test]
    async fn in_memory_enforces_policy_and_uniqueness() {
        let creds = InMemoryCredentials::new();
        assert_eq!(
            creds.register("u1", "a@b.c", "short").await.unwrap_err(),
            CredentialsError::InvalidPassword
        );
        creds.register("u1", "a@b.c", "long-enough").await.unwrap();
        assert_eq!(
            creds.register("u1", "a@b.c", "long-enough").await.unwrap_err(),
            CredentialsError::AlreadyExists
        );
    }
}
