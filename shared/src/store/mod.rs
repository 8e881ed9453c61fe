//! Persistence ports for leads and users.
//!
//! Services only see these traits; `dynamo` backs them with the single
//! DynamoDB table in production and `memory` keeps everything in process
//! for tests and local runs.

pub mod dynamo;
pub mod memory;

use crate::error::ApiError;
use crate::types::{Lead, User};
use async_trait::async_trait;
use thiserror::Error;

pub use dynamo::{DynamoLeadStore, DynamoUserStore};
pub use memory::{InMemoryLeadStore, InMemoryUserStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The stored document's version differs from the one the write was based on.
    #[error("version conflict on {key}")]
    VersionConflict { key: String },
    /// A stored item could not be decoded into its domain type.
    #[error("corrupt item {key}: {message}")]
    Corrupt { key: String, message: String },
    /// A unique value (email or username) is already held by another user.
    #[error("unique value already taken: {key}")]
    Duplicate { key: String },
    /// The encoded document would exceed the backend's item size limit.
    #[error("item {key} is too large to store")]
    TooLarge { key: String },
    #[error("store backend failed: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    pub fn corrupt(key: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { key } if key.starts_with("USER#") => {
                ApiError::VersionConflict("User")
            }
            StoreError::VersionConflict { .. } => ApiError::VersionConflict("Lead"),
            StoreError::Duplicate { .. } => ApiError::Conflict("User already exists".to_string()),
            StoreError::TooLarge { .. } => {
                ApiError::InvalidOperation("Lead activity log is full".to_string())
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Lead documents with their embedded logs.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Persist a new lead. Its `version` must be 1.
    async fn insert(&self, lead: &Lead) -> Result<(), StoreError>;

    async fn get(&self, lead_id: &str) -> Result<Option<Lead>, StoreError>;

    /// Leads owned by `owner_user_id`, newest created first.
    async fn list_by_owner(&self, owner_user_id: &str) -> Result<Vec<Lead>, StoreError>;

    /// Every lead in the store, in no particular order.
    async fn list_all(&self) -> Result<Vec<Lead>, StoreError>;

    /// Overwrite a lead, provided the stored copy is still at `expected_version`.
    /// The written document carries `lead.version`, which callers bump.
    async fn replace(&self, lead: &Lead, expected_version: u64) -> Result<(), StoreError>;

    /// Returns false when nothing was stored under `lead_id`.
    async fn delete(&self, lead_id: &str) -> Result<bool, StoreError>;
}

/// User profiles. Email and username are unique across users; `insert` and
/// `replace` fail with [`StoreError::Duplicate`] rather than break that.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, user: &User) -> Result<(), StoreError>;

    async fn get(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// First user other than `exclude_user_id` holding either the email or the username.
    async fn find_conflicting(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        exclude_user_id: Option<&str>,
    ) -> Result<Option<User>, StoreError>;

    async fn list_all(&self) -> Result<Vec<User>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;

    async fn replace(&self, user: &User, expected_version: u64) -> Result<(), StoreError>;

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError>;
}

pub(crate) fn lead_key(lead_id: &str) -> String {
    format!("LEAD#{}", lead_id)
}

pub(crate) fn user_key(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

pub(crate) fn email_key(email: &str) -> String {
    format!("EMAIL#{}", email)
}

pub(crate) fn username_key(username: &str) -> String {
    format!("USERNAME#{}", username)
}

pub(crate) fn owner_key(owner_user_id: &str) -> String {
    format!("OWNER#{}", owner_user_id)
}
