use super::{email_key, lead_key, user_key, username_key, LeadStore, StoreError, UserStore};
use crate::types::{Lead, User};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local lead store with the same version semantics as DynamoDB.
#[derive(Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<String, Lead>>,
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn insert(&self, lead: &Lead) -> Result<(), StoreError> {
        let mut leads = self.leads.write().await;
        if leads.contains_key(&lead.lead_id) {
            return Err(StoreError::VersionConflict {
                key: lead_key(&lead.lead_id),
            });
        }
        leads.insert(lead.lead_id.clone(), lead.clone());
        Ok(())
    }

    async fn get(&self, lead_id: &str) -> Result<Option<Lead>, StoreError> {
        Ok(self.leads.read().await.get(lead_id).cloned())
    }

    async fn list_by_owner(&self, owner_user_id: &str) -> Result<Vec<Lead>, StoreError> {
        let mut owned: Vec<Lead> = self
            .leads
            .read()
            .await
            .values()
            .filter(|lead| lead.owner_user_id == owner_user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn list_all(&self) -> Result<Vec<Lead>, StoreError> {
        Ok(self.leads.read().await.values().cloned().collect())
    }

    async fn replace(&self, lead: &Lead, expected_version: u64) -> Result<(), StoreError> {
        let mut leads = self.leads.write().await;
        match leads.get(&lead.lead_id) {
            Some(stored) if stored.version == expected_version => {
                leads.insert(lead.lead_id.clone(), lead.clone());
                Ok(())
            }
            _ => Err(StoreError::VersionConflict {
                key: lead_key(&lead.lead_id),
            }),
        }
    }

    async fn delete(&self, lead_id: &str) -> Result<bool, StoreError> {
        Ok(self.leads.write().await.remove(lead_id).is_some())
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Unique value of `user` already held by someone else. Callers hold the write lock.
fn taken_by_other(users: &HashMap<String, User>, user: &User) -> Option<StoreError> {
    users
        .values()
        .filter(|other| other.user_id != user.user_id)
        .find_map(|other| {
            if other.email == user.email {
                Some(email_key(&user.email))
            } else if other.username == user.username {
                Some(username_key(&user.username))
            } else {
                None
            }
        })
        .map(|key| StoreError::Duplicate { key })
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.user_id) {
            return Err(StoreError::VersionConflict {
                key: user_key(&user.user_id),
            });
        }
        if let Some(err) = taken_by_other(&users, user) {
            return Err(err);
        }
        users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn find_conflicting(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        exclude_user_id: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .filter(|user| Some(user.user_id.as_str()) != exclude_user_id)
            .find(|user| {
                email.is_some_and(|e| user.email == e)
                    || username.is_some_and(|u| user.username == u)
            })
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.read().await.values().cloned().collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.users.read().await.len())
    }

    async fn replace(&self, user: &User, expected_version: u64) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        match users.get(&user.user_id) {
            Some(stored) if stored.version == expected_version => {
                if let Some(err) = taken_by_other(&users, user) {
                    return Err(err);
                }
                users.insert(user.user_id.clone(), user.clone());
                Ok(())
            }
            _ => Err(StoreError::VersionConflict {
                key: user_key(&user.user_id),
            }),
        }
    }

    async fn delete(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.users.write().await.remove(user_id).is_some())
    }
}
