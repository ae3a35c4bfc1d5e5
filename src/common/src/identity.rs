//! Identity provider interface and the in-process provider used in monolithic mode.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Public view of an identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub disabled: bool,
}

impl UserRecord {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            display_name: None,
            photo_url: None,
            disabled: false,
        }
    }
}

/// Fields to change on an identity record; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecordUpdate {
    pub display_name: Option<String>,
    /// `Some(None)` clears the photo
    pub photo_url: Option<Option<String>>,
    pub disabled: Option<bool>,
    pub password: Option<String>,
}

impl UserRecordUpdate {
    /// Update that puts the public fields of `snapshot` back.
    pub fn restoring(snapshot: &UserRecord) -> Self {
        Self {
            display_name: snapshot.display_name.clone(),
            photo_url: Some(snapshot.photo_url.clone()),
            disabled: Some(snapshot.disabled),
            password: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity record '{0}' not found")]
    NotFound(String),
    #[error("identity record '{0}' already exists")]
    AlreadyExists(String),
    #[error("identity provider failure: {0}")]
    Provider(String),
}

#[async_trait]
pub trait IdentityProvider: Debug + Send + Sync {
    async fn create_user_record(&self, record: UserRecord) -> Result<(), IdentityError>;

    async fn get_user_record(&self, uid: &str) -> Result<Option<UserRecord>, IdentityError>;

    async fn update_user_record(
        &self,
        uid: &str,
        update: UserRecordUpdate,
    ) -> Result<UserRecord, IdentityError>;

    async fn delete_user_record(&self, uid: &str) -> Result<(), IdentityError>;
}

#[derive(Debug)]
struct StoredIdentity {
    record: UserRecord,
    password_hash: Option<String>,
}

/// Identity records kept in process memory; passwords are stored as bcrypt hashes.
#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    users: RwLock<HashMap<String, StoredIdentity>>,
    hash_cost: u32,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        Self::with_hash_cost(bcrypt::DEFAULT_COST)
    }
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hash_cost(hash_cost: u32) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            hash_cost,
        }
    }

    pub async fn verify_password(&self, uid: &str, password: &str) -> Result<bool, IdentityError> {
        let hash = {
            let users = self.users.read().await;
            let stored = users
                .get(uid)
                .ok_or_else(|| IdentityError::NotFound(uid.to_string()))?;
            match &stored.password_hash {
                Some(hash) => hash.clone(),
                None => return Ok(false),
            }
        };
        let password = password.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?
            .map_err(|e| IdentityError::Provider(e.to_string()))
    }

    async fn hash_password(&self, password: String) -> Result<String, IdentityError> {
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| IdentityError::Provider(e.to_string()))?
            .map_err(|e| IdentityError::Provider(e.to_string()))
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn create_user_record(&self, record: UserRecord) -> Result<(), IdentityError> {
        let mut users = self.users.write().await;
        if users.contains_key(&record.uid) {
            return Err(IdentityError::AlreadyExists(record.uid));
        }
        users.insert(
            record.uid.clone(),
            StoredIdentity {
                record,
                password_hash: None,
            },
        );
        Ok(())
    }

    async fn get_user_record(&self, uid: &str) -> Result<Option<UserRecord>, IdentityError> {
        Ok(self
            .users
            .read()
            .await
            .get(uid)
            .map(|stored| stored.record.clone()))
    }

    async fn update_user_record(
        &self,
        uid: &str,
        update: UserRecordUpdate,
    ) -> Result<UserRecord, IdentityError> {
        // hash before taking the lock
        let password_hash = match update.password {
            Some(password) => Some(self.hash_password(password).await?),
            None => None,
        };

        let mut users = self.users.write().await;
        let stored = users
            .get_mut(uid)
            .ok_or_else(|| IdentityError::NotFound(uid.to_string()))?;

        if let Some(display_name) = update.display_name {
            stored.record.display_name = Some(display_name);
        }
        if let Some(photo_url) = update.photo_url {
            stored.record.photo_url = photo_url;
        }
        if let Some(disabled) = update.disabled {
            stored.record.disabled = disabled;
        }
        if password_hash.is_some() {
            stored.password_hash = password_hash;
        }
        Ok(stored.record.clone())
    }

    async fn delete_user_record(&self, uid: &str) -> Result<(), IdentityError> {
        self.users.write().await.remove(uid);
        Ok(())
    }
}
