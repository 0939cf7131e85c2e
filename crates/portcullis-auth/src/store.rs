use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Attempted a write in a read-only transaction")]
    ReadOnly,
    #[error("User {0} already exists")]
    UserExists(String),
    #[error("Token was not found in the store")]
    TokenNotFound,
    #[error("Encountered uncategorized error")]
    ServiceError(#[from] anyhow::Error),
}

/// Per-request view of the user store.
///
/// Requests start out reading. Writes in a read transaction fail with [`StoreError::ReadOnly`]
/// until the store restarts the transaction in write mode.
#[derive(Debug)]
pub struct Transaction {
    writable: bool,
}

impl Transaction {
    #[must_use]
    pub fn read() -> Self {
        Self { writable: false }
    }

    #[must_use]
    pub fn write() -> Self {
        Self { writable: true }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn ensure_writable(&self) -> StoreResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::ReadOnly)
        }
    }

    pub fn promote(&mut self) {
        self.writable = true;
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    pub created: DateTime<Utc>,
}

/// Local user records. SSO users have no password, they only exist so that tokens and
/// permissions have something to attach to.
#[async_trait]
pub trait UserStore {
    async fn healthcheck(&self) -> anyhow::Result<()>;

    fn begin(&self) -> Transaction {
        Transaction::read()
    }

    async fn get_user(&self, txn: &Transaction, username: &str) -> StoreResult<Option<UserRecord>>;

    /// Fails with [`StoreError::ReadOnly`] when `txn` is not writable.
    async fn create_user(&self, txn: &Transaction, username: &str) -> StoreResult<UserRecord>;

    async fn restart_as_write_transaction(&self, txn: &mut Transaction) -> StoreResult<()> {
        txn.promote();
        Ok(())
    }
}
