//! Flat-file store of beneficiary records, keyed by email address.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const DEFAULT_BENEFICIARY: &str = "Homer Simpson";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub beneficiary: String,
    pub email: String,
    pub policynumber: u32,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("failed to read accounts file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write accounts file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("accounts file {path} is not a valid account list")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode accounts")]
    Encode(#[source] serde_json::Error),
}

/// Accounts persisted as a JSON list in a single file.
///
/// Every read-modify-write cycle holds the store's lock, so concurrent requests never lose updates or create two
/// records for one email. The lock is per store, so only one `AccountStore` may point at a given file.
#[derive(Clone)]
pub struct AccountStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the account of the first of `emails` that has one, creating an account for the first email if none
    /// does. Returns `None` only if `emails` is empty.
    pub async fn get_or_create(&self, emails: &[String]) -> Result<Option<Account>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut accounts = self.load().await?;
        if let Some(index) = find(&accounts, emails) {
            return Ok(Some(accounts[index].clone()));
        }

        let Some(email) = emails.first() else {
            return Ok(None);
        };
        let account = Account {
            beneficiary: DEFAULT_BENEFICIARY.to_string(),
            email: email.clone(),
            policynumber: rand::thread_rng().gen_range(10_000_000..=99_999_999),
        };
        accounts.push(account.clone());
        self.save(&accounts).await?;
        tracing::info!(policynumber = account.policynumber, "created account");
        Ok(Some(account))
    }

    /// Replaces the beneficiary of the caller's account. Returns `false` if none of `emails` has an account.
    pub async fn update_beneficiary(
        &self,
        emails: &[String],
        beneficiary: &str,
    ) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        let mut accounts = self.load().await?;
        let Some(index) = find(&accounts, emails) else {
            return Ok(false);
        };

        accounts[index].beneficiary = beneficiary.to_string();
        self.save(&accounts).await?;
        tracing::info!(
            policynumber = accounts[index].policynumber,
            "updated beneficiary"
        );
        Ok(true)
    }

    async fn load(&self) -> Result<Vec<Account>, StoreError> {
        let bytes = match tokio::fs::read(self.path.as_path()).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: self.path.to_path_buf(),
            source,
        })
    }

    /// Writes to a sibling file first and renames it over the old one, so readers never see a partial list.
    async fn save(&self, accounts: &[Account]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(accounts).map_err(StoreError::Encode)?;
        let staging = self.path.with_extension("json.tmp");
        let write_error = |source| StoreError::Write {
            path: self.path.to_path_buf(),
            source,
        };
        tokio::fs::write(&staging, bytes).await.map_err(write_error)?;
        tokio::fs::rename(&staging, self.path.as_path())
            .await
            .map_err(write_error)
    }
}

fn find(accounts: &[Account], emails: &[String]) -> Option<usize> {
    emails
        .iter()
        .find_map(|email| accounts.iter().position(|account| &account.email == email))
}
