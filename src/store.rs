//! Persistence interface for account material.
//!
//! The session core loads and saves accounts through this trait and never
//! inspects the on-disk layout; that stays with the host.

use crate::{
    acct::{AcmeAccount, AcmeKey},
    error::ErrorKind,
};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("account {0} not found in store")]
    NotFound(String),

    #[error("storage failure: {0}")]
    Other(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Other(_) => ErrorKind::General,
        }
    }
}

/// Store of registered accounts, keyed by an id the store assigns.
pub trait AccountStore {
    fn load_account(&self, account_id: &str) -> Result<(AcmeAccount, AcmeKey), StoreError>;

    /// Persist an account and its key. When `account_id` is `None` the
    /// store picks a fresh id; either way the effective id is returned.
    fn save_account(
        &self,
        account_id: Option<&str>,
        account: &AcmeAccount,
        key: &AcmeKey,
    ) -> Result<String, StoreError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;

    /// In-memory store. Keys round-trip through PEM, same as a file-backed
    /// store would.
    #[derive(Default)]
    pub(crate) struct MemStore {
        accounts: Mutex<HashMap<String, (AcmeAccount, String)>>,
        next_id: Mutex<u32>,
    }

    impl MemStore {
        pub(crate) fn put(&self, account_id: &str, account: AcmeAccount) {
            let pem = AcmeKey::generate().to_pem().unwrap();
            self.accounts
                .lock()
                .insert(account_id.to_owned(), (account, pem.to_string()));
        }
    }

    impl AccountStore for MemStore {
        fn load_account(&self, account_id: &str) -> Result<(AcmeAccount, AcmeKey), StoreError> {
            let accounts = self.accounts.lock();
            let (account, pem) = accounts
                .get(account_id)
                .ok_or_else(|| StoreError::NotFound(account_id.to_owned()))?;

            let key =
                AcmeKey::from_pem(pem).map_err(|err| StoreError::Other(err.to_string()))?;
            Ok((account.clone(), key))
        }

        fn save_account(
            &self,
            account_id: Option<&str>,
            account: &AcmeAccount,
            key: &AcmeKey,
        ) -> Result<String, StoreError> {
            let id = match account_id {
                Some(id) => id.to_owned(),
                None => {
                    let mut next = self.next_id.lock();
                    *next += 1;
                    format!("acct-{next:04}", next = *next)
                }
            };

            let pem = key
                .to_pem()
                .map_err(|err| StoreError::Other(err.to_string()))?;
            self.accounts
                .lock()
                .insert(id.clone(), (account.clone(), pem.to_string()));
            Ok(id)
        }
    }

    #[test]
    fn mem_store_round_trip() {
        let store = MemStore::default();
        let account = AcmeAccount {
            url: Some("https://acme.example/acct/1".to_owned()),
            ca_url: "https://acme.example/dir".to_owned(),
            contact: vec![],
            agreement: Some("https://acme.example/tos".to_owned()),
        };

        let id = store
            .save_account(None, &account, &AcmeKey::generate())
            .unwrap();
        let (loaded, _key) = store.load_account(&id).unwrap();
        assert_eq!(loaded, account);
    }

    #[test]
    fn missing_account_kind() {
        let store = MemStore::default();
        let err = store.load_account("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
