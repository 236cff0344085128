//! Account identity bound to a session.

use serde::{Deserialize, Serialize};

use crate::{
    error::{AcmeError, Result},
    session::Session,
    store::AccountStore,
};

mod acme_key;

pub use self::acme_key::AcmeKey;

/// Registered (or in-registration) account identity as persisted by the
/// host's store.
///
/// `url` is the account URL the CA returned on registration; under RFC 8555
/// it doubles as the JWS key identifier (kid). `ca_url` records which CA
/// directory the account belongs to, so a session can refuse accounts from
/// a different endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(rename = "ca-url")]
    pub ca_url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,

    /// Terms-of-service URL the account agreed to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<String>,
}

/// The session's account triple: present as a whole or not at all.
#[derive(Debug, Clone)]
pub(crate) struct AccountBinding {
    /// Store id; absent until the first save assigns one.
    pub id: Option<String>,
    pub account: AcmeAccount,
    pub key: AcmeKey,
}

impl Session {
    /// Load an account from the store and bind it to this session.
    ///
    /// An account recorded for a different CA url is rejected with
    /// [`NotFound`](crate::ErrorKind::NotFound) — it belongs to another
    /// server or to another protocol endpoint on the same server — and the
    /// session's binding is left untouched.
    pub fn use_account(&mut self, store: &dyn AccountStore, account_id: &str) -> Result<()> {
        let (account, key) = store.load_account(account_id)?;

        if account.ca_url != self.base_url {
            log::debug!(
                "{}: account {account_id} belongs to {}, not {}",
                self.short_name,
                account.ca_url,
                self.base_url
            );
            return Err(AcmeError::NotFound(format!(
                "account {account_id} was registered at another CA endpoint"
            )));
        }

        log::debug!("{}: using account {account_id}", self.short_name);
        self.account = Some(AccountBinding {
            id: Some(account_id.to_owned()),
            account,
            key,
        });
        Ok(())
    }

    /// Persist the bound account, adopting the id the store assigns.
    pub fn save_account(&mut self, store: &dyn AccountStore) -> Result<()> {
        let binding = self
            .account
            .as_mut()
            .ok_or_else(|| AcmeError::protocol("no account bound to session"))?;

        let id = store.save_account(binding.id.as_deref(), &binding.account, &binding.key)?;
        binding.id = Some(id);
        Ok(())
    }

    /// Bind a fresh account triple, e.g. ahead of registration against the
    /// newAccount endpoint. The id stays unassigned until the first save.
    pub fn set_account(&mut self, id: Option<String>, account: AcmeAccount, key: AcmeKey) {
        self.account = Some(AccountBinding { id, account, key });
    }

    /// Drop the account triple.
    pub fn clear_account(&mut self) {
        self.account = None;
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account.as_ref().and_then(|b| b.id.as_deref())
    }

    /// The account URL, which under RFC 8555 is also the JWS key identifier.
    pub fn account_url(&self) -> Option<&str> {
        self.account.as_ref().and_then(|b| b.account.url.as_deref())
    }

    pub fn account(&self) -> Option<&AcmeAccount> {
        self.account.as_ref().map(|b| &b.account)
    }
}
