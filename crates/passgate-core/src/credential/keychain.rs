//! OS keychain backend (Keychain / Credential Manager / Secret Service)
//!
//! Desktop keychains have no biometric access control, so a
//! [`AccessPolicy::BiometryRequired`] record is stored like any other entry
//! under its own service. Hosts that want a confirmation step wrap this
//! store (see the `passgate` CLI).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::{AccessPolicy, CredentialRecord, SecureCredentialStore, ServiceId};
use crate::error::{GateError, Result};

/// Stored payload inside the keychain entry
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredRecord {
    username: String,
    secret: String,
}

/// Credential store backed by the `keyring` crate
#[derive(Clone, Debug)]
pub struct KeyringCredentialStore {
    account: String,
}

impl KeyringCredentialStore {
    /// All entries are created under `account` within each service
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(service: &str, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, account).map_err(map_keyring_error)
    }

    async fn blocking<T, F>(&self, service: &ServiceId, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> Result<T> + Send + 'static,
    {
        let service = service.as_str().to_string();
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || op(Self::entry(&service, &account)?))
            .await
            .map_err(|e| GateError::Storage(format!("Keychain task failed: {}", e)))?
    }
}

fn map_keyring_error(err: keyring::Error) -> GateError {
    match err {
        keyring::Error::NoStorageAccess(_) => GateError::StoreUnavailable,
        other => GateError::Storage(other.to_string()),
    }
}

#[async_trait]
impl SecureCredentialStore for KeyringCredentialStore {
    async fn save(
        &self,
        service: &ServiceId,
        username: &str,
        secret: &str,
        _policy: AccessPolicy,
    ) -> Result<bool> {
        let stored = StoredRecord {
            username: username.to_string(),
            secret: secret.to_string(),
        };
        let payload = Zeroizing::new(serde_json::to_string(&stored)?);
        drop(stored);
        debug!("Writing keychain entry for {}", service);

        self.blocking(service, move |entry| {
            entry.set_password(&payload).map_err(map_keyring_error)?;
            Ok(true)
        })
        .await
    }

    async fn get(
        &self,
        service: &ServiceId,
        _policy: AccessPolicy,
    ) -> Result<Option<CredentialRecord>> {
        self.blocking(service, |entry| match entry.get_password() {
            Ok(raw) => {
                let raw = Zeroizing::new(raw);
                let stored: StoredRecord = serde_json::from_str(&raw)?;
                Ok(Some(CredentialRecord::new(
                    stored.username.clone(),
                    &stored.secret,
                )))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(map_keyring_error(err)),
        })
        .await
    }

    async fn reset(&self, service: &ServiceId) -> Result<bool> {
        debug!("Clearing keychain entry for {}", service);
        self.blocking(service, |entry| match entry.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(err) => Err(map_keyring_error(err)),
        })
        .await
    }
}
