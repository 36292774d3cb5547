//! Secure credential store abstraction
//!
//! The gate never talks to a keychain directly. Everything goes through
//! [`SecureCredentialStore`], which mirrors the OS keychain surface:
//! save / get / reset of a single record per named service, each guarded by
//! an [`AccessPolicy`].
//!
//! Two services are used by convention:
//! - the password service, holding the baseline passcode record
//! - the biometry service, holding a biometry-protected copy of it

mod memory;

#[cfg(feature = "keyring")]
mod keychain;

pub use memory::{BiometryAvailability, MemoryCredentialStore};

#[cfg(feature = "keyring")]
pub use keychain::KeyringCredentialStore;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::{GateError, Result};

/// Access policy attached to a stored record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessPolicy {
    /// Readable whenever the device is unlocked
    WhenUnlocked,
    /// Every read requires a successful biometric prompt
    BiometryRequired,
}

/// Name of a keychain service
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The pair of services the gate works with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Services {
    pub password: ServiceId,
    pub biometry: ServiceId,
}

/// A username/secret pair as stored under one service
#[derive(Clone)]
pub struct CredentialRecord {
    pub username: String,
    pub secret: Zeroizing<String>,
}

impl CredentialRecord {
    pub fn new(username: impl Into<String>, secret: &str) -> Self {
        Self {
            username: username.into(),
            secret: Zeroizing::new(secret.to_string()),
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// OS-backed secret store
///
/// Implementations map platform refusals onto
/// [`GateError::StoreUnavailable`] (access denied by the platform, e.g.
/// biometry revoked in settings) and [`GateError::PermissionDenied`] (the
/// user declined the prompt or enrollment). A missing entry is `Ok(None)`,
/// never an error.
#[async_trait]
pub trait SecureCredentialStore: Send + Sync {
    /// Store (or overwrite) the record for `service`
    async fn save(
        &self,
        service: &ServiceId,
        username: &str,
        secret: &str,
        policy: AccessPolicy,
    ) -> Result<bool>;

    /// Fetch the record for `service`, prompting if the policy demands it
    async fn get(&self, service: &ServiceId, policy: AccessPolicy)
        -> Result<Option<CredentialRecord>>;

    /// Remove the record for `service`; returns whether one existed
    async fn reset(&self, service: &ServiceId) -> Result<bool>;
}

/// Bound a store call, treating expiry as the store being unavailable
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Secure store call exceeded {:?}", limit);
            Err(GateError::StoreUnavailable)
        }
    }
}
