//! In-process credential store
//!
//! Behaves like a device keychain without touching the OS. The biometric
//! side can be switched to revoked or declined to exercise the fallback
//! paths, and biometric reads are counted so callers can assert how often
//! a prompt would have been shown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AccessPolicy, CredentialRecord, SecureCredentialStore, ServiceId};
use crate::error::{GateError, Result};

/// How the simulated biometric sensor responds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BiometryAvailability {
    /// Prompts succeed
    #[default]
    Available,
    /// Biometry revoked in OS settings
    Revoked,
    /// The user declines every prompt
    Declined,
}

struct Entry {
    record: CredentialRecord,
    policy: AccessPolicy,
}

/// Keychain stand-in backed by a map
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<ServiceId, Entry>>,
    biometry: Mutex<BiometryAvailability>,
    biometric_reads: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_biometry(&self, availability: BiometryAvailability) {
        if let Ok(mut biometry) = self.biometry.lock() {
            *biometry = availability;
        }
    }

    /// Number of `get` calls made with [`AccessPolicy::BiometryRequired`]
    pub fn biometric_reads(&self) -> usize {
        self.biometric_reads.load(Ordering::SeqCst)
    }

    /// Whether a record exists, without triggering any prompt
    pub fn contains(&self, service: &ServiceId) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(service))
            .unwrap_or(false)
    }

    /// Peek at a stored secret, without triggering any prompt
    pub fn peek_secret(&self, service: &ServiceId) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries.get(service).map(|e| e.record.secret.to_string())
    }

    fn check_biometry(&self) -> Result<()> {
        let availability = *self
            .biometry
            .lock()
            .map_err(|_| GateError::Storage("biometry state poisoned".into()))?;
        match availability {
            BiometryAvailability::Available => Ok(()),
            BiometryAvailability::Revoked => Err(GateError::StoreUnavailable),
            BiometryAvailability::Declined => Err(GateError::PermissionDenied),
        }
    }

    fn lock_entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<ServiceId, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| GateError::Storage("credential map poisoned".into()))
    }
}

#[async_trait]
impl SecureCredentialStore for MemoryCredentialStore {
    async fn save(
        &self,
        service: &ServiceId,
        username: &str,
        secret: &str,
        policy: AccessPolicy,
    ) -> Result<bool> {
        if policy == AccessPolicy::BiometryRequired {
            self.check_biometry()?;
        }
        let record = CredentialRecord::new(username, secret);
        self.lock_entries()?
            .insert(service.clone(), Entry { record, policy });
        Ok(true)
    }

    async fn get(
        &self,
        service: &ServiceId,
        policy: AccessPolicy,
    ) -> Result<Option<CredentialRecord>> {
        let entries = self.lock_entries()?;
        let Some(entry) = entries.get(service) else {
            return Ok(None);
        };

        // The stored policy wins: a biometry-protected record always prompts.
        if policy == AccessPolicy::BiometryRequired
            || entry.policy == AccessPolicy::BiometryRequired
        {
            self.biometric_reads.fetch_add(1, Ordering::SeqCst);
            self.check_biometry()?;
        }
        Ok(Some(entry.record.clone()))
    }

    async fn reset(&self, service: &ServiceId) -> Result<bool> {
        Ok(self.lock_entries()?.remove(service).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str) -> ServiceId {
        ServiceId::new(name)
    }

    #[tokio::test]
    async fn test_save_get_reset() {
        let store = MemoryCredentialStore::new();
        let svc = service("pw");

        assert!(store.get(&svc, AccessPolicy::WhenUnlocked).await.unwrap().is_none());

        store
            .save(&svc, "alice", "1234", AccessPolicy::WhenUnlocked)
            .await
            .unwrap();
        let record = store.get(&svc, AccessPolicy::WhenUnlocked).await.unwrap().unwrap();
        assert_eq!(record.username, "alice");
        assert_eq!(record.secret.as_str(), "1234");

        assert!(store.reset(&svc).await.unwrap());
        assert!(!store.reset(&svc).await.unwrap());
        assert!(!store.contains(&svc));
    }

    #[tokio::test]
    async fn test_overwrite() {
        let store = MemoryCredentialStore::new();
        let svc = service("pw");
        store.save(&svc, "a", "1111", AccessPolicy::WhenUnlocked).await.unwrap();
        store.save(&svc, "a", "2222", AccessPolicy::WhenUnlocked).await.unwrap();
        assert_eq!(store.peek_secret(&svc).as_deref(), Some("2222"));
    }

    #[tokio::test]
    async fn test_biometric_reads_counted() {
        let store = MemoryCredentialStore::new();
        let svc = service("bio");
        store
            .save(&svc, "a", "1234", AccessPolicy::BiometryRequired)
            .await
            .unwrap();

        store.get(&svc, AccessPolicy::BiometryRequired).await.unwrap();
        store.get(&svc, AccessPolicy::WhenUnlocked).await.unwrap();
        assert_eq!(store.biometric_reads(), 2);
    }

    #[tokio::test]
    async fn test_biometry_refusals() {
        let store = MemoryCredentialStore::new();
        let svc = service("bio");

        store.set_biometry(BiometryAvailability::Declined);
        let err = store
            .save(&svc, "a", "1234", AccessPolicy::BiometryRequired)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::PermissionDenied));

        store.set_biometry(BiometryAvailability::Available);
        store
            .save(&svc, "a", "1234", AccessPolicy::BiometryRequired)
            .await
            .unwrap();

        store.set_biometry(BiometryAvailability::Revoked);
        let err = store
            .get(&svc, AccessPolicy::BiometryRequired)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::StoreUnavailable));
    }
}
