//! Terminal stand-in for the OS biometric prompt

use std::sync::Arc;

use async_trait::async_trait;
use dialoguer::Confirm;
use passgate_core::{
    AccessPolicy, CredentialRecord, GateError, Result, SecureCredentialStore, ServiceId,
};

/// Asks the user to confirm every biometry-protected read or write
///
/// Declining an enrollment maps to `PermissionDenied`; backing out of an
/// unlock prompt maps to `StoreUnavailable`, which sends the gate to the
/// keypad.
pub struct PromptingBiometricStore {
    inner: Arc<dyn SecureCredentialStore>,
}

impl PromptingBiometricStore {
    pub fn new(inner: Arc<dyn SecureCredentialStore>) -> Self {
        Self { inner }
    }

    async fn confirm(prompt: &'static str) -> Result<bool> {
        tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .map_err(|e| GateError::Storage(format!("Prompt failed: {}", e)))
        })
        .await
        .map_err(|e| GateError::Storage(format!("Prompt task failed: {}", e)))?
    }
}

#[async_trait]
impl SecureCredentialStore for PromptingBiometricStore {
    async fn save(
        &self,
        service: &ServiceId,
        username: &str,
        secret: &str,
        policy: AccessPolicy,
    ) -> Result<bool> {
        if policy == AccessPolicy::BiometryRequired
            && !Self::confirm("Enable biometric unlock?").await?
        {
            return Err(GateError::PermissionDenied);
        }
        self.inner.save(service, username, secret, policy).await
    }

    async fn get(
        &self,
        service: &ServiceId,
        policy: AccessPolicy,
    ) -> Result<Option<CredentialRecord>> {
        if policy == AccessPolicy::BiometryRequired
            && !Self::confirm("[biometric] Touch the sensor to unlock?").await?
        {
            return Err(GateError::StoreUnavailable);
        }
        self.inner.get(service, policy).await
    }

    async fn reset(&self, service: &ServiceId) -> Result<bool> {
        self.inner.reset(service).await
    }
}
