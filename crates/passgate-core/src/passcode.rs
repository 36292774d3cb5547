//! Passcode format and verification
//!
//! The passcode gates an already signed-in session. It is a short numeric
//! code compared against the record held by the password service.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::credential::{
    bounded, AccessPolicy, CredentialRecord, SecureCredentialStore, ServiceId,
};
use crate::error::{GateError, Result};

/// Default passcode length
pub const DEFAULT_PASSCODE_LENGTH: usize = 4;
/// Longest passcode accepted by configuration
pub const MAX_PASSCODE_LENGTH: usize = 12;

/// Shape of a valid passcode: a fixed number of ASCII digits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PasscodeFormat {
    length: usize,
}

impl Default for PasscodeFormat {
    fn default() -> Self {
        Self::new(DEFAULT_PASSCODE_LENGTH)
    }
}

impl PasscodeFormat {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Validate passcode format
    pub fn validate(&self, code: &str) -> Result<()> {
        if code.len() != self.length || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(GateError::InvalidPasscode(self.length));
        }
        Ok(())
    }
}

/// Result of comparing an entered code with the stored record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Matched,
    Mismatched,
    /// Nothing to compare against; fatal for the session
    NoStoredCredential,
}

/// Compares entered passcodes against the password service
#[derive(Clone)]
pub struct PasscodeVerifier {
    store: Arc<dyn SecureCredentialStore>,
    service: ServiceId,
    format: PasscodeFormat,
    timeout: Duration,
}

impl PasscodeVerifier {
    pub fn new(
        store: Arc<dyn SecureCredentialStore>,
        service: ServiceId,
        format: PasscodeFormat,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            service,
            format,
            timeout,
        }
    }

    pub fn format(&self) -> PasscodeFormat {
        self.format
    }

    /// Verify an entered code
    ///
    /// Reads the password record and nothing else; calling this repeatedly
    /// against an unchanged store always yields the same answer.
    pub async fn verify(&self, entered: &str) -> Result<Verification> {
        self.format.validate(entered)?;

        let Some(record) = self.stored().await? else {
            debug!("No password record under {}", self.service);
            return Ok(Verification::NoStoredCredential);
        };

        if secrets_equal(entered.as_bytes(), record.secret.as_bytes()) {
            Ok(Verification::Matched)
        } else {
            Ok(Verification::Mismatched)
        }
    }

    /// The baseline password record, read without any biometric prompt
    pub async fn stored(&self) -> Result<Option<CredentialRecord>> {
        bounded(
            self.timeout,
            self.store.get(&self.service, AccessPolicy::WhenUnlocked),
        )
        .await
    }
}

/// Length-independent-timing byte comparison
pub(crate) fn secrets_equal(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
