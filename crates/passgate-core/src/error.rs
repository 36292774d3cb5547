//! Error types for the passcode gate

use thiserror::Error;

/// Result type alias for gate operations
pub type Result<T> = std::result::Result<T, GateError>;

/// Errors that can occur while gating a session
///
/// A wrong passcode is not an error: it is reported as
/// [`Verification::Mismatched`](crate::Verification::Mismatched) and fed to
/// the retry policy.
#[derive(Debug, Error)]
pub enum GateError {
    /// No password record exists; the session cannot be re-gated
    #[error("No stored passcode - the session must be signed out")]
    NoStoredCredential,

    /// The platform denied access to the store (e.g. biometry revoked)
    #[error("Secure store unavailable")]
    StoreUnavailable,

    /// The user declined the biometric prompt or enrollment
    #[error("Biometric permission denied")]
    PermissionDenied,

    /// Entered code does not have the configured shape
    #[error("Passcode must be exactly {0} digits")]
    InvalidPasscode(usize),

    /// Flow operation called out of order
    #[error("Flow is not at the {0} step")]
    WrongStep(&'static str),

    /// Backend failure inside a credential store
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl GateError {
    /// Whether the biometric path should quietly fall back to the keypad
    pub fn is_biometric_fallback(&self) -> bool {
        matches!(self, GateError::StoreUnavailable | GateError::PermissionDenied)
    }
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        GateError::Serialization(e.to_string())
    }
}
