//! Passgate - passcode and biometric gate for signed-in sessions
//!
//! This crate decides when a signed-in user has to re-enter their passcode:
//! - Passcode verification against an OS-backed credential store
//! - Retry policy with a transient error flag
//! - Session gate state machine driven by app lifecycle transitions
//! - Registration and change flows for the passcode itself
//!
//! All platform collaborators (credential store, session persistence,
//! lifecycle signal, UI resets) are injected as traits.
//!
//! # Optional Features
//!
//! - `keyring` - OS keychain backend via the `keyring` crate

pub mod config;
pub mod credential;
pub mod effects;
pub mod error;
pub mod flash;
pub mod flows;
pub mod gate;
pub mod lifecycle;
pub mod lockout;
pub mod passcode;
pub mod session;

pub use config::GateConfig;
pub use credential::{
    AccessPolicy, BiometryAvailability, CredentialRecord, MemoryCredentialStore,
    SecureCredentialStore, ServiceId, Services,
};
pub use effects::{NoopEffects, RecordingEffects, UnlockEffects};
pub use error::{GateError, Result};
pub use flash::ErrorFlash;
pub use flows::{ChangeFlow, ChangeStep, FlowOutcome, RegistrationFlow, RegistrationStep};
pub use gate::{
    BiometricOutcome, EntryOutcome, ForegroundOutcome, GateState, SessionGate, UnlockMethod,
};
pub use lifecycle::{AppTransition, ChannelLifecycle, LifecycleHandle, LifecycleSource};
pub use lockout::{AttemptCounter, MismatchOutcome, RetryPolicy, RetryWindow};
pub use passcode::{PasscodeFormat, PasscodeVerifier, Verification};
pub use session::{FileSessionStore, MemorySessionStore, SessionState, SessionStateStore};

#[cfg(feature = "keyring")]
pub use credential::KeyringCredentialStore;
