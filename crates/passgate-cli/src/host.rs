//! Wires the gate to concrete collaborators

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;

use passgate_core::{
    ChangeFlow, FileSessionStore, GateConfig, KeyringCredentialStore, MemoryCredentialStore,
    MemorySessionStore, PasscodeVerifier, RegistrationFlow, SecureCredentialStore, SessionGate,
    SessionStateStore, UnlockEffects,
};

use crate::biometric::PromptingBiometricStore;

/// Where credentials and session flags live
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// OS keychain plus the session file from the config
    Keychain,
    /// Nothing leaves the process; biometry is a simulated sensor
    Memory,
}

/// Console host: no overlays to dismiss, so just note it
struct ConsoleEffects;

impl UnlockEffects for ConsoleEffects {
    fn clear_modals(&self) {
        debug!("Dismissing open overlays");
    }

    fn clear_onboarding_highlight(&self) {
        debug!("Clearing onboarding highlight");
    }
}

pub struct Host {
    pub config: GateConfig,
    pub credentials: Arc<dyn SecureCredentialStore>,
    pub session: Arc<dyn SessionStateStore>,
    /// Direct handle on the in-process store, for toggling the simulated sensor
    pub memory: Option<Arc<MemoryCredentialStore>>,
}

impl Host {
    pub fn open(config: GateConfig, backend: Backend) -> Result<Self> {
        match backend {
            Backend::Keychain => {
                let session = FileSessionStore::open(&config.session_path).with_context(|| {
                    format!("Failed to open session file {:?}", config.session_path)
                })?;
                let keychain = Arc::new(KeyringCredentialStore::new(config.username.clone()));
                Ok(Self {
                    credentials: Arc::new(PromptingBiometricStore::new(keychain)),
                    session: Arc::new(session),
                    memory: None,
                    config,
                })
            }
            Backend::Memory => {
                let memory = Arc::new(MemoryCredentialStore::new());
                Ok(Self {
                    credentials: memory.clone(),
                    session: Arc::new(MemorySessionStore::default()),
                    memory: Some(memory),
                    config,
                })
            }
        }
    }

    pub fn gate(&self) -> SessionGate {
        SessionGate::new(
            &self.config,
            Arc::clone(&self.credentials),
            Arc::clone(&self.session),
        )
        .with_effects(Arc::new(ConsoleEffects))
    }

    pub fn registration(&self) -> RegistrationFlow {
        RegistrationFlow::new(
            &self.config,
            Arc::clone(&self.credentials),
            Arc::clone(&self.session),
        )
    }

    pub fn change(&self) -> ChangeFlow {
        ChangeFlow::new(
            &self.config,
            Arc::clone(&self.credentials),
            Arc::clone(&self.session),
        )
    }

    pub fn verifier(&self) -> PasscodeVerifier {
        PasscodeVerifier::new(
            Arc::clone(&self.credentials),
            self.config.services().password,
            self.config.passcode_format(),
            self.config.store_timeout(),
        )
    }
}
