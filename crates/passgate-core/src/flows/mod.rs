//! Passcode registration and change flows
//!
//! Both flows are linear step machines sharing the gate's retry policy:
//! a mismatch on a repeat step flashes the error, and the third one walks
//! the flow back to the step where the new code is chosen.

mod change;
mod registration;

pub use change::{ChangeFlow, ChangeStep};
pub use registration::{RegistrationFlow, RegistrationStep};

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::GateConfig;
use crate::credential::{bounded, AccessPolicy, SecureCredentialStore, Services};
use crate::error::Result;
use crate::passcode::PasscodeFormat;
use crate::session::SessionStateStore;

/// Result of one step of a flow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowOutcome<S> {
    /// Moved on to the given step
    Advanced(S),
    Rejected { attempt: u32, remaining: u32 },
    /// Third strike; walked back to the given step
    Restarted(S),
    /// New passcode stored
    Completed { biometry_enrolled: bool },
    /// No baseline credential; the session was signed out
    LoggedOut,
}

/// Collaborators and settings shared by the flows
struct FlowContext {
    credentials: Arc<dyn SecureCredentialStore>,
    session: Arc<dyn SessionStateStore>,
    services: Services,
    username: String,
    format: PasscodeFormat,
    store_timeout: Duration,
    biometry_enabled: bool,
}

impl FlowContext {
    fn new(
        config: &GateConfig,
        credentials: Arc<dyn SecureCredentialStore>,
        session: Arc<dyn SessionStateStore>,
    ) -> Self {
        Self {
            credentials,
            session,
            services: config.services(),
            username: config.username.clone(),
            format: config.passcode_format(),
            store_timeout: config.store_timeout(),
            biometry_enabled: config.biometry_enabled,
        }
    }

    /// Write the password record, then the biometric copy if offered
    ///
    /// A declined or unavailable biometric prompt does not fail the flow;
    /// any older biometric copy is removed so it cannot go stale, and the
    /// session is marked as not enrolled so the gate stops offering biometry.
    async fn store_passcode(&self, code: &str) -> Result<bool> {
        bounded(
            self.store_timeout,
            self.credentials.save(
                &self.services.password,
                &self.username,
                code,
                AccessPolicy::WhenUnlocked,
            ),
        )
        .await?;

        let enrolled = if self.biometry_enabled {
            let saved = bounded(
                self.store_timeout,
                self.credentials.save(
                    &self.services.biometry,
                    &self.username,
                    code,
                    AccessPolicy::BiometryRequired,
                ),
            )
            .await;
            match saved {
                Ok(saved) => saved,
                Err(e) if e.is_biometric_fallback() => {
                    info!("Biometric enrollment skipped: {}", e);
                    false
                }
                Err(e) => return Err(e),
            }
        } else {
            false
        };

        if !enrolled {
            bounded(
                self.store_timeout,
                self.credentials.reset(&self.services.biometry),
            )
            .await?;
        }

        self.session.set_biometry_enrolled(enrolled)?;
        self.session.set_pass_code_entered(true)?;
        Ok(enrolled)
    }
}
