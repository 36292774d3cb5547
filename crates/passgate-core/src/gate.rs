//! Session gate state machine
//!
//! The gate decides whether the passcode screen is shown:
//!
//! - `Unlocked -> Locked` when the app goes to the background while signed in
//! - `Locked -> Unlocked` on a passcode match or a successful biometric read
//! - a missing password record signs the user out instead of staying locked
//!
//! On returning to the foreground the gate tries biometry once before the
//! keypad is shown. The attempt is re-armed only by a background transition,
//! so backing out of the OS prompt (which refocuses the app) does not loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::credential::{bounded, AccessPolicy, SecureCredentialStore, Services};
use crate::effects::{NoopEffects, UnlockEffects};
use crate::error::{GateError, Result};
use crate::lifecycle::{AppTransition, LifecycleSource};
use crate::lockout::{AttemptCounter, MismatchOutcome, RetryWindow};
use crate::passcode::{secrets_equal, PasscodeVerifier, Verification};
use crate::session::SessionStateStore;

/// Whether the passcode screen is up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Locked,
    Unlocked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockMethod {
    Passcode,
    Biometry,
}

/// What the host should show after a foreground transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForegroundOutcome {
    /// Nobody is signed in; route to the sign-in flow
    LoggedOut,
    /// Already unlocked in this foreground session
    AlreadyUnlocked,
    Unlocked(UnlockMethod),
    /// Show the manual keypad
    ShowKeypad,
}

/// Result of a keypad submission
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryOutcome {
    Unlocked,
    Rejected { attempt: u32, remaining: u32 },
    /// Third strike; the attempt window starts over
    RetryWindowReset,
    /// No baseline credential; the session was signed out
    LoggedOut,
}

/// Result of a biometric unlock attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BiometricOutcome {
    Unlocked,
    /// Fall back to the keypad
    Unavailable,
    LoggedOut,
}

#[derive(Debug, Default)]
struct BiometryState {
    enabled: bool,
    /// Automatic attempt already made in this foreground cycle
    attempted: bool,
    /// The user declined biometry; off until sign-out
    declined: bool,
}

impl BiometryState {
    fn usable(&self) -> bool {
        self.enabled && !self.declined
    }
}

/// Passcode/biometry gate over a signed-in session
pub struct SessionGate {
    credentials: Arc<dyn SecureCredentialStore>,
    session: Arc<dyn SessionStateStore>,
    effects: Arc<dyn UnlockEffects>,
    verifier: PasscodeVerifier,
    services: Services,
    store_timeout: Duration,
    window: RetryWindow,
    biometry: BiometryState,
}

impl SessionGate {
    pub fn new(
        config: &GateConfig,
        credentials: Arc<dyn SecureCredentialStore>,
        session: Arc<dyn SessionStateStore>,
    ) -> Self {
        let services = config.services();
        let verifier = PasscodeVerifier::new(
            Arc::clone(&credentials),
            services.password.clone(),
            config.passcode_format(),
            config.store_timeout(),
        );

        Self {
            credentials,
            session,
            effects: Arc::new(NoopEffects),
            verifier,
            services,
            store_timeout: config.store_timeout(),
            window: RetryWindow::new(config.retry_policy()),
            biometry: BiometryState {
                enabled: config.biometry_enabled,
                ..Default::default()
            },
        }
    }

    /// Install host hooks run after a passcode unlock
    pub fn with_effects(mut self, effects: Arc<dyn UnlockEffects>) -> Self {
        self.effects = effects;
        self
    }

    pub fn state(&self) -> GateState {
        if self.session.get().is_pass_code_entered {
            GateState::Unlocked
        } else {
            GateState::Locked
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.get().is_logged_in
    }

    pub fn is_error(&self) -> bool {
        self.window.is_error()
    }

    pub fn error_flag(&self) -> watch::Receiver<bool> {
        self.window.error_flag()
    }

    pub fn attempts(&self) -> &AttemptCounter {
        self.window.counter()
    }

    /// Whether the keypad should offer a biometric button
    pub fn biometry_available(&self) -> bool {
        self.biometry.usable() && self.session.get().is_biometry_enrolled
    }

    /// User toggled biometric unlock in settings
    pub fn set_biometry_enabled(&mut self, enabled: bool) {
        self.biometry.enabled = enabled;
        if enabled {
            self.biometry.declined = false;
        }
    }

    /// The host app went to the background
    pub fn on_background(&mut self) -> Result<()> {
        if !self.is_logged_in() {
            return Ok(());
        }
        self.session.set_pass_code_entered(false)?;
        self.window.begin_attempt();
        self.biometry.attempted = false;
        debug!("Gate locked on background");
        Ok(())
    }

    /// The host app came back to the foreground
    pub async fn on_foreground(&mut self) -> Result<ForegroundOutcome> {
        if !self.is_logged_in() {
            return Ok(ForegroundOutcome::LoggedOut);
        }
        if self.state() == GateState::Unlocked {
            return Ok(ForegroundOutcome::AlreadyUnlocked);
        }
        if !self.biometry_available() || self.biometry.attempted {
            return Ok(ForegroundOutcome::ShowKeypad);
        }

        self.biometry.attempted = true;
        let outcome = match self.attempt_biometry().await? {
            BiometricOutcome::Unlocked => ForegroundOutcome::Unlocked(UnlockMethod::Biometry),
            BiometricOutcome::Unavailable => ForegroundOutcome::ShowKeypad,
            BiometricOutcome::LoggedOut => ForegroundOutcome::LoggedOut,
        };
        Ok(outcome)
    }

    /// Apply one lifecycle transition
    pub async fn handle_transition(
        &mut self,
        transition: AppTransition,
    ) -> Result<Option<ForegroundOutcome>> {
        match transition {
            AppTransition::Background => {
                self.on_background()?;
                Ok(None)
            }
            AppTransition::Foreground => self.on_foreground().await.map(Some),
        }
    }

    /// Follow a lifecycle source until it closes
    pub async fn drive<L>(&mut self, source: &mut L) -> Result<()>
    where
        L: LifecycleSource + ?Sized,
    {
        while let Some(transition) = source.next_transition().await {
            let outcome = self.handle_transition(transition).await?;
            debug!("{:?} -> {:?}", transition, outcome);
        }
        Ok(())
    }

    /// Check a passcode typed on the keypad
    pub async fn submit_passcode(&mut self, code: &str) -> Result<EntryOutcome> {
        self.window.begin_attempt();
        if !self.is_logged_in() {
            return Ok(EntryOutcome::LoggedOut);
        }

        match self.verifier.verify(code).await? {
            Verification::Matched => {
                self.unlock(UnlockMethod::Passcode)?;
                self.effects.clear_modals();
                self.effects.clear_onboarding_highlight();
                Ok(EntryOutcome::Unlocked)
            }
            Verification::Mismatched => match self.window.mismatch() {
                MismatchOutcome::Retry { attempt, remaining } => {
                    debug!("Passcode mismatch (attempt {})", attempt);
                    Ok(EntryOutcome::Rejected { attempt, remaining })
                }
                MismatchOutcome::ThresholdReached => {
                    debug!("Passcode attempt window reset");
                    Ok(EntryOutcome::RetryWindowReset)
                }
            },
            Verification::NoStoredCredential => {
                self.force_logout()?;
                Ok(EntryOutcome::LoggedOut)
            }
        }
    }

    /// Biometric button on the keypad
    pub async fn unlock_with_biometry(&mut self) -> Result<BiometricOutcome> {
        if !self.is_logged_in() {
            return Ok(BiometricOutcome::LoggedOut);
        }
        if self.state() == GateState::Unlocked {
            return Ok(BiometricOutcome::Unlocked);
        }
        if !self.biometry_available() {
            return Ok(BiometricOutcome::Unavailable);
        }
        self.attempt_biometry().await
    }

    /// Sign out: delete both records and drop the session
    pub async fn logout(&mut self) -> Result<()> {
        for service in [&self.services.biometry, &self.services.password] {
            bounded(self.store_timeout, self.credentials.reset(service)).await?;
        }
        self.session.set_logged_in(false)?;
        self.window.matched();
        self.biometry.attempted = false;
        self.biometry.declined = false;
        info!("Signed out");
        Ok(())
    }

    async fn attempt_biometry(&mut self) -> Result<BiometricOutcome> {
        // Biometry is an alternate path to the password record, never a
        // replacement for it.
        let Some(baseline) = self.verifier.stored().await? else {
            self.force_logout()?;
            return Ok(BiometricOutcome::LoggedOut);
        };

        let read = bounded(
            self.store_timeout,
            self.credentials
                .get(&self.services.biometry, AccessPolicy::BiometryRequired),
        )
        .await;

        match read {
            Ok(Some(record))
                if secrets_equal(record.secret.as_bytes(), baseline.secret.as_bytes()) =>
            {
                self.unlock(UnlockMethod::Biometry)?;
                Ok(BiometricOutcome::Unlocked)
            }
            Ok(Some(_)) => {
                warn!("Biometric copy does not match the stored passcode");
                Ok(BiometricOutcome::Unavailable)
            }
            Ok(None) => {
                debug!("No biometric record enrolled");
                Ok(BiometricOutcome::Unavailable)
            }
            Err(GateError::PermissionDenied) => {
                debug!("Biometry declined; keypad only until sign-out");
                self.biometry.declined = true;
                Ok(BiometricOutcome::Unavailable)
            }
            Err(GateError::StoreUnavailable) => {
                debug!("Biometric store unavailable; falling back to keypad");
                Ok(BiometricOutcome::Unavailable)
            }
            Err(e) => Err(e),
        }
    }

    fn unlock(&mut self, method: UnlockMethod) -> Result<()> {
        self.window.matched();
        self.session.set_pass_code_entered(true)?;
        info!("Gate unlocked via {:?}", method);
        Ok(())
    }

    fn force_logout(&mut self) -> Result<()> {
        warn!("No stored passcode; signing the session out");
        self.window.matched();
        self.session.set_logged_in(false)
    }
}
