//! Three-step passcode change: enter old, set new, repeat new

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{FlowContext, FlowOutcome};
use crate::config::GateConfig;
use crate::credential::SecureCredentialStore;
use crate::error::{GateError, Result};
use crate::lockout::{AttemptCounter, MismatchOutcome, RetryWindow};
use crate::passcode::{secrets_equal, PasscodeVerifier, Verification};
use crate::session::SessionStateStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeStep {
    EnterOld,
    SetNew,
    RepeatNew,
    Complete,
}

/// Replace the stored passcode after proving the current one
pub struct ChangeFlow {
    ctx: FlowContext,
    verifier: PasscodeVerifier,
    step: ChangeStep,
    draft: Option<Zeroizing<String>>,
    window: RetryWindow,
}

impl ChangeFlow {
    pub fn new(
        config: &GateConfig,
        credentials: Arc<dyn SecureCredentialStore>,
        session: Arc<dyn SessionStateStore>,
    ) -> Self {
        let ctx = FlowContext::new(config, credentials, session);
        let verifier = PasscodeVerifier::new(
            Arc::clone(&ctx.credentials),
            ctx.services.password.clone(),
            ctx.format,
            ctx.store_timeout,
        );
        Self {
            ctx,
            verifier,
            step: ChangeStep::EnterOld,
            draft: None,
            window: RetryWindow::new(config.retry_policy()),
        }
    }

    pub fn step(&self) -> ChangeStep {
        self.step
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

    /// Prove knowledge of the current passcode
    pub async fn enter_old(&mut self, code: &str) -> Result<FlowOutcome<ChangeStep>> {
        self.require_step(ChangeStep::EnterOld, "enter old")?;
        self.window.begin_attempt();

        match self.verifier.verify(code).await? {
            Verification::Matched => {
                self.window.matched();
                self.step = ChangeStep::SetNew;
                Ok(FlowOutcome::Advanced(ChangeStep::SetNew))
            }
            Verification::Mismatched => Ok(match self.window.mismatch() {
                MismatchOutcome::Retry { attempt, remaining } => {
                    FlowOutcome::Rejected { attempt, remaining }
                }
                MismatchOutcome::ThresholdReached => FlowOutcome::Restarted(ChangeStep::EnterOld),
            }),
            Verification::NoStoredCredential => {
                warn!("No stored passcode during change; signing the session out");
                self.ctx.session.set_logged_in(false)?;
                Ok(FlowOutcome::LoggedOut)
            }
        }
    }

    /// Choose the new passcode
    pub async fn set_new(&mut self, code: &str) -> Result<FlowOutcome<ChangeStep>> {
        self.require_step(ChangeStep::SetNew, "set new")?;
        self.ctx.format.validate(code)?;
        self.window.begin_attempt();

        self.draft = Some(Zeroizing::new(code.to_string()));
        self.step = ChangeStep::RepeatNew;
        Ok(FlowOutcome::Advanced(ChangeStep::RepeatNew))
    }

    /// Confirm the new passcode and overwrite the stored one
    pub async fn repeat_new(&mut self, code: &str) -> Result<FlowOutcome<ChangeStep>> {
        self.require_step(ChangeStep::RepeatNew, "repeat new")?;
        self.ctx.format.validate(code)?;
        self.window.begin_attempt();

        let draft = self.draft.as_ref().ok_or(GateError::WrongStep("set new"))?;
        if !secrets_equal(draft.as_bytes(), code.as_bytes()) {
            return Ok(match self.window.mismatch() {
                MismatchOutcome::Retry { attempt, remaining } => {
                    FlowOutcome::Rejected { attempt, remaining }
                }
                MismatchOutcome::ThresholdReached => {
                    debug!("Too many mismatches; back to choosing a new passcode");
                    self.draft = None;
                    self.step = ChangeStep::SetNew;
                    FlowOutcome::Restarted(ChangeStep::SetNew)
                }
            });
        }

        let biometry_enrolled = self.ctx.store_passcode(code).await?;
        self.window.matched();
        self.draft = None;
        self.step = ChangeStep::Complete;
        info!("Passcode changed (biometry: {})", biometry_enrolled);
        Ok(FlowOutcome::Completed { biometry_enrolled })
    }

    /// Go back one step
    pub fn back(&mut self) {
        match self.step {
            ChangeStep::RepeatNew => {
                self.draft = None;
                self.step = ChangeStep::SetNew;
            }
            ChangeStep::SetNew => self.step = ChangeStep::EnterOld,
            ChangeStep::EnterOld | ChangeStep::Complete => return,
        }
        self.window.matched();
    }

    fn require_step(&self, step: ChangeStep, name: &'static str) -> Result<()> {
        if self.step != step {
            return Err(GateError::WrongStep(name));
        }
        Ok(())
    }
}
