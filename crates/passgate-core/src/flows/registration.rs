//! Two-step passcode registration: enter, then repeat

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};
use zeroize::Zeroizing;

use super::{FlowContext, FlowOutcome};
use crate::config::GateConfig;
use crate::credential::SecureCredentialStore;
use crate::error::{GateError, Result};
use crate::lockout::{AttemptCounter, MismatchOutcome, RetryWindow};
use crate::passcode::secrets_equal;
use crate::session::SessionStateStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationStep {
    Enter,
    Repeat,
    Complete,
}

/// First-time passcode setup
pub struct RegistrationFlow {
    ctx: FlowContext,
    step: RegistrationStep,
    draft: Option<Zeroizing<String>>,
    window: RetryWindow,
}

impl RegistrationFlow {
    pub fn new(
        config: &GateConfig,
        credentials: Arc<dyn SecureCredentialStore>,
        session: Arc<dyn SessionStateStore>,
    ) -> Self {
        Self {
            ctx: FlowContext::new(config, credentials, session),
            step: RegistrationStep::Enter,
            draft: None,
            window: RetryWindow::new(config.retry_policy()),
        }
    }

    pub fn step(&self) -> RegistrationStep {
        self.step
    }

    pub fn has_draft(&self) -> bool {
        self.draft.is_some()
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

    /// First entry of the new passcode
    pub async fn enter(&mut self, code: &str) -> Result<FlowOutcome<RegistrationStep>> {
        if self.step != RegistrationStep::Enter {
            return Err(GateError::WrongStep("enter"));
        }
        self.ctx.format.validate(code)?;
        self.window.begin_attempt();

        self.draft = Some(Zeroizing::new(code.to_string()));
        self.step = RegistrationStep::Repeat;
        Ok(FlowOutcome::Advanced(RegistrationStep::Repeat))
    }

    /// Confirmation entry; stores the passcode when both entries agree
    pub async fn repeat(&mut self, code: &str) -> Result<FlowOutcome<RegistrationStep>> {
        if self.step != RegistrationStep::Repeat {
            return Err(GateError::WrongStep("repeat"));
        }
        self.ctx.format.validate(code)?;
        self.window.begin_attempt();

        let draft = self.draft.as_ref().ok_or(GateError::WrongStep("enter"))?;
        if !secrets_equal(draft.as_bytes(), code.as_bytes()) {
            return Ok(match self.window.mismatch() {
                MismatchOutcome::Retry { attempt, remaining } => {
                    debug!("Repeated passcode differs (attempt {})", attempt);
                    FlowOutcome::Rejected { attempt, remaining }
                }
                MismatchOutcome::ThresholdReached => {
                    debug!("Too many mismatches; restarting registration");
                    self.draft = None;
                    self.step = RegistrationStep::Enter;
                    FlowOutcome::Restarted(RegistrationStep::Enter)
                }
            });
        }

        let biometry_enrolled = self.ctx.store_passcode(code).await?;
        self.window.matched();
        self.draft = None;
        self.step = RegistrationStep::Complete;
        info!("Passcode registered (biometry: {})", biometry_enrolled);
        Ok(FlowOutcome::Completed { biometry_enrolled })
    }

    /// Leave the repeat step, discarding the first entry
    pub fn back(&mut self) {
        if self.step == RegistrationStep::Repeat {
            self.draft = None;
            self.step = RegistrationStep::Enter;
            self.window.matched();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{AccessPolicy, BiometryAvailability, MemoryCredentialStore};
    use crate::session::MemorySessionStore;
    use std::time::Duration;

    fn setup(
        config: &GateConfig,
    ) -> (RegistrationFlow, Arc<MemoryCredentialStore>, Arc<MemorySessionStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let session = Arc::new(MemorySessionStore::logged_in());
        let flow = RegistrationFlow::new(config, store.clone(), session.clone());
        (flow, store, session)
    }

    #[tokio::test]
    async fn test_matching_entries_register() {
        let config = GateConfig::default();
        let (mut flow, store, session) = setup(&config);

        assert_eq!(
            flow.enter("1234").await.unwrap(),
            FlowOutcome::Advanced(RegistrationStep::Repeat)
        );
        assert_eq!(
            flow.repeat("1234").await.unwrap(),
            FlowOutcome::Completed { biometry_enrolled: true }
        );

        let services = config.services();
        assert_eq!(store.peek_secret(&services.password).as_deref(), Some("1234"));
        assert_eq!(store.peek_secret(&services.biometry).as_deref(), Some("1234"));
        assert!(session.get().is_pass_code_entered);
        assert!(session.get().is_biometry_enrolled);
        assert_eq!(flow.step(), RegistrationStep::Complete);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatch_keeps_draft_and_flashes() {
        let config = GateConfig::default();
        let (mut flow, store, session) = setup(&config);

        flow.enter("1234").await.unwrap();
        assert_eq!(
            flow.repeat("1235").await.unwrap(),
            FlowOutcome::Rejected { attempt: 1, remaining: 2 }
        );
        assert!(flow.is_error());
        assert!(flow.has_draft());
        assert_eq!(flow.step(), RegistrationStep::Repeat);
        assert!(!store.contains(&config.services().password));
        assert!(!session.get().is_pass_code_entered);

        tokio::time::sleep(Duration::from_millis(1499)).await;
        tokio::task::yield_now().await;
        assert!(flow.is_error());

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert!(!flow.is_error());
    }

    #[tokio::test]
    async fn test_third_mismatch_restarts() {
        let config = GateConfig::default();
        let (mut flow, store, _) = setup(&config);

        flow.enter("1234").await.unwrap();
        flow.repeat("1111").await.unwrap();
        flow.repeat("2222").await.unwrap();
        assert_eq!(
            flow.repeat("3333").await.unwrap(),
            FlowOutcome::Restarted(RegistrationStep::Enter)
        );
        assert_eq!(flow.step(), RegistrationStep::Enter);
        assert!(!flow.has_draft());
        assert_eq!(flow.attempts().current(), 1);
        assert!(!store.contains(&config.services().password));

        // Fresh window after the reset
        flow.enter("5678").await.unwrap();
        assert_eq!(
            flow.repeat("0000").await.unwrap(),
            FlowOutcome::Rejected { attempt: 1, remaining: 2 }
        );
    }

    #[tokio::test]
    async fn test_declined_biometry_still_registers() {
        let config = GateConfig::default();
        let (mut flow, store, session) = setup(&config);
        store.set_biometry(BiometryAvailability::Declined);

        flow.enter("1234").await.unwrap();
        assert_eq!(
            flow.repeat("1234").await.unwrap(),
            FlowOutcome::Completed { biometry_enrolled: false }
        );
        assert!(store.contains(&config.services().password));
        assert!(!store.contains(&config.services().biometry));
        assert!(session.get().is_pass_code_entered);
        assert!(!session.get().is_biometry_enrolled);
    }

    #[tokio::test]
    async fn test_biometry_disabled_in_config() {
        let config = GateConfig {
            biometry_enabled: false,
            ..Default::default()
        };
        let (mut flow, store, _) = setup(&config);
        store
            .save(&config.services().biometry, "old", "0000", AccessPolicy::BiometryRequired)
            .await
            .unwrap();

        flow.enter("1234").await.unwrap();
        assert_eq!(
            flow.repeat("1234").await.unwrap(),
            FlowOutcome::Completed { biometry_enrolled: false }
        );
        assert!(!store.contains(&config.services().biometry));
    }

    #[tokio::test]
    async fn test_step_order_enforced() {
        let config = GateConfig::default();
        let (mut flow, _, _) = setup(&config);

        assert!(matches!(
            flow.repeat("1234").await,
            Err(GateError::WrongStep("repeat"))
        ));
        assert!(matches!(
            flow.enter("12").await,
            Err(GateError::InvalidPasscode(4))
        ));

        flow.enter("1234").await.unwrap();
        flow.back();
        assert_eq!(flow.step(), RegistrationStep::Enter);
        assert!(!flow.has_draft());
    }
}
