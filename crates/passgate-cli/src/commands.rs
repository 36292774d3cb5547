//! Subcommand handlers

use std::io::{BufRead, BufReader, Read};

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use passgate_core::{
    AppTransition, BiometricOutcome, BiometryAvailability, ChangeStep, ChannelLifecycle,
    EntryOutcome, FlowOutcome, ForegroundOutcome, GateError, LifecycleHandle, LifecycleSource,
    RegistrationFlow, RegistrationStep, SessionGate,
};

use crate::host::Host;
use crate::prompt;

/// What a flow step means for the prompt loop
enum Step {
    Continue,
    Done,
    SignedOut,
}

fn report<S: std::fmt::Debug>(outcome: FlowOutcome<S>, max_attempts: u32) -> Step {
    match outcome {
        FlowOutcome::Advanced(step) => {
            debug!("Advanced to {:?}", step);
            Step::Continue
        }
        FlowOutcome::Rejected { attempt, remaining } => {
            eprintln!(
                "Passcodes do not match (attempt {} of {}, {} left)",
                attempt, max_attempts, remaining
            );
            Step::Continue
        }
        FlowOutcome::Restarted(step) => {
            eprintln!("Too many mismatches, starting over");
            debug!("Restarted at {:?}", step);
            Step::Continue
        }
        FlowOutcome::Completed { biometry_enrolled } => {
            println!("✓ Passcode saved");
            if biometry_enrolled {
                println!("✓ Biometric unlock enabled");
            }
            Step::Done
        }
        FlowOutcome::LoggedOut => Step::SignedOut,
    }
}

/// Turn a flow result into a loop step, keeping malformed input recoverable
fn settle<S: std::fmt::Debug>(
    result: passgate_core::Result<FlowOutcome<S>>,
    max_attempts: u32,
) -> Result<Step> {
    match result {
        Ok(outcome) => Ok(report(outcome, max_attempts)),
        Err(GateError::InvalidPasscode(_)) => {
            eprintln!("Passcode must be digits only");
            Ok(Step::Continue)
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn status(host: &Host) -> Result<()> {
    let state = host.session.get();
    let registered = host.verifier().stored().await?.is_some();

    println!("\n=== Passgate Status ===\n");
    println!("Signed in:      {}", state.is_logged_in);
    println!("Unlocked:       {}", state.is_pass_code_entered);
    println!("Registered:     {}", registered);
    println!("Passcode:       {} digits", host.config.passcode_length);
    println!("Max attempts:   {}", host.config.max_attempts);
    println!(
        "Biometry:       {}",
        if host.config.biometry_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("Enrolled:       {}", state.is_biometry_enrolled);
    println!("Session file:   {:?}", host.config.session_path);

    Ok(())
}

pub async fn register(host: &Host) -> Result<()> {
    if host.verifier().stored().await?.is_some() {
        bail!("A passcode is already set. Use `passgate change` to replace it.");
    }

    // The registration screen is only reachable once signed in
    host.session.set_logged_in(true)?;
    info!("Starting passcode registration");

    let mut flow = host.registration();
    run_registration(&mut flow, host.config.max_attempts).await
}

async fn run_registration(flow: &mut RegistrationFlow, max_attempts: u32) -> Result<()> {
    loop {
        let result = match flow.step() {
            RegistrationStep::Enter => flow.enter(&prompt::passcode("New passcode").await?).await,
            RegistrationStep::Repeat => {
                flow.repeat(&prompt::passcode("Repeat passcode").await?)
                    .await
            }
            RegistrationStep::Complete => return Ok(()),
        };

        match settle(result, max_attempts)? {
            Step::Continue => {}
            Step::Done => return Ok(()),
            Step::SignedOut => bail!("Session was signed out"),
        }
    }
}

pub async fn unlock(host: &Host) -> Result<()> {
    let mut gate = host.gate();

    match gate.on_foreground().await? {
        ForegroundOutcome::LoggedOut => {
            bail!("Not signed in. Run `passgate register` first.")
        }
        ForegroundOutcome::AlreadyUnlocked => {
            println!("Already unlocked");
            return Ok(());
        }
        ForegroundOutcome::Unlocked(method) => {
            println!("✓ Unlocked ({:?})", method);
            return Ok(());
        }
        ForegroundOutcome::ShowKeypad => {}
    }

    if keypad(&mut gate, host.config.max_attempts).await? {
        println!("✓ Unlocked");
        Ok(())
    } else {
        bail!("No passcode on record; signed out")
    }
}

/// Prompt until unlocked. Returns false if the session was signed out instead.
async fn keypad(gate: &mut SessionGate, max_attempts: u32) -> Result<bool> {
    loop {
        let label = if gate.biometry_available() {
            "Passcode (or `b` for biometry)"
        } else {
            "Passcode"
        };
        let input = prompt::passcode(label).await?;

        if input.as_str() == "b" {
            match gate.unlock_with_biometry().await? {
                BiometricOutcome::Unlocked => return Ok(true),
                BiometricOutcome::Unavailable => eprintln!("Biometric unlock unavailable"),
                BiometricOutcome::LoggedOut => return Ok(false),
            }
            continue;
        }

        match gate.submit_passcode(&input).await {
            Ok(EntryOutcome::Unlocked) => return Ok(true),
            Ok(EntryOutcome::Rejected { attempt, remaining }) => eprintln!(
                "Wrong passcode (attempt {} of {}, {} left)",
                attempt, max_attempts, remaining
            ),
            Ok(EntryOutcome::RetryWindowReset) => {
                eprintln!("Wrong passcode. Attempt counter reset.")
            }
            Ok(EntryOutcome::LoggedOut) => return Ok(false),
            Err(GateError::InvalidPasscode(_)) => eprintln!("Passcode must be digits only"),
            Err(e) => return Err(e.into()),
        }
    }
}

pub async fn change(host: &Host) -> Result<()> {
    if !host.session.get().is_logged_in {
        bail!("Not signed in. Run `passgate register` first.");
    }

    let mut flow = host.change();
    let max_attempts = host.config.max_attempts;

    loop {
        let result = match flow.step() {
            ChangeStep::EnterOld => {
                flow.enter_old(&prompt::passcode("Current passcode").await?)
                    .await
            }
            ChangeStep::SetNew => flow.set_new(&prompt::passcode("New passcode").await?).await,
            ChangeStep::RepeatNew => {
                flow.repeat_new(&prompt::passcode("Repeat new passcode").await?)
                    .await
            }
            ChangeStep::Complete => return Ok(()),
        };

        match settle(result, max_attempts)? {
            Step::Continue => {}
            Step::Done => return Ok(()),
            Step::SignedOut => bail!("No passcode on record; signed out"),
        }
    }
}

pub async fn logout(host: &Host) -> Result<()> {
    host.gate().logout().await?;
    println!("✓ Signed out and credentials removed");
    Ok(())
}

const SIMULATE_HELP: &str = "\
Commands:
  fg | bg                           app comes to the foreground / goes to the background
  <digits>                          type a passcode on the keypad
  bio                               press the biometric button
  sensor available|revoked|declined set the simulated sensor
  status                            show session flags
  logout                            sign out
  quit                              exit";

/// Interactive lifecycle simulator over in-memory stores
pub async fn simulate(host: &Host, seed: Option<String>) -> Result<()> {
    if let Some(code) = seed {
        host.session.set_logged_in(true)?;
        let mut flow = host.registration();
        flow.enter(&code).await?;
        match flow.repeat(&code).await? {
            FlowOutcome::Completed { biometry_enrolled } => {
                info!("Seeded passcode (biometry enrolled: {})", biometry_enrolled)
            }
            other => bail!("Failed to seed passcode: {:?}", other),
        }
    }

    let mut gate = host.gate();
    let (lifecycle, mut source) = ChannelLifecycle::channel();
    let (input_tx, mut input_rx) = mpsc::unbounded_channel::<String>();

    // Blocking stdin reads cannot be cancelled; the thread is left behind on return
    spawn_line_reader(std::io::stdin(), lifecycle, input_tx);

    println!("{}", SIMULATE_HELP);

    loop {
        tokio::select! {
            transition = source.next_transition() => {
                let Some(transition) = transition else { break };
                match gate.handle_transition(transition).await? {
                    Some(outcome) => println!("[foreground] {:?}", outcome),
                    None if transition == AppTransition::Background => {
                        println!("[background] {:?}", gate.state())
                    }
                    None => {}
                }
            }
            input = input_rx.recv() => {
                let Some(input) = input else { break };
                if !simulate_input(host, &mut gate, &input).await? {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Route `fg`/`bg` lines to the lifecycle and everything else to `input_tx`
fn spawn_line_reader<R>(
    input: R,
    lifecycle: LifecycleHandle,
    input_tx: mpsc::UnboundedSender<String>,
) -> std::thread::JoinHandle<()>
where
    R: Read + Send + 'static,
{
    std::thread::spawn(move || {
        for line in BufReader::new(input).lines() {
            let Ok(line) = line else { break };
            let line = line.trim().to_string();
            let delivered = match line.as_str() {
                "fg" => lifecycle.foreground(),
                "bg" => lifecycle.background(),
                _ => input_tx.send(line).is_ok(),
            };
            if !delivered {
                break;
            }
        }
    })
}

/// Returns false when the user asked to quit
async fn simulate_input(host: &Host, gate: &mut SessionGate, input: &str) -> Result<bool> {
    let mut words = input.split_whitespace();
    match (words.next(), words.next()) {
        (None, _) => {}
        (Some("quit" | "q" | "exit"), _) => return Ok(false),
        (Some("help"), _) => println!("{}", SIMULATE_HELP),
        (Some("status"), _) => {
            let state = host.session.get();
            println!(
                "[status] gate={:?} logged_in={} error={} attempt={}/{}",
                gate.state(),
                state.is_logged_in,
                gate.is_error(),
                gate.attempts().current(),
                gate.attempts().max_attempts()
            );
        }
        (Some("logout"), _) => {
            gate.logout().await?;
            println!("[logout] signed out");
        }
        (Some("bio"), _) => {
            println!("[biometry] {:?}", gate.unlock_with_biometry().await?);
        }
        (Some("sensor"), Some(mode)) => {
            let availability = match mode {
                "available" => BiometryAvailability::Available,
                "revoked" => BiometryAvailability::Revoked,
                "declined" => BiometryAvailability::Declined,
                other => {
                    eprintln!("Unknown sensor mode: {}", other);
                    return Ok(true);
                }
            };
            match &host.memory {
                Some(store) => {
                    store.set_biometry(availability);
                    println!("[sensor] {:?}", availability);
                }
                None => eprintln!("Sensor control needs the in-memory backend"),
            }
        }
        (Some(code), None) if code.chars().all(|c| c.is_ascii_digit()) => {
            match gate.submit_passcode(code).await {
                Ok(outcome) => println!("[keypad] {:?}", outcome),
                Err(GateError::InvalidPasscode(len)) => {
                    eprintln!("[keypad] rejected malformed code ({} digits)", len)
                }
                Err(e) => return Err(e.into()),
            }
        }
        _ => eprintln!("Unknown command: {}", input),
    }
    Ok(true)
}
