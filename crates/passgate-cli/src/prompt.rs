//! Hidden terminal input

use anyhow::{anyhow, Result};
use dialoguer::Password;
use zeroize::Zeroizing;

/// Read a passcode without echoing it
pub async fn passcode(prompt: impl Into<String>) -> Result<Zeroizing<String>> {
    let prompt = prompt.into();
    tokio::task::spawn_blocking(move || {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()
            .map(Zeroizing::new)
            .map_err(|e| anyhow!("Failed to read passcode: {}", e))
    })
    .await
    .map_err(|e| anyhow!("Prompt task failed: {}", e))?
}
