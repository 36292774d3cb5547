//! Host app lifecycle signal

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Foreground/background transition reported by the platform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppTransition {
    Foreground,
    Background,
}

/// Source of lifecycle transitions
#[async_trait]
pub trait LifecycleSource: Send {
    /// Next transition, or `None` once the host has shut down
    async fn next_transition(&mut self) -> Option<AppTransition>;
}

/// Channel-backed lifecycle source
pub struct ChannelLifecycle {
    rx: mpsc::UnboundedReceiver<AppTransition>,
}

/// Sending half of a [`ChannelLifecycle`]
#[derive(Clone)]
pub struct LifecycleHandle {
    tx: mpsc::UnboundedSender<AppTransition>,
}

impl ChannelLifecycle {
    pub fn channel() -> (LifecycleHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (LifecycleHandle { tx }, Self { rx })
    }
}

impl LifecycleHandle {
    /// Report a transition; returns false once the source is gone
    pub fn send(&self, transition: AppTransition) -> bool {
        self.tx.send(transition).is_ok()
    }

    pub fn foreground(&self) -> bool {
        self.send(AppTransition::Foreground)
    }

    pub fn background(&self) -> bool {
        self.send(AppTransition::Background)
    }
}

#[async_trait]
impl LifecycleSource for ChannelLifecycle {
    async fn next_transition(&mut self) -> Option<AppTransition> {
        self.rx.recv().await
    }
}
