//! Process-wide session state
//!
//! `is_logged_in` and `is_biometry_enrolled` are persisted and survive
//! restarts. `is_pass_code_entered` lives in memory only: every process start
//! and every trip to the background begins with the passcode screen.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::Result;

/// Session flags shared by the gate and the flows
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub is_pass_code_entered: bool,
    pub is_logged_in: bool,
    /// A biometric copy of the passcode was enrolled for this sign-in
    pub is_biometry_enrolled: bool,
}

/// Key-value session store injected into the gate
pub trait SessionStateStore: Send + Sync {
    fn get(&self) -> SessionState;

    fn set(&self, state: SessionState) -> Result<()>;

    /// Watch for changes
    fn subscribe(&self) -> watch::Receiver<SessionState>;

    fn set_logged_in(&self, logged_in: bool) -> Result<()> {
        let mut state = self.get();
        state.is_logged_in = logged_in;
        if !logged_in {
            state.is_pass_code_entered = false;
            state.is_biometry_enrolled = false;
        }
        self.set(state)
    }

    fn set_biometry_enrolled(&self, enrolled: bool) -> Result<()> {
        let mut state = self.get();
        state.is_biometry_enrolled = enrolled;
        self.set(state)
    }

    fn set_pass_code_entered(&self, entered: bool) -> Result<()> {
        let mut state = self.get();
        state.is_pass_code_entered = entered;
        self.set(state)
    }
}

/// Session store that forgets everything on exit
pub struct MemorySessionStore {
    state: watch::Sender<SessionState>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

impl MemorySessionStore {
    pub fn new(initial: SessionState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    /// A signed-in session waiting for its passcode
    pub fn logged_in() -> Self {
        Self::new(SessionState {
            is_logged_in: true,
            ..Default::default()
        })
    }
}

impl SessionStateStore for MemorySessionStore {
    fn get(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set(&self, state: SessionState) -> Result<()> {
        self.state.send_replace(state);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

/// On-disk format (only the persisted half of the state)
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    is_logged_in: bool,
    #[serde(default)]
    is_biometry_enrolled: bool,
    /// Version for future migrations
    version: u32,
}

/// Session store persisting `is_logged_in` to a JSON file
pub struct FileSessionStore {
    path: PathBuf,
    state: watch::Sender<SessionState>,
}

impl FileSessionStore {
    /// Open the store, starting signed out if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (is_logged_in, is_biometry_enrolled) = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            let persisted: PersistedSession = serde_json::from_str(&contents)?;
            (persisted.is_logged_in, persisted.is_biometry_enrolled)
        } else {
            (false, false)
        };
        debug!("Loaded session from {:?} (logged in: {})", path, is_logged_in);

        let (state, _) = watch::channel(SessionState {
            is_logged_in,
            is_biometry_enrolled,
            is_pass_code_entered: false,
        });
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &SessionState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&PersistedSession {
            is_logged_in: state.is_logged_in,
            is_biometry_enrolled: state.is_biometry_enrolled,
            version: 1,
        })?;

        // Write atomically
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, &self.path)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl SessionStateStore for FileSessionStore {
    fn get(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set(&self, state: SessionState) -> Result<()> {
        let current = self.get();
        let changed = state.is_logged_in != current.is_logged_in
            || state.is_biometry_enrolled != current.is_biometry_enrolled;
        if changed || !self.path.exists() {
            self.persist(&state)?;
        }
        self.state.send_replace(state);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_logout_clears_pass_code_flag() {
        let store = MemorySessionStore::logged_in();
        store.set_pass_code_entered(true).unwrap();
        store.set_logged_in(false).unwrap();
        assert_eq!(store.get(), SessionState::default());
    }

    #[test]
    fn test_subscribe_sees_updates() {
        let store = MemorySessionStore::default();
        let mut rx = store.subscribe();
        store.set_logged_in(true).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_logged_in);
    }

    #[test]
    fn test_file_store_persists_only_login() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let store = FileSessionStore::open(&path).unwrap();
            assert!(!store.get().is_logged_in);
            store
                .set(SessionState {
                    is_logged_in: true,
                    is_pass_code_entered: true,
                    is_biometry_enrolled: true,
                })
                .unwrap();
        }

        let reopened = FileSessionStore::open(&path).unwrap();
        let state = reopened.get();
        assert!(state.is_logged_in);
        assert!(state.is_biometry_enrolled);
        assert!(!state.is_pass_code_entered);
    }

    #[test]
    fn test_file_store_reads_file_without_enrollment_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{ "is_logged_in": true, "version": 1 }"#).unwrap();

        let state = FileSessionStore::open(&path).unwrap().get();
        assert!(state.is_logged_in);
        assert!(!state.is_biometry_enrolled);
    }

    #[test]
    fn test_logout_clears_enrollment() {
        let store = MemorySessionStore::logged_in();
        store.set_biometry_enrolled(true).unwrap();
        store.set_logged_in(false).unwrap();
        assert!(!store.get().is_biometry_enrolled);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileSessionStore::open(&path).unwrap();
        store.set_logged_in(true).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
