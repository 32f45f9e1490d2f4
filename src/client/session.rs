//! Session bookkeeping outside the HTTP layer
//!
//! `Location` tracks the page (API path) the user is working with, and
//! `SessionStore` remembers where to return after signing in again. The
//! store can persist to `session.yaml` next to the config file so the
//! redirect survives across CLI runs.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// File name of the persisted session state
pub const SESSION_FILE: &str = "session.yaml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redirect_after_login: Option<String>,
}

/// Post-login redirect storage.
#[derive(Debug, Default)]
pub struct SessionStore {
    path: Option<PathBuf>,
    state: Mutex<SessionState>,
}

impl SessionStore {
    /// Store that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store from `path`, starting empty if the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            serde_yaml::from_str(&contents).map_err(ConfigError::from)?
        } else {
            SessionState::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        })
    }

    /// Path of the session file that sits beside `config_path`
    pub fn path_beside(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .map(|dir| dir.join(SESSION_FILE))
            .unwrap_or_else(|| PathBuf::from(SESSION_FILE))
    }

    pub fn redirect_after_login(&self) -> Option<String> {
        self.lock().redirect_after_login.clone()
    }

    pub fn set_redirect_after_login(&self, path: &str) {
        let mut state = self.lock();
        state.redirect_after_login = Some(path.to_string());
        self.persist(&state);
    }

    /// Read and forget the stored redirect
    pub fn take_redirect_after_login(&self) -> Option<String> {
        let mut state = self.lock();
        let redirect = state.redirect_after_login.take();
        if redirect.is_some() {
            self.persist(&state);
        }
        redirect
    }

    // Persistence failures must not break the expiry flow, so they are logged.
    fn persist(&self, state: &SessionState) {
        let Some(path) = &self.path else {
            return;
        };
        let result = serde_yaml::to_string(state)
            .map_err(|e| e.to_string())
            .and_then(|contents| {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
                std::fs::write(path, contents).map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => debug!("Saved session state to {}", path.display()),
            Err(e) => warn!("Failed to save session state to {}: {}", path.display(), e),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Current position of the user in the application.
#[derive(Debug)]
pub struct Location {
    path: Mutex<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Mutex::new(path.into()),
        }
    }

    pub fn current_path(&self) -> String {
        self.path.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn navigate(&self, path: &str) {
        debug!("Navigating to {}", path);
        *self.path.lock().unwrap_or_else(PoisonError::into_inner) = path.to_string();
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_take_clears_redirect() {
        let store = SessionStore::in_memory();
        assert_eq!(store.redirect_after_login(), None);

        store.set_redirect_after_login("/risks/42");
        assert_eq!(store.take_redirect_after_login().as_deref(), Some("/risks/42"));
        assert_eq!(store.take_redirect_after_login(), None);
    }

    #[test]
    fn test_redirect_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SESSION_FILE);

        SessionStore::load(&path)
            .unwrap()
            .set_redirect_after_login("/controls");

        let reloaded = SessionStore::load(&path).unwrap();
        assert_eq!(reloaded.redirect_after_login().as_deref(), Some("/controls"));
    }

    #[test]
    fn test_path_beside_config() {
        let path = SessionStore::path_beside(Path::new("/home/u/.grcctl/config.yaml"));
        assert_eq!(path, PathBuf::from("/home/u/.grcctl/session.yaml"));
    }

    #[test]
    fn test_location_navigate() {
        let location = Location::default();
        assert_eq!(location.current_path(), "/");
        location.navigate("/login");
        assert_eq!(location.current_path(), "/login");
    }
}
