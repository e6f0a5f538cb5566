// ── Persisted controller settings ──
//
// One small record under a fixed key, read at start-up and rewritten
// whenever the port changes. The binary stores it on disk; tests and
// one-shot runs keep it in memory.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Key the controller record is stored under.
pub const CONTROLLER_SETTINGS_KEY: &str = "zwave:controller";

/// The persisted controller record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Serial port of the controller stick, e.g. `/dev/ttyACM0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

/// Key-value persistence for controller settings.
pub trait SettingsStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<ControllerSettings>, CoreError>;
    fn save(&self, key: &str, settings: &ControllerSettings) -> Result<(), CoreError>;
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettings {
    entries: Mutex<HashMap<String, ControllerSettings>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the controller record already set to `port`.
    pub fn with_port(port: impl Into<String>) -> Self {
        let store = Self::new();
        store.entries().insert(
            CONTROLLER_SETTINGS_KEY.to_owned(),
            ControllerSettings {
                port: Some(port.into()),
            },
        );
        store
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, ControllerSettings>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SettingsStore for MemorySettings {
    fn load(&self, key: &str) -> Result<Option<ControllerSettings>, CoreError> {
        Ok(self.entries().get(key).cloned())
    }

    fn save(&self, key: &str, settings: &ControllerSettings) -> Result<(), CoreError> {
        self.entries().insert(key.to_owned(), settings.clone());
        Ok(())
    }
}
