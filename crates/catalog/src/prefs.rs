//! Per-user view preferences: search radius, map style and text filter.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PrefsError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// 0 searches the current view.
    pub radius_miles: f64,
    pub style: Option<String>,
    pub what: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            radius_miles: 0.0,
            style: None,
            what: String::new(),
        }
    }
}

pub trait PreferencesStore {
    fn load(&self) -> Result<Preferences, PrefsError>;
    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryPreferencesStore {
    stored: Option<Preferences>,
}

impl PreferencesStore for InMemoryPreferencesStore {
    fn load(&self) -> Result<Preferences, PrefsError> {
        Ok(self.stored.clone().unwrap_or_default())
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError> {
        self.stored = Some(prefs.clone());
        Ok(())
    }
}

/// Preferences kept as a JSON document on disk. A missing file reads as
/// defaults.
#[derive(Debug, Clone)]
pub struct JsonFilePreferencesStore {
    path: PathBuf,
}

impl JsonFilePreferencesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferencesStore for JsonFilePreferencesStore {
    fn load(&self) -> Result<Preferences, PrefsError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no preferences file, using defaults");
                return Ok(Preferences::default());
            }
            Err(e) => return Err(PrefsError::Io(e.to_string())),
        };
        serde_json::from_slice(&bytes).map_err(|e| PrefsError::Corrupt(e.to_string()))
    }

    fn save(&mut self, prefs: &Preferences) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PrefsError::Io(e.to_string()))?;
        }
        let json =
            serde_json::to_vec_pretty(prefs).map_err(|e| PrefsError::Corrupt(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| PrefsError::Io(e.to_string()))
    }
}
