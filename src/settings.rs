use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// The fixed set of persisted booleans the app reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    /// Allow the daemon to actively drain toward the target while on AC.
    ForceDischargeIfNeeded,
    /// Allow the anonymous app-open ping.
    TelemetryAllowed,
}

/// Injected settings capability. The core only reads these values; the
/// settings UI collaborator writes them and calls back into the limiter to
/// apply a change.
pub trait SettingsStore {
    fn get(&self, key: SettingKey) -> bool;
    fn set(&mut self, key: SettingKey, value: bool);
}

#[derive(Debug, Deserialize, Serialize)]
struct SettingsFile {
    #[serde(default)]
    force_discharge_if_needed: bool,
    #[serde(default = "default_true")]
    telemetry_allowed: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            force_discharge_if_needed: false,
            telemetry_allowed: true,
        }
    }
}

/// TOML-backed settings store.
pub struct TomlSettings {
    path: Option<PathBuf>,
    values: SettingsFile,
}

impl TomlSettings {
    /// Load the settings file.
    /// Search order:
    ///   1. BATTERY_TRAY_SETTINGS env var
    ///   2. ~/.battery/tray.toml
    /// Defaults when no file is found.
    pub fn load() -> Self {
        let path = std::env::var("BATTERY_TRAY_SETTINGS")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".battery/tray.toml")));

        match path {
            Some(path) => Self::load_from(path),
            None => {
                warn!("no home directory, settings will not persist");
                Self {
                    path: None,
                    values: SettingsFile::default(),
                }
            }
        }
    }

    /// Load from an explicit path; a missing or unparsable file falls back
    /// to defaults but keeps the path as the save target.
    pub fn load_from(path: PathBuf) -> Self {
        let values = match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<SettingsFile>(&content) {
                Ok(values) => {
                    info!(path = %path.display(), "loaded settings");
                    values
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse settings");
                    SettingsFile::default()
                }
            },
            Err(_) => SettingsFile::default(),
        };
        Self {
            path: Some(path),
            values,
        }
    }

    fn save(&self) {
        let Some(path) = &self.path else { return };
        if let Some(dir) = path.parent() {
            let _ = fs::create_dir_all(dir);
        }
        match toml::to_string_pretty(&self.values) {
            Ok(content) => {
                if let Err(e) = fs::write(path, content) {
                    warn!(path = %path.display(), error = %e, "failed to write settings");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize settings"),
        }
    }
}

impl SettingsStore for TomlSettings {
    fn get(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::ForceDischargeIfNeeded => self.values.force_discharge_if_needed,
            SettingKey::TelemetryAllowed => self.values.telemetry_allowed,
        }
    }

    fn set(&mut self, key: SettingKey, value: bool) {
        match key {
            SettingKey::ForceDischargeIfNeeded => {
                self.values.force_discharge_if_needed = value;
            }
            SettingKey::TelemetryAllowed => {
                self.values.telemetry_allowed = value;
            }
        }
        self.save();
    }
}

/// In-memory store for tests and collaborators that inject their own state.
pub struct MemSettings {
    force_discharge_if_needed: bool,
    telemetry_allowed: bool,
}

impl Default for MemSettings {
    fn default() -> Self {
        Self {
            force_discharge_if_needed: false,
            telemetry_allowed: true,
        }
    }
}

impl SettingsStore for MemSettings {
    fn get(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::ForceDischargeIfNeeded => self.force_discharge_if_needed,
            SettingKey::TelemetryAllowed => self.telemetry_allowed,
        }
    }

    fn set(&mut self, key: SettingKey, value: bool) {
        match key {
            SettingKey::ForceDischargeIfNeeded => self.force_discharge_if_needed = value,
            SettingKey::TelemetryAllowed => self.telemetry_allowed = value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlSettings::load_from(dir.path().join("tray.toml"));
        assert!(!store.get(SettingKey::ForceDischargeIfNeeded));
        assert!(store.get(SettingKey::TelemetryAllowed));
    }

    #[test]
    fn test_set_persists_across_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tray.toml");

        let mut store = TomlSettings::load_from(path.clone());
        store.set(SettingKey::ForceDischargeIfNeeded, true);
        store.set(SettingKey::TelemetryAllowed, false);

        let reloaded = TomlSettings::load_from(path);
        assert!(reloaded.get(SettingKey::ForceDischargeIfNeeded));
        assert!(!reloaded.get(SettingKey::TelemetryAllowed));
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tray.toml");
        fs::write(&path, "force_discharge_if_needed = \"not a bool\"").unwrap();

        let store = TomlSettings::load_from(path);
        assert!(!store.get(SettingKey::ForceDischargeIfNeeded));
        assert!(store.get(SettingKey::TelemetryAllowed));
    }

    #[test]
    fn test_mem_settings_round_trip() {
        let mut store = MemSettings::default();
        assert!(store.get(SettingKey::TelemetryAllowed));
        store.set(SettingKey::ForceDischargeIfNeeded, true);
        assert!(store.get(SettingKey::ForceDischargeIfNeeded));
    }
}
