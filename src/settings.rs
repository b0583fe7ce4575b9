//! Persistent settings for the people graph app.

use crate::classify::ClassifierConfig;
use crate::graph::interaction::ClickConfig;
use crate::graph::layout::ForceLayout;
use crate::graph::search::NavigatorConfig;
use crate::graph::types::GraphState;
use crate::graph::viewport::ViewportConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// All persistable settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Contacts export to load on startup
    pub data_path: Option<PathBuf>,

    // Engine tuning
    pub physics: ForceLayout,
    pub viewport: ViewportConfig,
    pub search: NavigatorConfig,
    pub interaction: ClickConfig,
    pub classifier: ClassifierConfig,

    /// View state restored on the next launch
    pub graph_state: GraphState,
}

impl Settings {
    /// Get the path to the settings file
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("people-graph");
            p.push("settings.json");
            p
        })
    }

    /// Load settings from disk, returning defaults if file doesn't exist or is invalid
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("Could not determine config directory, using defaults");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    tracing::info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    tracing::warn!("Failed to parse settings file: {}, using defaults", e);
                    Self::default()
                }
            },
            // File doesn't exist yet, that's fine
            Err(_) => Self::default(),
        }
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::config_path() else {
            tracing::warn!("Could not determine config directory, settings not saved");
            return;
        };
        if let Err(e) = self.save_to(&path) {
            tracing::warn!("{}", e);
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;
        std::fs::write(path, json).map_err(|e| format!("Failed to write settings file: {}", e))?;
        tracing::debug!("Saved settings to {:?}", path);
        Ok(())
    }
}
