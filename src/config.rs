//! User configuration
//!
//! Persisted as `config.yaml` in the platform config directory. Every field
//! has a default, so a partial or missing file still loads; a malformed one
//! falls back to defaults with a warning. `navigable_classes` is stored by
//! class name and converted against the canonical table on load; unknown
//! names are dropped.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::classes::{class_name, default_navigable_classes};
use crate::colour::ColourEffect;

const APP_NAME: &str = "railview";
const CONFIG_FILENAME: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Zoom level at which rail mode activates.
    pub rail_zoom_threshold: f64,
    /// Duration of snap animations in milliseconds.
    pub snap_duration_ms: f64,
    /// Horizontal scroll speed at the start of a hold (points per second).
    pub scroll_speed_start: f64,
    /// Maximum horizontal scroll speed (points per second).
    pub scroll_speed_max: f64,
    /// Seconds to ramp from start speed to max.
    pub scroll_ramp_time: f64,
    /// Future pages to pre-analyze (0 disables lookahead).
    pub analysis_lookahead_pages: usize,
    /// Colour effect applied to page content.
    pub colour_effect: ColourEffect,
    /// Strength of the colour effect, 0.0 to 1.0.
    pub colour_effect_intensity: f64,
    /// Block classes navigable in rail mode.
    #[serde(
        serialize_with = "serialize_navigable_classes",
        deserialize_with = "deserialize_navigable_classes"
    )]
    pub navigable_classes: HashSet<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rail_zoom_threshold: 3.0,
            snap_duration_ms: 300.0,
            scroll_speed_start: 10.0,
            scroll_speed_max: 50.0,
            scroll_ramp_time: 1.5,
            analysis_lookahead_pages: 2,
            colour_effect: ColourEffect::None,
            colour_effect_intensity: 1.0,
            navigable_classes: default_navigable_classes(),
        }
    }
}

fn serialize_navigable_classes<S: serde::Serializer>(
    classes: &HashSet<usize>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut names: Vec<&str> = classes.iter().filter_map(|&id| class_name(id)).collect();
    names.sort_unstable();
    names.serialize(serializer)
}

fn deserialize_navigable_classes<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<HashSet<usize>, D::Error> {
    let names: Vec<String> = Vec::deserialize(deserializer)?;
    Ok(crate::classes::class_ids_by_name(names.iter().map(String::as_str)))
}

impl Config {
    /// Load from the config directory, or fall back to defaults. A missing
    /// file writes the defaults so users have something to edit.
    #[must_use]
    pub fn load() -> Self {
        let path = config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {e}, using defaults", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No config at {}, writing defaults", path.display());
                let config = Self::default();
                config.save();
                config
            }
        }
    }

    pub fn save(&self) {
        let path = config_path();
        match serde_yaml::to_string(self) {
            Ok(yaml) => {
                if let Err(e) = std::fs::write(&path, yaml) {
                    log::warn!("Failed to write config to {}: {e}", path.display());
                }
            }
            Err(e) => log::warn!("Failed to serialize config: {e}"),
        }
    }
}

fn config_path() -> PathBuf {
    let dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).ok();
    }
    dir.join(CONFIG_FILENAME)
}
