//! Show configuration, persisted as JSON next to the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "airtime_config.json";

/// Pacing knobs for the broadcast loop and state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowTuning {
    /// Length of the scripted show-open stinger.
    #[serde(default = "default_show_start_secs")]
    pub show_start_secs: f64,
    /// Length of the intro theme.
    #[serde(default = "default_intro_music_secs")]
    pub intro_music_secs: f64,
    /// Length of the return-from-break bumper.
    #[serde(default = "default_bumper_secs")]
    pub bumper_secs: f64,
    /// Dump-delay pause after a caller curses on air.
    #[serde(default = "default_cursing_delay_secs")]
    pub cursing_delay_secs: f64,
    /// Floor for any emitted wait unit.
    #[serde(default = "default_min_wait_secs")]
    pub min_wait_secs: f64,
    /// Longest single wait while holding for a scheduled break.
    #[serde(default = "default_max_break_wait_secs")]
    pub max_break_wait_secs: f64,
    /// Longest single wait while holding for the show's end.
    #[serde(default = "default_max_show_end_wait_secs")]
    pub max_show_end_wait_secs: f64,
    /// Driver sleep when the machine momentarily has nothing to emit.
    #[serde(default = "default_retry_idle_millis")]
    pub retry_idle_millis: u64,
}

fn default_show_start_secs() -> f64 {
    1.5
}
fn default_intro_music_secs() -> f64 {
    8.0
}
fn default_bumper_secs() -> f64 {
    4.0
}
fn default_cursing_delay_secs() -> f64 {
    1.5
}
fn default_min_wait_secs() -> f64 {
    0.1
}
fn default_max_break_wait_secs() -> f64 {
    20.0
}
fn default_max_show_end_wait_secs() -> f64 {
    30.0
}
fn default_retry_idle_millis() -> u64 {
    200
}

impl Default for ShowTuning {
    fn default() -> Self {
        ShowTuning {
            show_start_secs: default_show_start_secs(),
            intro_music_secs: default_intro_music_secs(),
            bumper_secs: default_bumper_secs(),
            cursing_delay_secs: default_cursing_delay_secs(),
            min_wait_secs: default_min_wait_secs(),
            max_break_wait_secs: default_max_break_wait_secs(),
            max_show_end_wait_secs: default_max_show_end_wait_secs(),
            retry_idle_millis: default_retry_idle_millis(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowConfig {
    /// Scheduled show length in seconds.
    #[serde(default = "default_show_duration_secs")]
    pub show_duration_secs: f64,
    /// Ad spots per break.
    #[serde(default = "default_ad_slots_per_break")]
    pub ad_slots_per_break: usize,
    /// Grace period a unit may run past its scheduled content duration
    /// before it is abandoned. The effective ceiling per unit is
    /// `duration_secs * time_scale + unit_timeout_secs`, not a flat
    /// limit, so long content is never cut off just for being long.
    #[serde(default = "default_unit_timeout_secs")]
    pub unit_timeout_secs: f64,
    /// Multiplier applied to content durations when running. 1.0 is
    /// real time; smaller values speed the simulation up.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,
    #[serde(default)]
    pub tuning: ShowTuning,
    /// Optional path to a dialogue bank JSON; the built-in bank is used
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialogue_bank: Option<PathBuf>,
}

fn default_show_duration_secs() -> f64 {
    600.0
}
fn default_ad_slots_per_break() -> usize {
    3
}
fn default_unit_timeout_secs() -> f64 {
    30.0
}
fn default_time_scale() -> f64 {
    1.0
}

impl Default for ShowConfig {
    fn default() -> Self {
        ShowConfig {
            show_duration_secs: default_show_duration_secs(),
            ad_slots_per_break: default_ad_slots_per_break(),
            unit_timeout_secs: default_unit_timeout_secs(),
            time_scale: default_time_scale(),
            tuning: ShowTuning::default(),
            dialogue_bank: None,
        }
    }
}

impl ShowConfig {
    /// Load from `path`, falling back to defaults when the file is
    /// missing or corrupt (a bad config should never stop the station).
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("[Config] Corrupt config '{}', using defaults: {}", path.display(), e);
                    ShowConfig::default()
                }
            },
            Err(_) => ShowConfig::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Serialize error: {}", e))?;
        fs::write(path, json)
            .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))
    }

    /// Clamp every field into its workable range.
    pub fn sanitized(mut self) -> Self {
        self.show_duration_secs = self.show_duration_secs.max(10.0);
        self.ad_slots_per_break = self.ad_slots_per_break.max(1);
        self.unit_timeout_secs = self.unit_timeout_secs.max(0.25);
        self.time_scale = self.time_scale.clamp(0.0, 10.0);
        self.tuning.min_wait_secs = self.tuning.min_wait_secs.max(0.01);
        self.tuning.max_break_wait_secs = self
            .tuning
            .max_break_wait_secs
            .max(self.tuning.min_wait_secs);
        self.tuning.max_show_end_wait_secs = self
            .tuning
            .max_show_end_wait_secs
            .max(self.tuning.min_wait_secs);
        self.tuning.retry_idle_millis = self.tuning.retry_idle_millis.clamp(10, 5000);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_sane() {
        let config = ShowConfig::default();
        assert_eq!(config.show_duration_secs, 600.0);
        assert_eq!(config.ad_slots_per_break, 3);
        assert_eq!(config.unit_timeout_secs, 30.0);
        assert_eq!(config.time_scale, 1.0);
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = ShowConfig::default();
        config.show_duration_secs = 120.0;
        config.tuning.bumper_secs = 2.0;
        config.save(&path).unwrap();
        let loaded = ShowConfig::load(&path);
        assert_eq!(loaded.show_duration_secs, 120.0);
        assert_eq!(loaded.tuning.bumper_secs, 2.0);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ShowConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config.show_duration_secs, 600.0);
    }

    #[test]
    fn corrupt_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "{not json").unwrap();
        let config = ShowConfig::load(&path);
        assert_eq!(config.ad_slots_per_break, 3);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ShowConfig = serde_json::from_str(r#"{"show_duration_secs": 90}"#).unwrap();
        assert_eq!(config.show_duration_secs, 90.0);
        assert_eq!(config.unit_timeout_secs, 30.0);
        assert_eq!(config.tuning.intro_music_secs, 8.0);
    }

    #[test]
    fn sanitize_clamps_extremes() {
        let mut config = ShowConfig::default();
        config.show_duration_secs = 1.0;
        config.ad_slots_per_break = 0;
        config.unit_timeout_secs = 0.0;
        config.time_scale = -3.0;
        config.tuning.retry_idle_millis = 0;
        let clean = config.sanitized();
        assert_eq!(clean.show_duration_secs, 10.0);
        assert_eq!(clean.ad_slots_per_break, 1);
        assert_eq!(clean.unit_timeout_secs, 0.25);
        assert_eq!(clean.time_scale, 0.0);
        assert_eq!(clean.tuning.retry_idle_millis, 10);
    }
}
