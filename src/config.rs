use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::plugins::portal::transfer::TransferSettings;

pub const DEFAULT_CONFIG_PATH: &str = "portal_config.json";
pub const CONFIG_PATH_VAR: &str = "PORTAL_CONFIG";

/// Bounds of every configured interval, in seconds.
const MIN_INTERVAL_SECS: f32 = 0.001;
const MAX_INTERVAL_SECS: f32 = 3600.;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Resource)]
#[serde(default)]
pub struct PortalConfig {
    pub transfer: TransferConfig,
    pub markers: MarkerConfig,
    pub spawner: SpawnerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub match_exit_rotation: bool,
    pub fast_exit_speed: f32,
    pub exit_debounce_secs: f32,
    pub capture_timeout_secs: f32,
    pub contact_ray_length: f32,
    pub stuck_nudge_speed: f32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        let settings = TransferSettings::default();
        TransferConfig {
            match_exit_rotation: settings.match_exit_rotation,
            fast_exit_speed: settings.fast_exit_speed,
            exit_debounce_secs: settings.exit_debounce.as_secs_f32(),
            capture_timeout_secs: settings.capture_timeout.as_secs_f32(),
            contact_ray_length: settings.contact_ray_length,
            stuck_nudge_speed: settings.stuck_nudge_speed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub enabled: bool,
    pub limit: usize,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        MarkerConfig {
            enabled: false,
            limit: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    pub spawn_limit: usize,
    pub creation_cooldown_secs: f32,
    pub launch_speed: f32,
    pub max_distance: f32,
    pub distance_check_secs: f32,
    /// Place props where the viewer stands when no surface is in sight.
    pub allow_midair: bool,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        SpawnerConfig {
            spawn_limit: 10,
            creation_cooldown_secs: 1.,
            launch_speed: 3.,
            max_distance: 5.,
            distance_check_secs: 5.,
            allow_midair: false,
        }
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0. {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("expected a finite, non negative number, got {}", value),
        })
    }
}

fn interval(field: &'static str, secs: f32, allow_zero: bool) -> Result<(), ConfigError> {
    non_negative(field, secs)?;
    if allow_zero && secs == 0. {
        return Ok(());
    }
    if (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&secs) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!(
                "expected between {} and {} seconds, got {}",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, secs
            ),
        })
    }
}

/// Never panics, out of range values are clamped.
fn to_duration(secs: f32, allow_zero: bool) -> Duration {
    let min = if allow_zero { 0. } else { MIN_INTERVAL_SECS };
    let secs = if secs.is_nan() { min } else { secs.clamp(min, MAX_INTERVAL_SECS) };
    Duration::try_from_secs_f32(secs).unwrap_or(Duration::from_secs(MAX_INTERVAL_SECS as u64))
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    non_negative(field, value)?;
    if value > 0. {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        })
    }
}

impl SpawnerConfig {
    pub fn creation_cooldown(&self) -> Duration {
        to_duration(self.creation_cooldown_secs, true)
    }

    pub fn distance_check_interval(&self) -> Duration {
        to_duration(self.distance_check_secs, false)
    }
}

impl PortalConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: PortalConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Falls back to defaults if the file is missing or unusable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                PortalConfig::default()
            }
            Err(err) => {
                warn!("Ignoring configuration: {}", err);
                PortalConfig::default()
            }
        }
    }

    pub fn path_from_env() -> PathBuf {
        std::env::var_os(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let transfer = &self.transfer;
        non_negative("transfer.fast_exit_speed", transfer.fast_exit_speed)?;
        interval("transfer.exit_debounce_secs", transfer.exit_debounce_secs, false)?;
        interval("transfer.capture_timeout_secs", transfer.capture_timeout_secs, false)?;
        positive("transfer.contact_ray_length", transfer.contact_ray_length)?;
        non_negative("transfer.stuck_nudge_speed", transfer.stuck_nudge_speed)?;

        let spawner = &self.spawner;
        interval("spawner.creation_cooldown_secs", spawner.creation_cooldown_secs, true)?;
        non_negative("spawner.launch_speed", spawner.launch_speed)?;
        positive("spawner.max_distance", spawner.max_distance)?;
        interval("spawner.distance_check_secs", spawner.distance_check_secs, false)?;
        Ok(())
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        let transfer = &self.transfer;
        TransferSettings {
            match_exit_rotation: transfer.match_exit_rotation,
            fast_exit_speed: transfer.fast_exit_speed,
            exit_debounce: to_duration(transfer.exit_debounce_secs, false),
            capture_timeout: to_duration(transfer.capture_timeout_secs, false),
            contact_ray_length: transfer.contact_ray_length,
            stuck_nudge_speed: transfer.stuck_nudge_speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = PortalConfig::from_json("{}").unwrap();
        assert_eq!(config, PortalConfig::default());
        assert_eq!(config.transfer_settings(), TransferSettings::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PortalConfig::from_json(
            r#"{
                "transfer": { "match_exit_rotation": false, "exit_debounce_secs": 0.25 },
                "markers": { "enabled": true }
            }"#,
        )
        .unwrap();

        let settings = config.transfer_settings();
        assert!(!settings.match_exit_rotation);
        assert_eq!(settings.exit_debounce, Duration::from_millis(250));
        assert_eq!(settings.fast_exit_speed, 1.3);
        assert!(config.markers.enabled);
        assert_eq!(config.markers.limit, 8);
        assert_eq!(config.spawner, SpawnerConfig::default());
    }

    #[test]
    fn negative_duration_is_rejected() {
        let err = PortalConfig::from_json(r#"{ "transfer": { "capture_timeout_secs": -1 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "transfer.capture_timeout_secs",
                ..
            }
        ));
    }

    #[test]
    fn zero_debounce_is_rejected() {
        let err = PortalConfig::from_json(r#"{ "transfer": { "exit_debounce_secs": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn huge_duration_is_rejected() {
        let err = PortalConfig::from_json(r#"{ "transfer": { "capture_timeout_secs": 1e30 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "transfer.capture_timeout_secs",
                ..
            }
        ));
    }

    #[test]
    fn vanishing_interval_is_rejected() {
        let err = PortalConfig::from_json(r#"{ "spawner": { "distance_check_secs": 1e-30 } }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "spawner.distance_check_secs",
                ..
            }
        ));
    }

    #[test]
    fn zero_cooldown_is_accepted() {
        let config =
            PortalConfig::from_json(r#"{ "spawner": { "creation_cooldown_secs": 0 } }"#).unwrap();
        assert_eq!(config.spawner.creation_cooldown(), Duration::ZERO);
    }

    #[test]
    fn unvalidated_durations_are_clamped() {
        let mut config = PortalConfig::default();
        config.transfer.capture_timeout_secs = 1e30;
        config.transfer.exit_debounce_secs = f32::NAN;
        config.spawner.distance_check_secs = 1e-30;

        let settings = config.transfer_settings();
        assert_eq!(settings.capture_timeout, Duration::from_secs(3600));
        assert_eq!(settings.exit_debounce, Duration::from_millis(1));
        assert!(config.spawner.distance_check_interval() > Duration::ZERO);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = PortalConfig::from_json(r#"{ "transfer": "#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = Path::new("definitely/not/here/portal_config.json");
        assert!(matches!(
            PortalConfig::load(path),
            Err(ConfigError::Io { .. })
        ));
        assert_eq!(PortalConfig::load_or_default(path), PortalConfig::default());
    }
}
