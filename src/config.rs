use crate::error::{Result, RundownError};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct RundownConfig {
    /// Guard window before an auto-next during which a manual take is rejected
    pub autonext_guard_ms: u64,
    /// Fixed wait for a device gateway reply before the command record is discarded
    pub device_command_timeout_ms: u64,
    /// Capacity of the committed-change broadcast channel
    pub event_channel_capacity: usize,
    /// When no playout gateway is attached, the engine reports started
    /// playback itself after a take
    pub self_reporting_playback: bool,
    pub custom_settings: HashMap<String, String>,
}

impl Default for RundownConfig {
    fn default() -> Self {
        Self {
            autonext_guard_ms: 1000,
            device_command_timeout_ms: 3000,
            event_channel_capacity: crate::constants::EVENT_CHANNEL_CAPACITY,
            self_reporting_playback: true,
            custom_settings: HashMap::new(),
        }
    }
}

impl RundownConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(guard) = std::env::var("RUNDOWN_AUTONEXT_GUARD_MS") {
            config.autonext_guard_ms = guard.parse().map_err(|e| {
                RundownError::Configuration(format!("Invalid autonext_guard_ms: {e}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("RUNDOWN_DEVICE_COMMAND_TIMEOUT_MS") {
            config.device_command_timeout_ms = timeout.parse().map_err(|e| {
                RundownError::Configuration(format!("Invalid device_command_timeout_ms: {e}"))
            })?;
        }

        if let Ok(self_report) = std::env::var("RUNDOWN_SELF_REPORTING_PLAYBACK") {
            config.self_reporting_playback = self_report.parse().map_err(|e| {
                RundownError::Configuration(format!("Invalid self_reporting_playback: {e}"))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RundownConfig::default();
        assert_eq!(config.autonext_guard_ms, 1000);
        assert_eq!(config.device_command_timeout_ms, 3000);
        assert!(config.self_reporting_playback);
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("RUNDOWN_AUTONEXT_GUARD_MS", "2500");
        let config = RundownConfig::from_env().unwrap();
        assert_eq!(config.autonext_guard_ms, 2500);
        std::env::remove_var("RUNDOWN_AUTONEXT_GUARD_MS");

        std::env::set_var("RUNDOWN_DEVICE_COMMAND_TIMEOUT_MS", "not-a-number");
        assert!(RundownConfig::from_env().is_err());
        std::env::remove_var("RUNDOWN_DEVICE_COMMAND_TIMEOUT_MS");
    }
}
