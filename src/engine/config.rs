use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Engine tuning, loadable from a (partial) JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between interactive steps, after the draw ack
    pub play_speed_ms: u64,
    /// Poll interval shared by the draw and capture ack waits
    pub ack_poll_interval_ms: u64,
    /// Pause before a loop or camera pass restarts at the first timepoint
    pub loop_settle_ms: u64,
    pub loop_enabled: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            play_speed_ms: 100,
            ack_poll_interval_ms: 5,
            loop_settle_ms: 500,
            loop_enabled: false,
        }
    }
}

impl PlaybackConfig {
    pub fn from_json(config: Value) -> Result<Self> {
        let parsed: Self = serde_json::from_value(config)
            .map_err(|e| anyhow!("Invalid playback config: {}", e))?;
        if parsed.ack_poll_interval_ms == 0 {
            return Err(anyhow!("ack_poll_interval_ms must be positive"));
        }
        Ok(parsed)
    }

    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    pub fn loop_settle(&self) -> Duration {
        Duration::from_millis(self.loop_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = PlaybackConfig::from_json(json!({"play_speed_ms": 20})).unwrap();
        assert_eq!(config.play_speed_ms, 20);
        assert_eq!(config.ack_poll_interval_ms, 5);
        assert!(!config.loop_enabled);
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        assert!(PlaybackConfig::from_json(json!({"ack_poll_interval_ms": 0})).is_err());
    }
}
