use serde::{Deserialize, Serialize};

/// Playback modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackMode {
    /// Check if transition from current mode to target mode is valid
    pub fn can_transition_to(&self, target: PlaybackMode) -> bool {
        use PlaybackMode::*;

        matches!(
            (self, target),
            // From Stopped (stop is idempotent)
            (Stopped, Playing) |
            (Stopped, Stopped) |

            // From Playing
            (Playing, Paused) |
            (Playing, Stopped) |

            // From Paused
            (Paused, Playing) |
            (Paused, Stopped)
        )
    }

    /// Get human-readable mode name
    pub fn name(&self) -> &str {
        match self {
            Self::Stopped => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        }
    }
}

impl Default for PlaybackMode {
    fn default() -> Self {
        Self::Stopped
    }
}

/// Snapshot of an engine's playback state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_index: usize,
    pub mode: PlaybackMode,
    pub play_speed_ms: u64,
    pub loop_enabled: bool,
}

impl PlaybackState {
    pub fn new(play_speed_ms: u64, loop_enabled: bool) -> Self {
        Self {
            current_index: 0,
            mode: PlaybackMode::Stopped,
            play_speed_ms,
            loop_enabled,
        }
    }

    /// Apply a mode change, refusing transitions the state machine forbids
    pub fn transition_to(&mut self, target: PlaybackMode) -> bool {
        if !self.mode.can_transition_to(target) {
            log::warn!(
                "Invalid playback transition: {} -> {}",
                self.mode.name(),
                target.name()
            );
            return false;
        }
        self.mode = target;
        true
    }
}
