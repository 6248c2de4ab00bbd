use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport state as reported by an external player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayState {
    #[default]
    Unknown,
    Playing,
    Paused,
    Stopped,
}

impl PlayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::Stopped => "Stopped",
        }
    }

    /// Map a player state keyword. Anything unrecognized is `Unknown`.
    pub fn from_keyword(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "playing" | "play" => Self::Playing,
            "paused" | "pause" => Self::Paused,
            "stopped" | "stop" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

impl std::fmt::Display for PlayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized playback snapshot. Only the latest one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub position: Duration,
    pub player_reported_duration: Option<Duration>,
    pub current_file_index: usize,
    pub current_media_index: usize,
    pub play_state: PlayState,
}

impl PlaybackState {
    /// Initial state for a session starting at `file_index`.
    pub fn starting_at(file_index: usize, media_index: usize) -> Self {
        Self {
            current_file_index: file_index,
            current_media_index: media_index,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_keyword() {
        assert_eq!(PlayState::from_keyword("Playing"), PlayState::Playing);
        assert_eq!(PlayState::from_keyword(" paused "), PlayState::Paused);
        assert_eq!(PlayState::from_keyword("Stop"), PlayState::Stopped);
        assert_eq!(PlayState::from_keyword("Buffering"), PlayState::Unknown);
        assert_eq!(PlayState::from_keyword(""), PlayState::Unknown);
    }
}
