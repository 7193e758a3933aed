//! Playback status

use serde::{Deserialize, Serialize};

/// Playback status reported by the decoder
///
/// Variants are ordered: everything strictly between [`Stopped`] and
/// [`Completed`] is a state in which the decoder must be advanced each frame.
///
/// [`Stopped`]: PlaybackState::Stopped
/// [`Completed`]: PlaybackState::Completed
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(i8)]
pub enum PlaybackState {
    /// Stopped with error; also reported when nothing is loaded
    Error = -1,
    Stopped = 0,
    Paused = 1,
    Started = 2,
    HeaderProcessing = 3,
    /// Playing, timer running
    Timer = 4,
    Completed = 5,
}

impl PlaybackState {
    /// True while the decoder needs a tick every frame
    pub fn is_progressing(self) -> bool {
        self > PlaybackState::Stopped && self < PlaybackState::Completed
    }

    /// Numeric status code
    pub fn code(self) -> i8 {
        self as i8
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Error => write!(f, "error"),
            PlaybackState::Stopped => write!(f, "stopped"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Started => write!(f, "started"),
            PlaybackState::HeaderProcessing => write!(f, "header_processing"),
            PlaybackState::Timer => write!(f, "timer"),
            PlaybackState::Completed => write!(f, "completed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progressing_window() {
        assert!(!PlaybackState::Error.is_progressing());
        assert!(!PlaybackState::Stopped.is_progressing());
        assert!(PlaybackState::Paused.is_progressing());
        assert!(PlaybackState::Started.is_progressing());
        assert!(PlaybackState::HeaderProcessing.is_progressing());
        assert!(PlaybackState::Timer.is_progressing());
        assert!(!PlaybackState::Completed.is_progressing());
    }

    #[test]
    fn test_codes() {
        assert_eq!(PlaybackState::Error.code(), -1);
        assert_eq!(PlaybackState::Timer.code(), 4);
        assert_eq!(PlaybackState::Completed.code(), 5);
    }
}
