//! Run control models.
//!
//! Playback state shared by the engine and the controller: whether the run
//! is playing, paused or stopped, whether it advances one leaf at a time,
//! and how long to wait between steps.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use ts_rs::TS;

/// Global playback status of a session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybackStatus {
    /// Actions execute as soon as they are reached.
    #[default]
    Playing,

    /// The next pause gate suspends until an operator command arrives.
    Paused,

    /// The run is being aborted.
    Stopped,
}

/// How a session advances through the action tree.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    #[default]
    Normal,

    /// Pause automatically after every successful leaf action.
    StepByStep,
}

/// Playback speed, expressed as the delay between consecutive steps.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestSpeed {
    /// 2000 ms between steps.
    Slow,

    /// 1000 ms between steps.
    #[default]
    Normal,

    /// 200 ms between steps.
    Fast,
}

impl TestSpeed {
    /// Delay between steps in milliseconds.
    pub fn millis(self) -> u64 {
        match self {
            Self::Slow => 2000,
            Self::Normal => 1000,
            Self::Fast => 200,
        }
    }

    pub fn step_delay(self) -> Duration {
        Duration::from_millis(self.millis())
    }
}

/// Keyboard keys understood by the `PressKey` action.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, TS)]
pub enum Key {
    Escape,
    Enter,
    Tab,
    ArrowDown,
    ArrowUp,
    ArrowLeft,
    ArrowRight,
    Backspace,
    Delete,
    Shift,
    Control,
    Alt,
    Meta,
}

impl Key {
    /// DOM `keyCode` sent along with the synthetic keyboard events.
    pub fn code(self) -> u32 {
        match self {
            Self::Escape => 27,
            Self::Enter => 13,
            Self::Tab => 9,
            Self::ArrowDown => 40,
            Self::ArrowUp => 38,
            Self::ArrowLeft => 37,
            Self::ArrowRight => 39,
            Self::Backspace => 8,
            Self::Delete => 46,
            Self::Shift => 16,
            Self::Control => 17,
            Self::Alt => 18,
            Self::Meta => 91,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Escape => "Escape",
            Self::Enter => "Enter",
            Self::Tab => "Tab",
            Self::ArrowDown => "ArrowDown",
            Self::ArrowUp => "ArrowUp",
            Self::ArrowLeft => "ArrowLeft",
            Self::ArrowRight => "ArrowRight",
            Self::Backspace => "Backspace",
            Self::Delete => "Delete",
            Self::Shift => "Shift",
            Self::Control => "Control",
            Self::Alt => "Alt",
            Self::Meta => "Meta",
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
