//! Patch-table completion detection
//!
//! The generator exposes a level (`is_patch_table_playing`), the controller
//! wants an event. [`CompletionNotifier`] turns the level sampled once per
//! quantum into one notification per falling edge.

use serde::{Deserialize, Serialize};

/// Message posted from the render context back to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    /// The sound effect started by the last `play_patch_table` has ended
    PatchTableFinished,
}

impl Notification {
    /// Wire literal of the notification
    pub fn as_str(&self) -> &'static str {
        match self {
            Notification::PatchTableFinished => "patch_table_finished",
        }
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Falling-edge detector over the patch-table playing flag
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionNotifier {
    previous: bool,
}

impl CompletionNotifier {
    /// Create a detector whose previous state is "not playing"
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this quantum's flag; returns `true` when it just dropped
    pub fn observe(&mut self, playing: bool) -> bool {
        let fired = self.previous && !playing;
        self.previous = playing;
        fired
    }

    /// Flag observed at the last quantum
    pub fn was_playing(&self) -> bool {
        self.previous
    }
}
