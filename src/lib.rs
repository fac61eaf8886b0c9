//! OPL render bridge
//!
//! A soft real-time bridge between a periodic, fixed-quantum audio render
//! callback and an asynchronous control channel. A controller pushes music
//! data, register writes and stop requests; the render side drains them once
//! per quantum, drives a tone generator and hands exactly 128 stereo frames to
//! the host every cycle.
//!
//! # Features
//! - Non-blocking command mailbox between controller and render contexts
//! - Blob memory manager that copies music data into generator-owned memory
//! - Sequence (register stream) and patch-table (sound effect) channels
//! - Edge-triggered completion notification for patch-table playback
//! - Legacy ring-buffer mode that plays precomputed sample chunks
//!
//! # Crate feature flags
//! - `export-wav` (default): offline rendering to WAV via `hound` (`export`)
//! - `streaming` (opt-in): real-time output through `rodio` (`streaming`)
//! - `cli` (opt-in): the `opl-bridge` command-line player
//!
//! # Quick start
//! ```no_run
//! use opl_bridge::{generator_session, OfflineHost, SessionConfig};
//!
//! let (controller, session) = generator_session(&SessionConfig::default()).unwrap();
//! let music = std::fs::read("song.imf").unwrap();
//! controller.play_sequence(music).unwrap();
//!
//! // Hand `session` to the audio thread; here we just render one second offline.
//! let mut host = OfflineHost::new(session);
//! let samples = host.render_seconds(1.0, 44_100).unwrap();
//! assert_eq!(samples.len() % 2, 0);
//! ```

#![warn(missing_docs)]

pub mod blob;
pub mod config;
pub mod constants;
pub mod engine;
pub mod host;
pub mod mailbox;
pub mod notifier;
pub mod render;
pub mod sample_queue;
pub mod session;

#[cfg(feature = "export-wav")]
pub mod export;

#[cfg(feature = "streaming")]
pub mod streaming; // Audio Output & Streaming

/// Error types for bridge operations
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// A play command carried no bytes; nothing was allocated
    #[error("Refusing to bind an empty blob")]
    EmptyBlob,

    /// Generator memory could not satisfy a blob allocation
    #[error("Allocation of {requested} bytes failed ({available} bytes available)")]
    AllocationFailed {
        /// Bytes requested
        requested: usize,
        /// Bytes left in generator memory at the time of the request
        available: usize,
    },

    /// A pointer does not name a live region of generator memory
    #[error("Invalid generator memory region")]
    InvalidRegion,

    /// Deallocation size differs from the size recorded at allocation
    #[error("Deallocation size mismatch: allocated {expected} bytes, released {actual}")]
    SizeMismatch {
        /// Size recorded at allocation time
        expected: usize,
        /// Size passed to the deallocation
        actual: usize,
    },

    /// The other end of a mailbox or notification channel is gone
    #[error("Channel disconnected")]
    Disconnected,

    /// IO error from filesystem or device
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Audio device error
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    /// Error writing audio file
    #[error("Audio file write error: {0}")]
    AudioFileError(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for BridgeError {
    /// Converts a String into `BridgeError::Other`.
    ///
    /// Prefer the specific variants where the failure has a category.
    fn from(msg: String) -> Self {
        BridgeError::Other(msg)
    }
}

impl From<&str> for BridgeError {
    /// Converts a string slice into `BridgeError::Other`.
    fn from(msg: &str) -> Self {
        BridgeError::Other(msg.to_string())
    }
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

// Public API exports
pub use blob::{BlobArena, BlobManager, BlobPtr, BlobSlot, GeneratorMemory};
pub use config::SessionConfig;
pub use constants::{BLOCK_LEN, CHANNELS, RENDER_QUANTUM_FRAMES};
pub use engine::{EngineStatus, SampleBlock, SequencerEngine, SoundChip, SquareChip, ToneEngine};
pub use host::OfflineHost;
pub use mailbox::{mailbox, Command, MailboxReceiver, MailboxSender, StreamMessage};
pub use notifier::{CompletionNotifier, Notification};
pub use render::{GeneratorSession, RenderProcessor, RingBufferSession};
pub use sample_queue::SampleQueue;
pub use session::{
    generator_session, generator_session_with_engine, ring_buffer_session, Controller,
    StreamController,
};

#[cfg(feature = "export-wav")]
pub use export::wav::export_wav;

#[cfg(feature = "streaming")]
pub use streaming::{AudioDevice, StreamConfig};
