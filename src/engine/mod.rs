//! Tone generator domain
//!
//! The render session drives a tone generator only through the [`ToneEngine`]
//! contract: bind blobs, write registers, stop the sequence, query the
//! patch-table state and pull one fixed-size block per quantum.
//!
//! Implementation:
//! - `sequencer` - register-stream sequencer and sound-effect player over a [`SoundChip`]
//! - `chip` - chip backend trait and a square-wave approximation of the OPL2 voices
//! - `patch` - patch-table header and instrument layout

pub mod chip;
pub mod patch;
pub mod sequencer;

use crate::blob::{BlobPtr, GeneratorMemory};
use crate::config::SessionConfig;
use crate::constants::BLOCK_LEN;
use bitflags::bitflags;

// Re-export public API
pub use chip::{SoundChip, SquareChip};
pub use patch::{Instrument, PatchHeader};
pub use sequencer::SequencerEngine;

/// One render quantum of interleaved stereo samples (`[l0, r0, l1, r1, ..]`)
pub type SampleBlock = [f32; BLOCK_LEN];

bitflags! {
    /// Playback state of the generator channels
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EngineStatus: u8 {
        /// The sequence channel is advancing through its register stream
        const SEQUENCE_PLAYING = 0b0000_0001;
        /// The patch-table channel is playing a sound effect
        const PATCH_TABLE_PLAYING = 0b0000_0010;
    }
}

/// Operation contract of a tone generator
///
/// The generator owns its memory (see [`GeneratorMemory`]); blobs are copied
/// into it by the bridge and then handed over by pointer and length. The
/// generator interprets those bytes but never frees them.
///
/// # Example
///
/// ```
/// use opl_bridge::{GeneratorMemory, SequencerEngine, SessionConfig, SquareChip, ToneEngine};
///
/// let mut engine = SequencerEngine::<SquareChip>::create(&SessionConfig::default());
/// let ptr = engine.allocate(4).unwrap();
/// engine.region_mut(ptr, 4).unwrap().copy_from_slice(&[0xB0, 0x00, 0x10, 0x00]);
/// engine.play_sequence(ptr, 4);
///
/// let block = engine.generate_block();
/// assert_eq!(block.len(), 256);
/// ```
pub trait ToneEngine: GeneratorMemory + Send {
    /// Create a generator for one session
    ///
    /// Mixer rate and both clock rates are fixed for the generator's lifetime.
    fn create(config: &SessionConfig) -> Self
    where
        Self: Sized;

    /// Start the sequence channel on the register stream at `ptr`
    fn play_sequence(&mut self, ptr: BlobPtr, len: usize);

    /// Start the patch-table channel on the sound effect at `ptr`
    fn play_patch_table(&mut self, ptr: BlobPtr, len: usize);

    /// Write a chip register; audible from the next generated block
    fn write_register(&mut self, index: u16, value: u8);

    /// Halt the sequence channel; the patch-table channel is unaffected
    fn stop_sequence(&mut self);

    /// Whether a sound effect is currently playing
    fn is_patch_table_playing(&self) -> bool;

    /// Whether the sequence channel is currently playing
    fn is_sequence_playing(&self) -> bool;

    /// Both channel states at once
    fn status(&self) -> EngineStatus {
        let mut status = EngineStatus::empty();
        status.set(EngineStatus::SEQUENCE_PLAYING, self.is_sequence_playing());
        status.set(
            EngineStatus::PATCH_TABLE_PLAYING,
            self.is_patch_table_playing(),
        );
        status
    }

    /// Produce the block for the current quantum
    ///
    /// Must be called exactly once per quantum, whether or not anything is
    /// bound; a silent block is a valid result.
    fn generate_block(&mut self) -> &SampleBlock;
}
