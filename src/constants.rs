//! Render and timing constants
//!
//! Shared constants fixed by the render contract and the OPL timing model.

/// Stereo frames produced or consumed per render callback
pub const RENDER_QUANTUM_FRAMES: usize = 128;

/// Output channel count (stereo only)
pub const CHANNELS: usize = 2;

/// Interleaved samples in one generated block
pub const BLOCK_LEN: usize = RENDER_QUANTUM_FRAMES * CHANNELS;

/// Default host mixer rate in Hz
pub const DEFAULT_MIXER_RATE: u32 = 44_100;

/// Default sequence (IMF) tick rate in Hz, used when a clock rate of 0 is given
pub const DEFAULT_SEQUENCE_CLOCK_RATE: u32 = 700;

/// Default patch-table (ADL) tick rate in Hz, used when a clock rate of 0 is given
pub const DEFAULT_PATCH_CLOCK_RATE: u32 = 140;

/// Default byte budget of generator memory
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Default number of preallocated chunk slots in the legacy sample queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Scale from the chip's 16-bit integer range to normalized floats
pub const FLOAT_CONVERSION_FACTOR: f32 = 32768.0;

/// Left shift applied to every mixed chip sample before conversion
pub const OUTPUT_GAIN_SHIFT: u32 = 2;

/// Size in bytes of one sequence record (`reg`, `value`, `delay` LE u16)
pub const SEQUENCE_RECORD_LEN: usize = 4;

/// Size in bytes of the patch-table header preceding the note data
pub const PATCH_HEADER_LEN: usize = 23;
