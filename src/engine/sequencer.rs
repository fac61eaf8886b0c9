//! Register-stream sequencer
//!
//! Drives a [`SoundChip`] from two channels:
//!
//! - **sequence**: 4-byte records `reg, value, delay_lo, delay_hi`. A record
//!   is written when the music tick counter reaches its scheduled time; its
//!   delay (in music ticks) schedules the next record.
//! - **patch table**: a sound effect whose notes are stepped on the effect
//!   voice every `sequence_clock / patch_clock` music ticks.
//!
//! Music ticks run at the sequence clock rate. Between ticks the chip renders
//! `mixer_rate / sequence_clock` samples, so a render quantum may straddle
//! several ticks or none.

use super::chip::{SoundChip, SquareChip};
use super::patch::{PatchHeader, AL_FREQ_H, AL_FREQ_L};
use super::{SampleBlock, ToneEngine};
use crate::blob::{BlobArena, BlobPtr, GeneratorMemory};
use crate::config::SessionConfig;
use crate::constants::{
    BLOCK_LEN, FLOAT_CONVERSION_FACTOR, OUTPUT_GAIN_SHIFT, RENDER_QUANTUM_FRAMES,
    SEQUENCE_RECORD_LEN,
};
use crate::Result;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy)]
struct SequenceState {
    ptr: BlobPtr,
    len: usize,
    /// Byte offset of the next record
    cursor: usize,
    /// Music tick at which the next record is due
    due: u32,
    /// Music ticks elapsed since the start of the pass
    tick: u32,
    active: bool,
}

#[derive(Debug, Clone, Copy)]
struct PatchState {
    ptr: BlobPtr,
    len: usize,
    /// Byte offset of the next note
    cursor: usize,
    /// End of the note data
    end: usize,
    key_block: u8,
    /// Music ticks until the next note step
    countdown: u32,
}

/// Sequencer engine over a chip backend
pub struct SequencerEngine<C: SoundChip = SquareChip> {
    memory: BlobArena,
    chip: C,
    buf: SampleBlock,
    mix_buffer: Vec<i32>,
    sequence: Option<SequenceState>,
    patch: Option<PatchState>,
    ready_samples: u32,
    samples_per_music_tick: u32,
    music_ticks_per_patch_tick: u32,
    loop_sequence: bool,
}

impl<C: SoundChip> SequencerEngine<C> {
    /// Create an engine around an existing chip
    pub fn with_chip(config: &SessionConfig, chip: C) -> Self {
        let samples_per_music_tick = config.samples_per_music_tick();
        SequencerEngine {
            memory: BlobArena::new(config.memory_limit),
            chip,
            buf: [0.0; BLOCK_LEN],
            mix_buffer: vec![0; samples_per_music_tick as usize],
            sequence: None,
            patch: None,
            ready_samples: 0,
            samples_per_music_tick,
            music_ticks_per_patch_tick: config.music_ticks_per_patch_tick(),
            loop_sequence: config.loop_sequence,
        }
    }

    /// The chip backend
    pub fn chip(&self) -> &C {
        &self.chip
    }

    /// The generator memory holding bound blobs
    pub fn memory(&self) -> &BlobArena {
        &self.memory
    }

    /// One music tick: step the effect voice, then play due sequence records
    fn music_tick(&mut self) {
        self.step_patch();
        self.step_sequence();
    }

    fn step_patch(&mut self) {
        let Some(patch) = self.patch.as_mut() else {
            return;
        };
        patch.countdown -= 1;
        if patch.countdown > 0 {
            return;
        }
        patch.countdown = self.music_ticks_per_patch_tick;

        let note = self
            .memory
            .region(patch.ptr, patch.len)
            .filter(|_| patch.cursor < patch.end)
            .map(|bytes| bytes[patch.cursor]);
        match note {
            Some(0) => {
                self.chip.write_register(AL_FREQ_H, 0);
                patch.cursor += 1;
            }
            Some(note) => {
                self.chip.write_register(AL_FREQ_L, note);
                self.chip.write_register(AL_FREQ_H, patch.key_block);
                patch.cursor += 1;
            }
            None => {
                // Key off so the last note does not ring on
                self.chip.write_register(AL_FREQ_H, 0);
                self.patch = None;
                trace!("patch table finished");
            }
        }
    }

    fn step_sequence(&mut self) {
        let Some(seq) = self.sequence.as_mut().filter(|s| s.active) else {
            return;
        };
        let Some(data) = self.memory.region(seq.ptr, seq.len) else {
            debug!("sequence blob released while playing");
            seq.active = false;
            return;
        };

        while seq.due <= seq.tick && seq.cursor + SEQUENCE_RECORD_LEN <= data.len() {
            let record = &data[seq.cursor..seq.cursor + SEQUENCE_RECORD_LEN];
            let delay = u16::from_le_bytes([record[2], record[3]]) as u32;
            seq.due = seq.tick + delay;
            self.chip.write_register(record[0] as u16, record[1]);
            seq.cursor += SEQUENCE_RECORD_LEN;
        }
        seq.tick += 1;

        if seq.cursor + SEQUENCE_RECORD_LEN > data.len() {
            if self.loop_sequence {
                seq.cursor = 0;
                seq.due = 0;
                seq.tick = 0;
            } else {
                seq.active = false;
                trace!("sequence finished");
            }
        }
    }

    /// Render `frames` chip samples into the block starting at frame `offset`
    fn render_frames(&mut self, offset: usize, frames: usize) {
        let mix = &mut self.mix_buffer[..frames];
        self.chip.render(mix);

        let out = &mut self.buf[offset * 2..(offset + frames) * 2];
        for (frame, &sample) in out.chunks_exact_mut(2).zip(mix.iter()) {
            let value = (sample << OUTPUT_GAIN_SHIFT) as f32 / FLOAT_CONVERSION_FACTOR;
            frame[0] = value;
            frame[1] = value;
        }
    }
}

impl<C: SoundChip> GeneratorMemory for SequencerEngine<C> {
    fn allocate(&mut self, size: usize) -> Result<BlobPtr> {
        self.memory.allocate(size)
    }

    fn deallocate(&mut self, ptr: BlobPtr, size: usize) -> Result<()> {
        self.memory.deallocate(ptr, size)
    }

    fn available(&self) -> usize {
        self.memory.available()
    }

    fn region(&self, ptr: BlobPtr, len: usize) -> Option<&[u8]> {
        self.memory.region(ptr, len)
    }

    fn region_mut(&mut self, ptr: BlobPtr, len: usize) -> Option<&mut [u8]> {
        self.memory.region_mut(ptr, len)
    }
}

impl<C: SoundChip> ToneEngine for SequencerEngine<C> {
    fn create(config: &SessionConfig) -> Self {
        Self::with_chip(config, C::with_rate(config.mixer_rate))
    }

    fn play_sequence(&mut self, ptr: BlobPtr, len: usize) {
        self.chip.reset();
        if len < SEQUENCE_RECORD_LEN {
            debug!(len, "sequence shorter than one record");
            self.sequence = None;
            return;
        }
        self.sequence = Some(SequenceState {
            ptr,
            len,
            cursor: 0,
            due: 0,
            tick: 0,
            active: true,
        });
    }

    fn play_patch_table(&mut self, ptr: BlobPtr, len: usize) {
        let header = self.memory.region(ptr, len).and_then(PatchHeader::parse);
        let Some(header) = header else {
            debug!(len, "malformed patch table");
            if self.patch.take().is_some() {
                self.chip.write_register(AL_FREQ_H, 0);
            }
            return;
        };

        header.instrument.program(&mut self.chip);
        let notes = header.note_range(len);
        self.patch = Some(PatchState {
            ptr,
            len,
            cursor: notes.start,
            end: notes.end,
            key_block: header.key_block(),
            countdown: self.music_ticks_per_patch_tick,
        });
    }

    fn write_register(&mut self, index: u16, value: u8) {
        self.chip.write_register(index, value);
    }

    fn stop_sequence(&mut self) {
        if let Some(seq) = self.sequence.as_mut() {
            seq.active = false;
        }
    }

    fn is_patch_table_playing(&self) -> bool {
        self.patch.is_some()
    }

    fn is_sequence_playing(&self) -> bool {
        self.sequence.is_some_and(|s| s.active)
    }

    fn generate_block(&mut self) -> &SampleBlock {
        let mut remaining = RENDER_QUANTUM_FRAMES;
        let mut offset = 0;

        loop {
            if self.ready_samples > 0 {
                let frames = (self.ready_samples as usize).min(remaining);
                self.render_frames(offset, frames);
                self.ready_samples -= frames as u32;
                offset += frames;
                remaining -= frames;
                if remaining == 0 {
                    break;
                }
            }
            self.music_tick();
            self.ready_samples = self.samples_per_music_tick;
        }

        &self.buf
    }
}

impl<C: SoundChip + std::fmt::Debug> std::fmt::Debug for SequencerEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencerEngine")
            .field("chip", &self.chip)
            .field("sequence", &self.sequence)
            .field("patch", &self.patch)
            .field("samples_per_music_tick", &self.samples_per_music_tick)
            .field("music_ticks_per_patch_tick", &self.music_ticks_per_patch_tick)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::patch::Instrument;
    use approx::assert_relative_eq;

    /// Chip that records register writes and renders a constant
    #[derive(Debug, Default)]
    struct RecordingChip {
        writes: Vec<(u16, u8)>,
        resets: usize,
        level: i32,
    }

    impl SoundChip for RecordingChip {
        fn with_rate(_mixer_rate: u32) -> Self {
            Self::default()
        }

        fn reset(&mut self) {
            self.resets += 1;
        }

        fn write_register(&mut self, index: u16, value: u8) {
            self.writes.push((index, value));
        }

        fn render(&mut self, out: &mut [i32]) {
            out.fill(self.level);
        }
    }

    /// One music tick per render quantum, one patch step per music tick
    fn tick_per_block_config() -> SessionConfig {
        SessionConfig {
            mixer_rate: 128 * 700,
            sequence_clock_rate: 700,
            patch_clock_rate: 700,
            ..SessionConfig::default()
        }
    }

    fn load<E: ToneEngine>(engine: &mut E, bytes: &[u8]) -> BlobPtr {
        let ptr = engine.allocate(bytes.len()).unwrap();
        engine.region_mut(ptr, bytes.len()).unwrap().copy_from_slice(bytes);
        ptr
    }

    fn record(reg: u8, value: u8, delay: u16) -> [u8; 4] {
        let d = delay.to_le_bytes();
        [reg, value, d[0], d[1]]
    }

    fn sequence(records: &[[u8; 4]]) -> Vec<u8> {
        records.iter().flatten().copied().collect()
    }

    #[test]
    fn test_silent_block_without_blobs() {
        let mut engine = SequencerEngine::<SquareChip>::create(&SessionConfig::default());
        for _ in 0..10 {
            assert!(engine.generate_block().iter().all(|&s| s == 0.0));
        }
        assert!(!engine.is_patch_table_playing());
        assert!(!engine.is_sequence_playing());
    }

    #[test]
    fn test_block_scaling_and_stereo_duplication() {
        let mut engine = SequencerEngine::with_chip(
            &SessionConfig::default(),
            RecordingChip {
                level: 1000,
                ..Default::default()
            },
        );
        let block = engine.generate_block();
        for frame in block.chunks_exact(2) {
            assert_relative_eq!(frame[0], 4000.0 / 32768.0);
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_sequence_records_follow_their_delays() {
        let mut engine =
            SequencerEngine::with_chip(&tick_per_block_config(), RecordingChip::default());
        let data = sequence(&[record(0x20, 1, 0), record(0x21, 2, 2), record(0x22, 3, 0)]);
        let ptr = load(&mut engine, &data);
        engine.play_sequence(ptr, data.len());
        assert_eq!(engine.chip().resets, 1);
        assert!(engine.is_sequence_playing());

        engine.generate_block();
        assert_eq!(engine.chip().writes, vec![(0x20, 1), (0x21, 2)]);

        engine.generate_block();
        assert_eq!(engine.chip().writes.len(), 2);

        engine.generate_block();
        assert_eq!(engine.chip().writes.last(), Some(&(0x22, 3)));

        // Loops back to the first record on the next tick
        engine.generate_block();
        assert_eq!(engine.chip().writes[3..], [(0x20, 1), (0x21, 2)]);
        assert!(engine.is_sequence_playing());
    }

    #[test]
    fn test_sequence_without_loop_goes_idle() {
        let config = SessionConfig {
            loop_sequence: false,
            ..tick_per_block_config()
        };
        let mut engine = SequencerEngine::with_chip(&config, RecordingChip::default());
        let data = sequence(&[record(0x20, 1, 1), record(0x21, 2, 0)]);
        let ptr = load(&mut engine, &data);
        engine.play_sequence(ptr, data.len());

        engine.generate_block();
        engine.generate_block();
        assert!(!engine.is_sequence_playing());

        for _ in 0..5 {
            engine.generate_block();
        }
        assert_eq!(engine.chip().writes, vec![(0x20, 1), (0x21, 2)]);
    }

    #[test]
    fn test_trailing_partial_record_is_ignored() {
        let mut engine =
            SequencerEngine::with_chip(&tick_per_block_config(), RecordingChip::default());
        let mut data = sequence(&[record(0x20, 1, 0)]);
        data.extend_from_slice(&[0x99, 0x99]);
        let ptr = load(&mut engine, &data);
        engine.play_sequence(ptr, data.len());

        engine.generate_block();
        assert_eq!(engine.chip().writes, vec![(0x20, 1)]);
    }

    #[test]
    fn test_stop_sequence_halts_writes() {
        let mut engine =
            SequencerEngine::with_chip(&tick_per_block_config(), RecordingChip::default());
        let data = sequence(&[record(0x20, 1, 1), record(0x21, 2, 1)]);
        let ptr = load(&mut engine, &data);
        engine.play_sequence(ptr, data.len());
        engine.generate_block();

        engine.stop_sequence();
        assert!(!engine.is_sequence_playing());
        for _ in 0..4 {
            engine.generate_block();
        }
        assert_eq!(engine.chip().writes, vec![(0x20, 1)]);
    }

    #[test]
    fn test_short_sequence_does_not_play() {
        let mut engine =
            SequencerEngine::with_chip(&tick_per_block_config(), RecordingChip::default());
        let ptr = load(&mut engine, &[1, 2]);
        engine.play_sequence(ptr, 2);
        assert!(!engine.is_sequence_playing());
    }

    #[test]
    fn test_released_sequence_goes_idle() {
        let mut engine =
            SequencerEngine::with_chip(&tick_per_block_config(), RecordingChip::default());
        let data = sequence(&[record(0x20, 1, 1)]);
        let ptr = load(&mut engine, &data);
        engine.play_sequence(ptr, data.len());
        engine.deallocate(ptr, data.len()).unwrap();

        engine.generate_block();
        assert!(!engine.is_sequence_playing());
        assert!(engine.chip().writes.is_empty());
    }

    #[test]
    fn test_patch_table_steps_notes_then_finishes() {
        let mut engine =
            SequencerEngine::with_chip(&tick_per_block_config(), RecordingChip::default());
        let header = PatchHeader {
            length: 0,
            priority: 0,
            instrument: Instrument {
                m_char: 0x11,
                ..Default::default()
            },
            block: 4,
        };
        let blob = header.encode(&[0x50, 0x00, 0x60], "blip");
        let ptr = load(&mut engine, &blob);

        engine.play_patch_table(ptr, blob.len());
        assert!(engine.is_patch_table_playing());
        // Instrument programmed: 10 operator registers plus feedback/connection
        assert_eq!(engine.chip().writes.len(), 11);
        assert_eq!(engine.chip().writes[0], (0x20, 0x11));

        let key_block = 0x20 | (4 << 2);
        engine.generate_block();
        assert_eq!(
            engine.chip().writes[11..],
            [(AL_FREQ_L, 0x50), (AL_FREQ_H, key_block)]
        );
        engine.generate_block();
        assert_eq!(engine.chip().writes.last(), Some(&(AL_FREQ_H, 0)));
        engine.generate_block();
        assert_eq!(engine.chip().writes.last(), Some(&(AL_FREQ_H, key_block)));
        assert!(engine.is_patch_table_playing());

        engine.generate_block();
        assert!(!engine.is_patch_table_playing());
        assert_eq!(engine.chip().writes.last(), Some(&(AL_FREQ_H, 0)));
        assert_eq!(engine.status(), crate::engine::EngineStatus::empty());
    }

    #[test]
    fn test_patch_steps_follow_patch_clock() {
        // 700 / 140 = 5 music ticks per note
        let config = SessionConfig {
            mixer_rate: 128 * 700,
            ..SessionConfig::default()
        };
        let mut engine = SequencerEngine::with_chip(&config, RecordingChip::default());
        let blob = PatchHeader {
            length: 0,
            priority: 0,
            instrument: Instrument::default(),
            block: 0,
        }
        .encode(&[0x40], "one");
        let ptr = load(&mut engine, &blob);
        engine.play_patch_table(ptr, blob.len());
        let programmed = engine.chip().writes.len();

        for _ in 0..4 {
            engine.generate_block();
        }
        assert_eq!(engine.chip().writes.len(), programmed);
        engine.generate_block();
        assert_eq!(engine.chip().writes[programmed], (AL_FREQ_L, 0x40));
    }

    #[test]
    fn test_malformed_patch_table_stays_idle() {
        let mut engine =
            SequencerEngine::with_chip(&tick_per_block_config(), RecordingChip::default());
        let ptr = load(&mut engine, &[0u8; 10]);
        engine.play_patch_table(ptr, 10);
        assert!(!engine.is_patch_table_playing());
        assert!(engine.chip().writes.is_empty());
    }

    #[test]
    fn test_patch_table_plays_without_sequence() {
        let mut engine = SequencerEngine::<SquareChip>::create(&tick_per_block_config());
        let blob = PatchHeader {
            length: 0,
            priority: 0,
            instrument: Instrument::default(),
            block: 4,
        }
        .encode(&[0x44, 0x44], "tone");
        let ptr = load(&mut engine, &blob);
        engine.play_patch_table(ptr, blob.len());

        // One note per block, keyed off on the third
        assert!(engine.generate_block().iter().any(|&s| s != 0.0));
        assert!(engine.generate_block().iter().any(|&s| s != 0.0));
        assert!(engine.is_patch_table_playing());
        engine.generate_block();
        assert!(!engine.is_patch_table_playing());
    }

    #[test]
    fn test_quantum_straddles_music_ticks() {
        // 63 samples per tick at the default rates: the first block needs 3 ticks
        let mut engine =
            SequencerEngine::with_chip(&SessionConfig::default(), RecordingChip::default());
        let data = sequence(&[
            record(0x01, 1, 1),
            record(0x02, 2, 1),
            record(0x03, 3, 1),
            record(0x04, 4, 1),
        ]);
        let ptr = load(&mut engine, &data);
        engine.play_sequence(ptr, data.len());

        engine.generate_block();
        assert_eq!(engine.chip().writes, vec![(0x01, 1), (0x02, 2), (0x03, 3)]);
    }
}
