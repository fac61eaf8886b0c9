//! Chip backends
//!
//! The sequencer writes OPL register values and asks the chip for mono
//! integer samples. [`SoundChip`] is the seam; [`SquareChip`] is a small
//! built-in backend that voices the nine melodic OPL2 channels as square
//! waves. It follows the register layout (F-number, block, key-on, carrier
//! total level) but makes no attempt at FM synthesis.

/// Common interface for chip backends driven by the sequencer
pub trait SoundChip: Send {
    /// Create a chip producing samples at `mixer_rate` Hz
    fn with_rate(mixer_rate: u32) -> Self
    where
        Self: Sized;

    /// Silence all voices and clear every register
    fn reset(&mut self);

    /// Write a register
    ///
    /// Registers the backend does not model are ignored.
    fn write_register(&mut self, index: u16, value: u8);

    /// Render mono samples in the chip's 16-bit integer range
    fn render(&mut self, out: &mut [i32]);
}

const NUM_VOICES: usize = 9;

/// OPL2 master clock divided by 288
const OPL_RATE: f64 = 49_716.0;

/// Peak amplitude of one voice at zero attenuation
const MAX_VOICE_LEVEL: f64 = 512.0;

/// Register offsets of each voice's carrier operator
const CARRIER_OFFSETS: [u16; NUM_VOICES] = [3, 4, 5, 11, 12, 13, 19, 20, 21];

const REG_TOTAL_LEVEL: u16 = 0x40;
const REG_FNUM_LOW: u16 = 0xA0;
const REG_KEY_BLOCK: u16 = 0xB0;
const KEY_ON: u8 = 0x20;

#[derive(Debug, Clone, Copy, Default)]
struct Voice {
    phase: u32,
    step: u32,
    level: i32,
    keyed: bool,
}

/// Square-wave approximation of the OPL2 melodic voices
#[derive(Debug, Clone)]
pub struct SquareChip {
    mixer_rate: u32,
    regs: [u8; 256],
    voices: [Voice; NUM_VOICES],
}

impl SquareChip {
    /// Create a chip producing samples at `mixer_rate` Hz
    pub fn new(mixer_rate: u32) -> Self {
        let mut chip = SquareChip {
            mixer_rate: mixer_rate.max(1),
            regs: [0; 256],
            voices: [Voice::default(); NUM_VOICES],
        };
        chip.reset();
        chip
    }

    /// Read back a register value
    pub fn read_register(&self, index: u16) -> u8 {
        self.regs.get(index as usize).copied().unwrap_or(0)
    }

    /// Whether voice `voice` is keyed on
    pub fn is_keyed(&self, voice: usize) -> bool {
        self.voices.get(voice).is_some_and(|v| v.keyed)
    }

    fn update_pitch(&mut self, voice: usize) {
        let fnum_low = self.regs[(REG_FNUM_LOW as usize) + voice] as u32;
        let key_block = self.regs[(REG_KEY_BLOCK as usize) + voice];
        let fnum = (((key_block & 0x03) as u32) << 8) | fnum_low;
        let block = ((key_block >> 2) & 0x07) as i32;

        let freq = fnum as f64 * OPL_RATE / f64::from(1u32 << (20 - block));
        let step = freq / self.mixer_rate as f64 * 4_294_967_296.0;

        let v = &mut self.voices[voice];
        v.step = step.min(u32::MAX as f64) as u32;
        v.keyed = key_block & KEY_ON != 0;
    }

    fn update_level(&mut self, voice: usize) {
        let reg = (REG_TOTAL_LEVEL + CARRIER_OFFSETS[voice]) as usize;
        // 0.75 dB of attenuation per step
        let attenuation_db = (self.regs[reg] & 0x3F) as f64 * 0.75;
        self.voices[voice].level = (MAX_VOICE_LEVEL * 10f64.powf(-attenuation_db / 20.0)) as i32;
    }
}

impl SoundChip for SquareChip {
    fn with_rate(mixer_rate: u32) -> Self {
        SquareChip::new(mixer_rate)
    }

    fn reset(&mut self) {
        self.regs = [0; 256];
        for voice in 0..NUM_VOICES {
            self.voices[voice] = Voice::default();
            self.update_level(voice);
        }
    }

    fn write_register(&mut self, index: u16, value: u8) {
        let Some(slot) = self.regs.get_mut(index as usize) else {
            return;
        };
        *slot = value;

        match index {
            0xA0..=0xA8 => self.update_pitch((index - REG_FNUM_LOW) as usize),
            0xB0..=0xB8 => self.update_pitch((index - REG_KEY_BLOCK) as usize),
            0x40..=0x55 => {
                let offset = index - REG_TOTAL_LEVEL;
                if let Some(voice) = CARRIER_OFFSETS.iter().position(|&o| o == offset) {
                    self.update_level(voice);
                }
            }
            _ => {}
        }
    }

    fn render(&mut self, out: &mut [i32]) {
        for sample in out.iter_mut() {
            let mut mix = 0;
            for v in self.voices.iter_mut().filter(|v| v.keyed) {
                mix += if v.phase < 0x8000_0000 { v.level } else { -v.level };
                v.phase = v.phase.wrapping_add(v.step);
            }
            *sample = mix;
        }
    }
}

impl Default for SquareChip {
    fn default() -> Self {
        SquareChip::new(crate::constants::DEFAULT_MIXER_RATE)
    }
}
