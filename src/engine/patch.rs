//! Patch-table (sound effect) layout
//!
//! A patch table starts with a 23-byte header:
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0 | 4 | note count, little endian |
//! | 4 | 2 | priority, little endian |
//! | 6 | 13 | instrument (modulator/carrier operator settings, connection, voice, mode) |
//! | 19 | 3 | padding |
//! | 22 | 1 | octave block |
//!
//! followed by one byte per note (F-number low byte, `0` = rest), a
//! terminator byte and the sound's name.

use super::chip::SoundChip;
use crate::constants::PATCH_HEADER_LEN;
use nom::bytes::complete::take;
use nom::number::complete::{le_u16, le_u32, u8 as byte};
use nom::IResult;
use std::ops::Range;

const AL_CHAR: u16 = 0x20;
const AL_SCALE: u16 = 0x40;
const AL_ATTACK: u16 = 0x60;
const AL_SUS: u16 = 0x80;
const AL_WAVE: u16 = 0xE0;
const AL_FEED_CON: u16 = 0xC0;

/// Register receiving the F-number low byte of the effect voice
pub const AL_FREQ_L: u16 = 0xA0;
/// Register receiving key-on, block and F-number high bits of the effect voice
pub const AL_FREQ_H: u16 = 0xB0;

/// Offset from the modulator to the carrier operator registers
const CARRIER_OFFSET: u16 = 3;

/// Operator settings of the effect voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Instrument {
    /// Modulator characteristic (tremolo, vibrato, sustain, KSR, multiplier)
    pub m_char: u8,
    /// Carrier characteristic
    pub c_char: u8,
    /// Modulator key scale / output level
    pub m_scale: u8,
    /// Carrier key scale / output level
    pub c_scale: u8,
    /// Modulator attack / decay
    pub m_attack: u8,
    /// Carrier attack / decay
    pub c_attack: u8,
    /// Modulator sustain / release
    pub m_sus: u8,
    /// Carrier sustain / release
    pub c_sus: u8,
    /// Modulator waveform
    pub m_wave: u8,
    /// Carrier waveform
    pub c_wave: u8,
    /// Feedback / connection
    pub n_conn: u8,
    /// Voice number (unused by the player)
    pub voice: u8,
    /// Mode (unused by the player)
    pub mode: u8,
}

impl Instrument {
    fn from_bytes(b: &[u8]) -> Self {
        Instrument {
            m_char: b[0],
            c_char: b[1],
            m_scale: b[2],
            c_scale: b[3],
            m_attack: b[4],
            c_attack: b[5],
            m_sus: b[6],
            c_sus: b[7],
            m_wave: b[8],
            c_wave: b[9],
            n_conn: b[10],
            voice: b[11],
            mode: b[12],
        }
    }

    fn to_bytes(self) -> [u8; 13] {
        [
            self.m_char,
            self.c_char,
            self.m_scale,
            self.c_scale,
            self.m_attack,
            self.c_attack,
            self.m_sus,
            self.c_sus,
            self.m_wave,
            self.c_wave,
            self.n_conn,
            self.voice,
            self.mode,
        ]
    }

    /// Load the instrument into the effect voice (voice 0)
    pub fn program<C: SoundChip + ?Sized>(&self, chip: &mut C) {
        chip.write_register(AL_CHAR, self.m_char);
        chip.write_register(AL_SCALE, self.m_scale);
        chip.write_register(AL_ATTACK, self.m_attack);
        chip.write_register(AL_SUS, self.m_sus);
        chip.write_register(AL_WAVE, self.m_wave);
        chip.write_register(CARRIER_OFFSET + AL_CHAR, self.c_char);
        chip.write_register(CARRIER_OFFSET + AL_SCALE, self.c_scale);
        chip.write_register(CARRIER_OFFSET + AL_ATTACK, self.c_attack);
        chip.write_register(CARRIER_OFFSET + AL_SUS, self.c_sus);
        chip.write_register(CARRIER_OFFSET + AL_WAVE, self.c_wave);

        chip.write_register(AL_FEED_CON, 0);
    }
}

/// Parsed patch-table header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchHeader {
    /// Number of note bytes following the header
    pub length: u32,
    /// Playback priority (informational)
    pub priority: u16,
    /// Effect voice settings
    pub instrument: Instrument,
    /// Octave block
    pub block: u8,
}

fn header(input: &[u8]) -> IResult<&[u8], PatchHeader> {
    let (input, length) = le_u32(input)?;
    let (input, priority) = le_u16(input)?;
    let (input, instrument) = take(13usize)(input)?;
    let (input, _padding) = take(3usize)(input)?;
    let (input, block) = byte(input)?;
    Ok((
        input,
        PatchHeader {
            length,
            priority,
            instrument: Instrument::from_bytes(instrument),
            block,
        },
    ))
}

impl PatchHeader {
    /// Parse the header at the start of `bytes`
    ///
    /// Returns `None` when fewer than 23 bytes are available.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        header(bytes).ok().map(|(_, h)| h)
    }

    /// Value written to [`AL_FREQ_H`] for each sounding note
    pub fn key_block(&self) -> u8 {
        ((self.block & 7) << 2) | 0x20
    }

    /// Byte range of the note data inside a blob of `blob_len` bytes
    ///
    /// Clamped to the bytes actually present.
    pub fn note_range(&self, blob_len: usize) -> Range<usize> {
        let end = PATCH_HEADER_LEN
            .saturating_add(self.length as usize)
            .min(blob_len);
        PATCH_HEADER_LEN.min(end)..end
    }

    /// Serialize header, notes, terminator and name into a patch-table blob
    pub fn encode(&self, notes: &[u8], name: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(PATCH_HEADER_LEN + notes.len() + name.len() + 2);
        out.extend_from_slice(&(notes.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.priority.to_le_bytes());
        out.extend_from_slice(&self.instrument.to_bytes());
        out.extend_from_slice(&[0; 3]);
        out.push(self.block);
        out.extend_from_slice(notes);
        out.push(0);
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out
    }
}
