//! Offline host
//!
//! Drives a [`RenderProcessor`] as fast as possible instead of on an audio
//! clock. Used for WAV export and tests, and as the simplest example of what
//! a real-time host does each quantum.

use crate::constants::{BLOCK_LEN, RENDER_QUANTUM_FRAMES};
use crate::render::RenderProcessor;
use crate::{BridgeError, Result};

/// Longest render [`OfflineHost::render_seconds`] accepts, in quanta
///
/// Beyond this the interleaved output no longer fits in a `Vec<f32>`.
const MAX_RENDER_QUANTA: usize = isize::MAX as usize / (BLOCK_LEN * std::mem::size_of::<f32>());

/// Host that renders quanta into an interleaved buffer
#[derive(Debug)]
pub struct OfflineHost<P: RenderProcessor> {
    processor: P,
    left: [f32; RENDER_QUANTUM_FRAMES],
    right: [f32; RENDER_QUANTUM_FRAMES],
}

impl<P: RenderProcessor> OfflineHost<P> {
    /// Take ownership of a processor
    pub fn new(processor: P) -> Self {
        OfflineHost {
            processor,
            left: [0.0; RENDER_QUANTUM_FRAMES],
            right: [0.0; RENDER_QUANTUM_FRAMES],
        }
    }

    /// Run one quantum and append it, interleaved, to `out`
    pub fn render_quantum_into(&mut self, out: &mut Vec<f32>) {
        self.processor.process(&mut self.left, &mut self.right);
        out.reserve(BLOCK_LEN);
        for (&l, &r) in self.left.iter().zip(self.right.iter()) {
            out.push(l);
            out.push(r);
        }
    }

    /// Run `quanta` quanta and return the interleaved output
    pub fn render_quanta(&mut self, quanta: usize) -> Vec<f32> {
        let mut out = Vec::new();
        // Oversized requests grow the buffer as they render instead
        let _ = out.try_reserve_exact(quanta.saturating_mul(BLOCK_LEN));
        for _ in 0..quanta {
            self.render_quantum_into(&mut out);
        }
        out
    }

    /// Render at least `seconds` of audio at `sample_rate`, rounded up to whole quanta
    ///
    /// Negative durations render nothing.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when `seconds` is not finite or the output would
    /// not fit in memory.
    pub fn render_seconds(&mut self, seconds: f32, sample_rate: u32) -> Result<Vec<f32>> {
        let out_of_range =
            || BridgeError::ConfigError(format!("cannot render {seconds} s at {sample_rate} Hz"));
        if !seconds.is_finite() {
            return Err(out_of_range());
        }
        let frames = (f64::from(seconds.max(0.0)) * f64::from(sample_rate)).ceil();
        let quanta = (frames / RENDER_QUANTUM_FRAMES as f64).ceil();
        if quanta > MAX_RENDER_QUANTA as f64 {
            return Err(out_of_range());
        }
        Ok(self.render_quanta(quanta as usize))
    }

    /// The hosted processor
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// The hosted processor, mutably (e.g. to [`accept`](RenderProcessor::accept) messages)
    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    /// Give the processor back
    pub fn into_inner(self) -> P {
        self.processor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts quanta and writes the count into both channels
    struct Counter(f32);

    impl RenderProcessor for Counter {
        type Message = f32;

        fn accept(&mut self, message: f32) {
            self.0 = message;
        }

        fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
            self.0 += 1.0;
            left.fill(self.0);
            right.fill(-self.0);
        }
    }

    #[test]
    fn test_render_quanta_interleaves() {
        let mut host = OfflineHost::new(Counter(0.0));
        let out = host.render_quanta(2);
        assert_eq!(out.len(), 512);
        assert_eq!(&out[..4], &[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(&out[256..258], &[2.0, -2.0]);
    }

    #[test]
    fn test_render_seconds_rounds_up_to_quanta() {
        let mut host = OfflineHost::new(Counter(0.0));
        // 0.01 s at 44.1 kHz = 441 frames = 3.4 quanta
        let out = host.render_seconds(0.01, 44_100).unwrap();
        assert_eq!(out.len(), 4 * 256);
        assert!(host.render_seconds(0.0, 44_100).unwrap().is_empty());
        assert!(host.render_seconds(-3.0, 44_100).unwrap().is_empty());
    }

    #[test]
    fn test_render_seconds_rejects_unrenderable_lengths() {
        let mut host = OfflineHost::new(Counter(0.0));
        for seconds in [1e30, f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            assert!(matches!(
                host.render_seconds(seconds, 44_100),
                Err(BridgeError::ConfigError(_))
            ));
        }
        // Nothing was rendered
        assert_eq!(host.processor().0, 0.0);
    }

    #[test]
    fn test_processor_access() {
        let mut host = OfflineHost::new(Counter(0.0));
        host.processor_mut().accept(10.0);
        host.render_quanta(1);
        assert_eq!(host.processor().0, 11.0);
        assert_eq!(host.into_inner().0, 11.0);
    }
}
