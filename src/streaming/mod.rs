//! Real-time output through rodio
//!
//! rodio pulls samples from a [`Source`]; [`ProcessorSource`] answers those
//! pulls by running the shared [`RenderProcessor`] for one quantum whenever
//! its interleaved buffer runs dry. The audio thread is therefore the host
//! that drives the render callback.

use crate::config::SessionConfig;
use crate::constants::{BLOCK_LEN, CHANNELS, DEFAULT_MIXER_RATE, RENDER_QUANTUM_FRAMES};
use crate::render::RenderProcessor;
use crate::{BridgeError, Result};
use parking_lot::Mutex;
use rodio::{OutputStream, Sink, Source};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Output stream parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Output rate in Hz; must match the rate the processor renders at
    pub sample_rate: u32,
}

impl StreamConfig {
    /// Stream at the session's mixer rate
    pub fn for_session(config: &SessionConfig) -> Self {
        StreamConfig {
            sample_rate: config.mixer_rate,
        }
    }

    /// Length of one render quantum
    pub fn quantum_duration(&self) -> Duration {
        Duration::from_secs_f64(RENDER_QUANTUM_FRAMES as f64 / self.sample_rate.max(1) as f64)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            sample_rate: DEFAULT_MIXER_RATE,
        }
    }
}

/// rodio source that renders one quantum at a time from a shared processor
pub struct ProcessorSource<P: RenderProcessor> {
    processor: Arc<Mutex<P>>,
    sample_rate: u32,
    finished: Arc<AtomicBool>,
    left: [f32; RENDER_QUANTUM_FRAMES],
    right: [f32; RENDER_QUANTUM_FRAMES],
    buffer: [f32; BLOCK_LEN],
    buffer_pos: usize,
}

impl<P: RenderProcessor> ProcessorSource<P> {
    fn new(processor: Arc<Mutex<P>>, sample_rate: u32, finished: Arc<AtomicBool>) -> Self {
        ProcessorSource {
            processor,
            sample_rate,
            finished,
            left: [0.0; RENDER_QUANTUM_FRAMES],
            right: [0.0; RENDER_QUANTUM_FRAMES],
            buffer: [0.0; BLOCK_LEN],
            // Start by rendering a fresh quantum
            buffer_pos: BLOCK_LEN,
        }
    }

    fn refill(&mut self) {
        self.processor.lock().process(&mut self.left, &mut self.right);
        for (i, frame) in self.buffer.chunks_exact_mut(CHANNELS).enumerate() {
            frame[0] = self.left[i];
            frame[1] = self.right[i];
        }
        self.buffer_pos = 0;
    }
}

impl<P: RenderProcessor> Source for ProcessorSource<P> {
    fn current_frame_len(&self) -> Option<usize> {
        match BLOCK_LEN.saturating_sub(self.buffer_pos) {
            0 => Some(BLOCK_LEN),
            remaining => Some(remaining),
        }
    }

    fn channels(&self) -> u16 {
        CHANNELS as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl<P: RenderProcessor> Iterator for ProcessorSource<P> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.finished.load(Ordering::Relaxed) {
            return None;
        }
        if self.buffer_pos >= BLOCK_LEN {
            self.refill();
        }
        let sample = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Some(sample)
    }
}

/// Audio playback device driving a processor from the rodio output thread
pub struct AudioDevice {
    _stream: OutputStream,
    sink: Sink,
    finished: Arc<AtomicBool>,
}

impl AudioDevice {
    /// Open the default output device and start pulling from `processor`
    ///
    /// # Errors
    ///
    /// Returns `AudioDeviceError` if no output stream or sink can be created.
    pub fn new<P>(processor: Arc<Mutex<P>>, config: StreamConfig) -> Result<Self>
    where
        P: RenderProcessor + 'static,
    {
        let (stream, stream_handle) = OutputStream::try_default().map_err(|e| {
            BridgeError::AudioDeviceError(format!("Failed to create audio stream: {e}"))
        })?;
        let sink = Sink::try_new(&stream_handle).map_err(|e| {
            BridgeError::AudioDeviceError(format!("Failed to create audio sink: {e}"))
        })?;

        let finished = Arc::new(AtomicBool::new(false));
        sink.append(ProcessorSource::new(
            processor,
            config.sample_rate,
            Arc::clone(&finished),
        ));
        debug!(sample_rate = config.sample_rate, "audio device started");

        Ok(AudioDevice {
            _stream: stream,
            sink,
            finished,
        })
    }

    /// Pause playback; the processor is not called while paused
    pub fn pause(&self) {
        self.sink.pause();
    }

    /// Resume playback
    pub fn play(&self) {
        self.sink.play();
    }

    /// Whether playback is paused
    pub fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    /// Stop pulling from the processor; the stream ends after the current sample
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.finish();
        self.sink.pause();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left carries the quantum index, right its negation
    struct Ramp(f32);

    impl RenderProcessor for Ramp {
        type Message = ();

        fn accept(&mut self, _message: ()) {}

        fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
            self.0 += 1.0;
            left.fill(self.0);
            right.fill(-self.0);
        }
    }

    fn source() -> (ProcessorSource<Ramp>, Arc<AtomicBool>) {
        let finished = Arc::new(AtomicBool::new(false));
        let source = ProcessorSource::new(
            Arc::new(Mutex::new(Ramp(0.0))),
            44_100,
            Arc::clone(&finished),
        );
        (source, finished)
    }

    #[test]
    fn test_source_reports_stereo_format() {
        let (source, _) = source();
        assert_eq!(source.channels(), 2);
        assert_eq!(source.sample_rate(), 44_100);
        assert_eq!(source.total_duration(), None);
        assert!(source.current_frame_len().is_some());
    }

    #[test]
    fn test_source_interleaves_one_quantum_per_refill() {
        let (mut source, _) = source();
        let first: Vec<f32> = source.by_ref().take(BLOCK_LEN).collect();
        assert_eq!(&first[..4], &[1.0, -1.0, 1.0, -1.0]);
        assert_eq!(source.next(), Some(2.0));
        assert_eq!(source.next(), Some(-2.0));
    }

    #[test]
    fn test_finished_signal_ends_stream() {
        let (mut source, finished) = source();
        assert!(source.next().is_some());
        finished.store(true, Ordering::Relaxed);
        assert_eq!(source.next(), None);
    }

    #[test]
    fn test_stream_config_for_session() {
        let config = StreamConfig::for_session(&SessionConfig::new(48_000));
        assert_eq!(config.sample_rate, 48_000);
        assert!(config.quantum_duration() > Duration::from_millis(2));
    }

    #[test]
    fn test_audio_device_pause_and_play() {
        let processor = Arc::new(Mutex::new(Ramp(0.0)));
        let device = match AudioDevice::new(processor, StreamConfig::default()) {
            Ok(device) => device,
            Err(err) => {
                eprintln!("Skipping audio device test (audio backend unavailable): {err}");
                return;
            }
        };
        device.pause();
        assert!(device.is_paused());
        device.play();
        assert!(!device.is_paused());
        device.finish();
    }
}
