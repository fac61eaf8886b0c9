//! WAV file export

use crate::constants::CHANNELS;
use crate::host::OfflineHost;
use crate::render::RenderProcessor;
use crate::Result;
use std::path::Path;
use tracing::info;

/// Render `seconds` of a processor into a 32-bit float stereo WAV file
///
/// Returns the number of frames written (a whole number of quanta).
///
/// # Examples
///
/// ```no_run
/// use opl_bridge::{export_wav, generator_session, SessionConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SessionConfig::default();
/// let (controller, session) = generator_session(&config)?;
/// controller.play_sequence(std::fs::read("song.imf")?)?;
///
/// export_wav(session, "song.wav", 30.0, config.mixer_rate)?;
/// # Ok(())
/// # }
/// ```
pub fn export_wav<P, Q>(processor: P, path: Q, seconds: f32, sample_rate: u32) -> Result<usize>
where
    P: RenderProcessor,
    Q: AsRef<Path>,
{
    let mut host = OfflineHost::new(processor);
    let samples = host.render_seconds(seconds, sample_rate)?;
    info!(
        seconds,
        sample_rate,
        path = %path.as_ref().display(),
        "writing WAV"
    );
    write_wav_file(path.as_ref(), &samples, sample_rate)?;
    Ok(samples.len() / CHANNELS)
}

/// Write interleaved stereo samples to a float WAV file
pub fn write_wav_file(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: CHANNELS as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| crate::BridgeError::AudioFileError(format!("Failed to create WAV file: {e}")))?;

    for &sample in samples {
        writer.write_sample(sample).map_err(|e| {
            crate::BridgeError::AudioFileError(format!("Failed to write sample: {e}"))
        })?;
    }

    writer.finalize().map_err(|e| {
        crate::BridgeError::AudioFileError(format!("Failed to finalize WAV file: {e}"))
    })?;

    Ok(())
}
