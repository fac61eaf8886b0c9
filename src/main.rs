//! `opl-bridge` command-line player
//!
//! Loads a register-stream file, starts a generator session on it and either
//! renders it to a WAV file or plays it through the default audio device.

use anyhow::Context;
use opl_bridge::{generator_session, SessionConfig};
use std::env;
use std::path::PathBuf;
use tracing::info;

const DEFAULT_SECONDS: f32 = 30.0;

/// Parsed command-line arguments
#[derive(Debug)]
struct CliArgs {
    sequence_path: Option<PathBuf>,
    wav_path: Option<PathBuf>,
    seconds: f32,
    mixer_rate: Option<u32>,
    sequence_clock: Option<u32>,
    no_loop: bool,
    show_help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            sequence_path: None,
            wav_path: None,
            seconds: DEFAULT_SECONDS,
            mixer_rate: None,
            sequence_clock: None,
            no_loop: false,
            show_help: false,
        }
    }
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Option<T> {
    let Some(value) = value else {
        eprintln!("{flag} requires an argument");
        return None;
    };
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("Invalid value for {flag}: {value}");
            None
        }
    }
}

impl CliArgs {
    fn parse() -> Self {
        let mut args = Self::default();
        let mut iter = env::args().skip(1);

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--help" | "-h" => args.show_help = true,
                "--no-loop" => args.no_loop = true,
                "--wav" => match iter.next() {
                    Some(path) => args.wav_path = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("--wav requires an output path");
                        args.show_help = true;
                    }
                },
                "--seconds" => match parse_value("--seconds", iter.next()) {
                    Some(secs) => args.seconds = secs,
                    None => args.show_help = true,
                },
                "--rate" => match parse_value("--rate", iter.next()) {
                    Some(rate) => args.mixer_rate = Some(rate),
                    None => args.show_help = true,
                },
                "--clock" => match parse_value("--clock", iter.next()) {
                    Some(clock) => args.sequence_clock = Some(clock),
                    None => args.show_help = true,
                },
                _ if arg.starts_with('-') => {
                    eprintln!("Unknown flag: {arg}");
                    args.show_help = true;
                }
                _ => args.sequence_path = Some(PathBuf::from(arg)),
            }
        }

        args
    }

    fn print_help() {
        eprintln!(
            "Usage:\n  opl-bridge <sequence-file> [--seconds N] [--wav out.wav] [--rate HZ] [--clock HZ] [--no-loop]\n\n\
             Flags:\n\
             \x20 --seconds N     Length to render or play (default {DEFAULT_SECONDS})\n\
             \x20 --wav PATH      Render to a 32-bit float WAV file instead of playing\n\
             \x20 --rate HZ       Mixer rate (default 44100)\n\
             \x20 --clock HZ      Sequence clock rate (default 700; 560 for early titles)\n\
             \x20 --no-loop       Stop after the last record instead of looping\n\
             \x20 -h, --help      Show this help\n"
        );
    }

    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(rate) = self.mixer_rate {
            config.mixer_rate = rate;
        }
        if let Some(clock) = self.sequence_clock {
            config.sequence_clock_rate = clock;
        }
        config.loop_sequence = !self.no_loop;
        config
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let Some(sequence_path) = args.sequence_path.clone().filter(|_| !args.show_help) else {
        CliArgs::print_help();
        return Ok(());
    };

    let data = std::fs::read(&sequence_path)
        .with_context(|| format!("Failed to read {}", sequence_path.display()))?;
    let config = args.session_config();
    let (controller, session) = generator_session(&config)?;
    controller.play_sequence(data)?;
    info!(
        file = %sequence_path.display(),
        mixer_rate = config.mixer_rate,
        clock = config.effective_sequence_clock(),
        "loaded sequence"
    );

    if let Some(wav_path) = &args.wav_path {
        let frames = opl_bridge::export_wav(session, wav_path, args.seconds, config.mixer_rate)?;
        info!(frames, path = %wav_path.display(), "export complete");
        return Ok(());
    }

    play(session, &config, args.seconds)
}

#[cfg(feature = "streaming")]
fn play<P>(session: P, config: &SessionConfig, seconds: f32) -> anyhow::Result<()>
where
    P: opl_bridge::RenderProcessor + 'static,
{
    use opl_bridge::{AudioDevice, StreamConfig};
    use parking_lot::Mutex;
    use std::sync::Arc;

    let duration = std::time::Duration::try_from_secs_f32(seconds.max(0.0))
        .with_context(|| format!("Cannot play for {seconds} seconds"))?;
    let device = AudioDevice::new(Arc::new(Mutex::new(session)), StreamConfig::for_session(config))?;
    info!(seconds, "playing");
    std::thread::sleep(duration);
    device.finish();
    Ok(())
}

#[cfg(not(feature = "streaming"))]
fn play<P>(_session: P, _config: &SessionConfig, _seconds: f32) -> anyhow::Result<()> {
    anyhow::bail!("Real-time playback requires the \"streaming\" feature; use --wav to render to a file")
}
