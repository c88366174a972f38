//! Capture the microphone and play the encoded packets straight back.
//!
//! ```text
//! voice-loopback [--list] [--input NAME] [--output NAME] [--seconds N] [--config FILE]
//! ```
//!
//! `RUST_LOG` controls log verbosity (default `info`).

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use clap::Parser;
use parking_lot::Mutex;

use voice_stream_core::{
    DeviceEnumerator, DeviceSelector, EncodedPacket, EngineConfiguration, EngineDelegate, EngineError,
    EngineState, PacketCallback, VoiceStreamEngine,
};
use voice_stream_cpal::{CpalDeviceEnumerator, CpalInputBackend, CpalOutputBackend};

type Engine = VoiceStreamEngine<CpalInputBackend, CpalOutputBackend>;

/// Capture the microphone and play it straight back through the engine
#[derive(Parser, Debug)]
#[command(name = "voice-loopback")]
#[command(about, long_about = None)]
struct Args {
    /// List input and output devices, then exit
    #[arg(long)]
    list: bool,

    /// Input device name, or "default"
    #[arg(short, long, default_value = "default")]
    input: DeviceSelector,

    /// Output device name, or "default"
    #[arg(short, long, default_value = "default")]
    output: DeviceSelector,

    /// How long to run the loopback
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,

    /// Engine configuration as a JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Prints state changes and errors; throttles the volume meters to one
/// line per second.
struct ConsoleDelegate {
    levels: Mutex<(f32, f32, Instant)>,
}

impl ConsoleDelegate {
    fn new() -> Self {
        Self {
            levels: Mutex::new((0.0, 0.0, Instant::now())),
        }
    }

    fn maybe_print(&self) {
        let mut levels = self.levels.lock();
        if levels.2.elapsed() >= Duration::from_secs(1) {
            println!("mic {:<20} speaker {:<20}", meter(levels.0), meter(levels.1));
            levels.2 = Instant::now();
        }
    }
}

fn meter(level: f32) -> String {
    "#".repeat((level * 20.0).round() as usize)
}

impl EngineDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &EngineState) {
        println!("state: {}", state);
    }

    fn on_capture_volume(&self, level: f32) {
        self.levels.lock().0 = level;
        self.maybe_print();
    }

    fn on_playback_volume(&self, level: f32) {
        self.levels.lock().1 = level;
    }

    fn on_error(&self, error: &EngineError) {
        eprintln!("error: {}", error);
    }
}

fn print_devices() -> Result<(), EngineError> {
    let enumerator = CpalDeviceEnumerator::new();
    for (title, devices) in [
        ("Input devices", enumerator.list_input_devices()?),
        ("Output devices", enumerator.list_output_devices()?),
    ] {
        println!("{}:", title);
        for device in devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("  {}{}", device.label, marker);
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfiguration, Box<dyn Error>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(EngineConfiguration::from_json_str(&json)?)
        }
        None => Ok(EngineConfiguration::default()),
    }
}

fn loopback(engine: Weak<Engine>) -> PacketCallback {
    Arc::new(move |packet: EncodedPacket| {
        if let Some(engine) = engine.upgrade() {
            if let Err(e) = engine.enqueue_playback(&packet) {
                log::debug!("Loopback packet not played: {}", e);
            }
        }
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.list {
        print_devices()?;
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    log::info!(
        "Loopback {} Hz out / {} Hz in for {}s",
        config.capture_wire_rate,
        config.playback_wire_rate,
        args.seconds
    );

    let engine = Arc::new(VoiceStreamEngine::new(
        CpalInputBackend::new(),
        CpalOutputBackend::new(),
        config,
    )?);
    engine.set_delegate(Arc::new(ConsoleDelegate::new()));

    engine.init_output(args.output)?;
    engine.start_input(args.input, loopback(Arc::downgrade(&engine)))?;

    std::thread::sleep(Duration::from_secs(args.seconds));

    engine.close();
    let diagnostics = engine.diagnostics();
    println!(
        "sent {} packets, scheduled {}, dropped {}, drift resets {}",
        diagnostics.packets_sent,
        diagnostics.packets_scheduled,
        diagnostics.packets_dropped,
        diagnostics.drift_resets
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_system_devices() {
        let args = Args::try_parse_from(["voice-loopback"]).unwrap();
        assert!(!args.list);
        assert_eq!(args.input, DeviceSelector::Default);
        assert_eq!(args.output, DeviceSelector::Default);
        assert_eq!(args.seconds, 10);
        assert!(args.config.is_none());
    }

    #[test]
    fn parses_device_names_and_duration() {
        let args = Args::try_parse_from([
            "voice-loopback",
            "--input",
            "USB Mic",
            "-o",
            "default",
            "--seconds",
            "3",
            "--config",
            "engine.json",
        ])
        .unwrap();
        assert_eq!(args.input, DeviceSelector::Id("USB Mic".into()));
        assert_eq!(args.output, DeviceSelector::Default);
        assert_eq!(args.seconds, 3);
        assert_eq!(args.config.as_deref(), Some(Path::new("engine.json")));
    }

    #[test]
    fn rejects_unknown_flags() {
        assert!(Args::try_parse_from(["voice-loopback", "--loud"]).is_err());
        assert!(Args::try_parse_from(["voice-loopback", "--seconds", "soon"]).is_err());
    }
}
