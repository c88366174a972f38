//! # voice-stream-core
//!
//! Platform-agnostic real-time voice streaming engine.
//!
//! Captures microphone audio, converts it to a fixed wire rate and encodes
//! it as text-safe 16-bit PCM packets; concurrently decodes inbound packets
//! and schedules them for gapless, drift-corrected playback. Platform
//! backends implement the `InputBackend` and `OutputBackend` traits and plug
//! into the generic `VoiceStreamEngine`.
//!
//! ## Architecture
//!
//! ```text
//! voice-stream-core (this crate)
//! ├── traits/       ← InputBackend, OutputBackend, DeviceEnumerator, EngineDelegate
//! ├── models/       ← EngineError, EngineState, EngineConfiguration, DeviceSelector, etc.
//! ├── processing/   ← Resampler, PCM codec, level meter, gain, silence injection
//! ├── playback/     ← PlaybackScheduler, OutputTimeline
//! └── session/      ← CaptureStage, VolumeMonitor, VoiceStreamEngine
//! ```

pub mod models;
pub mod playback;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AudioBlock, AudioDevice, DeviceSelector, Direction, DropReason, EncodedPacket,
    EngineDiagnostics, PlaybackOutcome,
};
pub use models::config::{EngineConfiguration, InterruptPolicy, SilenceInjectionConfig, VolumeReduction};
pub use models::error::EngineError;
pub use models::state::{CaptureSubState, EngineState};
pub use playback::scheduler::PlaybackScheduler;
pub use playback::timeline::{OutputClock, OutputTimeline};
pub use processing::gain::GainControl;
pub use processing::level_meter::{LevelMeter, SignalTap};
pub use session::capture::{CaptureStage, CaptureStart};
pub use session::engine::VoiceStreamEngine;
pub use session::volume_monitor::VolumeMonitor;
pub use traits::audio_backend::{
    AudioBufferCallback, CaptureConstraints, InputBackend, InputStream, OutputBackend, OutputStream,
};
pub use traits::device_enumerator::DeviceEnumerator;
pub use traits::engine_delegate::{EngineDelegate, PacketCallback};
