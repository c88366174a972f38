//! # voice-stream-cpal
//!
//! cpal hardware backend for voice-stream-core.
//!
//! Provides:
//! - `CpalInputBackend`: microphone capture, downmixed to mono
//! - `CpalOutputBackend`: playback of the engine's output timeline, with
//!   rate conversion, channel fan-out and sink reassignment
//! - `CpalDeviceEnumerator`: input/output device listing
//!
//! Every cpal stream lives on its own thread (streams are not `Send`) and is
//! controlled over channels, so releasing a device is a synchronous
//! drain-then-drop.
//!
//! ## Usage
//! ```ignore
//! use voice_stream_core::{DeviceSelector, EngineConfiguration, VoiceStreamEngine};
//! use voice_stream_cpal::{CpalInputBackend, CpalOutputBackend};
//!
//! let engine = VoiceStreamEngine::new(
//!     CpalInputBackend::new(),
//!     CpalOutputBackend::new(),
//!     EngineConfiguration::default(),
//! )?;
//! engine.init_output(DeviceSelector::Default)?;
//! ```

pub mod cpal_input;
pub mod cpal_output;
pub mod device_enumerator;
pub mod error;
pub mod stream_config;
mod stream_thread;

pub use cpal_input::{CpalInputBackend, CpalInputStream};
pub use cpal_output::{CpalOutputBackend, CpalOutputStream};
pub use device_enumerator::CpalDeviceEnumerator;
pub use error::BackendError;
pub use stream_thread::StreamInfo;
