use std::sync::Arc;

use crate::models::audio_models::DeviceSelector;
use crate::models::error::EngineError;
use crate::playback::timeline::OutputTimeline;

/// Callback invoked when a captured buffer is available.
///
/// Parameters:
/// - `samples`: mono f32 samples, already downmixed by the backend.
/// - `sample_rate`: the native rate the device delivered them at.
///
/// Fires on the backend's audio thread; keep processing minimal.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], u32) + Send + Sync + 'static>;

/// What the engine asks of an input device.
///
/// Backends honor what their platform supports and log the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub mono: bool,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub preferred_rate: u32,
}

impl CaptureConstraints {
    /// Voice capture: mono with all conversational processing enabled.
    pub fn voice(preferred_rate: u32) -> Self {
        Self {
            mono: true,
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            preferred_rate,
        }
    }
}

/// An acquired input device handle.
pub trait InputStream: Send {
    /// Rate the callback will be invoked with.
    fn sample_rate(&self) -> u32;

    /// Begin delivering buffers to the callback given at acquisition.
    fn start(&mut self) -> Result<(), EngineError>;

    /// Stop delivery and release the device. Idempotent.
    ///
    /// Must not return until the device callback can no longer fire.
    fn stop(&mut self);
}

/// Platform source of input device handles.
pub trait InputBackend: Send + Sync {
    /// Acquire `selector` with `constraints`. The returned handle is not yet
    /// delivering audio. May block until the platform grants the device.
    fn acquire(
        &self,
        selector: &DeviceSelector,
        constraints: &CaptureConstraints,
        callback: AudioBufferCallback,
    ) -> Result<Box<dyn InputStream>, EngineError>;
}

/// A live output context rendering an [`OutputTimeline`].
pub trait OutputStream: Send {
    /// Whether [`OutputStream::assign_sink`] can succeed on this platform.
    fn supports_sink_assignment(&self) -> bool {
        true
    }

    /// Move rendering to another device. On failure the stream keeps
    /// playing on its previous sink.
    fn assign_sink(&mut self, selector: &DeviceSelector) -> Result<(), EngineError>;

    /// Stop rendering and release the device. Idempotent.
    fn close(&mut self);
}

/// Platform source of output contexts.
pub trait OutputBackend: Send + Sync {
    /// Open an output context on `selector` that renders `timeline`.
    fn open(
        &self,
        selector: &DeviceSelector,
        timeline: OutputTimeline,
    ) -> Result<Box<dyn OutputStream>, EngineError>;
}
