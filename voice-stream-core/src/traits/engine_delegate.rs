use std::sync::Arc;

use crate::models::audio_models::EncodedPacket;
use crate::models::error::EngineError;
use crate::models::state::EngineState;

/// Outbound audio callback, invoked once per encoded capture block.
pub type PacketCallback = Arc<dyn Fn(EncodedPacket) + Send + Sync + 'static>;

/// Event delegate for engine notifications.
///
/// Methods are called from control, audio and monitor threads, never while
/// the engine holds its internal lock. Implementations should marshal to
/// the UI thread if needed.
pub trait EngineDelegate: Send + Sync {
    /// Called when the lifecycle state changes.
    fn on_state_changed(&self, state: &EngineState);

    /// Called at the volume poll cadence with the capture level in `[0, 1]`.
    fn on_capture_volume(&self, level: f32);

    /// Called at the volume poll cadence with the playback level in `[0, 1]`.
    fn on_playback_volume(&self, level: f32);

    /// Called when a device cannot be acquired.
    fn on_error(&self, error: &EngineError);
}
